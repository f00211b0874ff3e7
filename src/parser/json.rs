//! JSON payload parser.
//!
//! Walks the JSON tree depth-first, emitting a summary fragment per
//! object and array and a value fragment per long string. Paths are
//! dotted for keys (`root.user.name`) and bracketed for indices
//! (`root.items[3]`); recursion stops silently past `max_depth`, with
//! the enclosing summary still counting the elided children.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{Error, Result};

use super::{ContentFragment, ParsedResource, Parser};

/// Strings at or below this length are inlined in the parent summary
/// instead of becoming fragments.
const INLINE_STRING_LEN: usize = 20;
/// Property previews shown in an object summary.
const OBJECT_PREVIEW_COUNT: usize = 5;
/// Item previews shown in an array summary.
const ARRAY_PREVIEW_COUNT: usize = 3;

#[derive(Debug)]
pub struct JsonParser {
    max_depth: usize,
    include_arrays: bool,
}

impl JsonParser {
    pub fn new(max_depth: usize, include_arrays: bool) -> Self {
        Self {
            max_depth,
            include_arrays,
        }
    }

    fn walk(
        &self,
        value: &Value,
        path: String,
        parent: Option<&str>,
        depth: usize,
        fragments: &mut Vec<ContentFragment>,
    ) {
        if depth > self.max_depth {
            return;
        }

        match value {
            Value::Object(map) if !map.is_empty() => {
                let previews: Vec<String> = map
                    .iter()
                    .take(OBJECT_PREVIEW_COUNT)
                    .map(|(k, v)| format!("{k}: {}", preview(v)))
                    .collect();
                let mut content = format!(
                    "Object with {} properties: {}",
                    map.len(),
                    previews.join(", ")
                );
                if map.len() > OBJECT_PREVIEW_COUNT {
                    content.push_str(&format!(", ... ({} more)", map.len() - OBJECT_PREVIEW_COUNT));
                }

                let mut meta = BTreeMap::new();
                meta.insert("path".to_string(), Value::from(path.clone()));
                meta.insert("property_count".to_string(), Value::from(map.len()));
                meta.insert("depth".to_string(), Value::from(depth));
                push_fragment(fragments, content, "json_object", parent, meta);

                for (key, child) in map {
                    if recursible(child, self.include_arrays) {
                        self.walk(child, format!("{path}.{key}"), Some(&path), depth + 1, fragments);
                    }
                }
            }
            Value::Array(items) if self.include_arrays && !items.is_empty() => {
                let previews: Vec<String> = items
                    .iter()
                    .take(ARRAY_PREVIEW_COUNT)
                    .map(preview)
                    .collect();
                let mut content =
                    format!("Array with {} items: {}", items.len(), previews.join(", "));
                if items.len() > ARRAY_PREVIEW_COUNT {
                    content.push_str(&format!(", ... ({} more)", items.len() - ARRAY_PREVIEW_COUNT));
                }

                let mut meta = BTreeMap::new();
                meta.insert("path".to_string(), Value::from(path.clone()));
                meta.insert("array_length".to_string(), Value::from(items.len()));
                meta.insert("depth".to_string(), Value::from(depth));
                push_fragment(fragments, content, "json_array", parent, meta);

                for (i, item) in items.iter().enumerate() {
                    if recursible(item, self.include_arrays) {
                        self.walk(item, format!("{path}[{i}]"), Some(&path), depth + 1, fragments);
                    }
                }
            }
            Value::String(s) if s.len() > INLINE_STRING_LEN => {
                let mut meta = BTreeMap::new();
                meta.insert("path".to_string(), Value::from(path));
                meta.insert("value_type".to_string(), Value::from("string"));
                meta.insert("length".to_string(), Value::from(s.len()));
                push_fragment(fragments, s.clone(), "json_value", parent, meta);
            }
            // Numbers, booleans, nulls, and short strings appear only in
            // the parent summary.
            _ => {}
        }
    }
}

fn recursible(value: &Value, include_arrays: bool) -> bool {
    match value {
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => include_arrays && !items.is_empty(),
        Value::String(s) => s.len() > INLINE_STRING_LEN,
        _ => false,
    }
}

fn preview(value: &Value) -> String {
    match value {
        Value::String(s) => {
            if s.len() > INLINE_STRING_LEN {
                let cut: String = s.chars().take(INLINE_STRING_LEN).collect();
                format!("{cut}...")
            } else {
                s.clone()
            }
        }
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Object(_) => "{...}".to_string(),
        Value::Array(_) => "[...]".to_string(),
    }
}

fn push_fragment(
    fragments: &mut Vec<ContentFragment>,
    content: String,
    fragment_type: &str,
    parent: Option<&str>,
    metadata: BTreeMap<String, Value>,
) {
    let order = fragments.len();
    fragments.push(ContentFragment {
        content,
        fragment_type: fragment_type.to_string(),
        order,
        parent_key: parent.map(str::to_string),
        metadata,
    });
}

impl Parser for JsonParser {
    fn content_type(&self) -> &str {
        "json"
    }

    fn can_parse(&self, payload: &str) -> bool {
        let trimmed = payload.trim_start();
        (trimmed.starts_with('{') || trimmed.starts_with('['))
            && serde_json::from_str::<Value>(payload).is_ok()
    }

    fn parse(
        &self,
        payload: &str,
        resource_id: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<ParsedResource> {
        let root: Value = serde_json::from_str(payload)
            .map_err(|e| Error::invalid(format!("invalid JSON payload: {e}")))?;

        let mut fragments = Vec::new();
        self.walk(&root, "root".to_string(), None, 0, &mut fragments);

        let mut resource_metadata = metadata.clone();
        resource_metadata.insert("parser".to_string(), self.content_type().to_string());

        Ok(ParsedResource {
            resource_id: resource_id.to_string(),
            resource_type: self.content_type().to_string(),
            metadata: resource_metadata,
            fragments,
        })
    }
}
