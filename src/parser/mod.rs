//! Payload parsers and their registry.
//!
//! A parser is a pure transformation from a raw payload into an
//! ordered list of content fragments; it performs no I/O and writes
//! nothing. Each parser declares a `content_type` name and a cheap
//! `can_parse` probe so the registry can auto-detect the right one.
//!
//! | Parser | Content type | Module |
//! |--------|--------------|--------|
//! | paragraph splitter/merger | `text` | [`text`] |
//! | JSON tree walker | `json` | [`json`] |
//! | OWL/RDF ontology reader | `owl` | [`owl`] |

pub mod json;
pub mod owl;
pub mod text;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{Error, Result};

/// One parsed unit of content; becomes a fragment point.
#[derive(Debug, Clone)]
pub struct ContentFragment {
    pub content: String,
    pub fragment_type: String,
    /// Monotone in parse order, starting at 0.
    pub order: usize,
    /// Parser-defined path of the enclosing container for hierarchical
    /// formats (e.g. `root.user.name`).
    pub parent_key: Option<String>,
    pub metadata: BTreeMap<String, Value>,
}

/// Transient product of a parse: the fragments plus per-parse metadata.
#[derive(Debug, Clone)]
pub struct ParsedResource {
    pub resource_id: String,
    pub resource_type: String,
    pub metadata: BTreeMap<String, String>,
    pub fragments: Vec<ContentFragment>,
}

/// A content parser. Pure: `parse` has no side effects and fails
/// without writing anything.
pub trait Parser: Send + Sync + std::fmt::Debug {
    /// Registry name, e.g. `"text"`, `"json"`, `"owl"`.
    fn content_type(&self) -> &str;

    /// Cheap probe used for auto-detection and named-lookup validation.
    fn can_parse(&self, payload: &str) -> bool;

    fn parse(
        &self,
        payload: &str,
        resource_id: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<ParsedResource>;
}

/// Ordered parser registry.
///
/// Registration order is probe order: `resolve("auto", ..)` returns the
/// first parser whose `can_parse` accepts the payload.
#[derive(Default)]
pub struct ParserRegistry {
    parsers: Vec<Box<dyn Parser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in parsers in probe order: json, owl,
    /// text last because it accepts almost anything.
    pub fn with_defaults(config: &crate::config::ParsingConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(json::JsonParser::new(
            config.max_depth,
            config.include_arrays,
        )));
        registry.register(Box::new(owl::OwlParser::new()));
        registry.register(Box::new(text::TextParser::new(
            config.min_paragraph_length,
            config.max_paragraph_length,
        )));
        registry
    }

    pub fn register(&mut self, parser: Box<dyn Parser>) {
        self.parsers.push(parser);
    }

    /// Select a parser for the payload. `"auto"` probes each parser in
    /// registration order; a specific name looks the parser up and
    /// verifies it accepts the payload.
    pub fn resolve(&self, content_type: &str, payload: &str) -> Result<&dyn Parser> {
        if content_type == "auto" {
            return self
                .parsers
                .iter()
                .map(|p| p.as_ref())
                .find(|p| p.can_parse(payload))
                .ok_or_else(|| Error::ParserNotFound("auto".to_string()));
        }

        let parser = self
            .parsers
            .iter()
            .map(|p| p.as_ref())
            .find(|p| p.content_type() == content_type)
            .ok_or_else(|| Error::ParserNotFound(content_type.to_string()))?;

        if !parser.can_parse(payload) {
            return Err(Error::ParserNotFound(content_type.to_string()));
        }
        Ok(parser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParsingConfig;

    fn registry() -> ParserRegistry {
        ParserRegistry::with_defaults(&ParsingConfig::default())
    }

    #[test]
    fn auto_detects_json_before_text() {
        let registry = registry();
        let payload = r#"{"description": "a payload that is long enough to pass the text probe"}"#;
        let parser = registry.resolve("auto", payload).unwrap();
        assert_eq!(parser.content_type(), "json");
    }

    #[test]
    fn auto_falls_back_to_text() {
        let registry = registry();
        let payload = "A plain prose payload that is comfortably longer than fifty characters.";
        let parser = registry.resolve("auto", payload).unwrap();
        assert_eq!(parser.content_type(), "text");
    }

    #[test]
    fn named_lookup_verifies_can_parse() {
        let registry = registry();
        let err = registry.resolve("json", "definitely not json").unwrap_err();
        assert!(matches!(err, Error::ParserNotFound(_)));
    }

    #[test]
    fn unknown_name_is_parser_not_found() {
        let registry = registry();
        let err = registry.resolve("yaml", "a: 1").unwrap_err();
        assert!(matches!(err, Error::ParserNotFound(_)));
    }
}
