//! OWL/RDF ontology parser.
//!
//! Reads an `rdf:RDF` document with `owl:*` descendants and emits four
//! fragment kinds, grouped in this order: ontology headers, classes,
//! properties, named individuals. References (`rdf:resource`,
//! `rdf:about`) are reduced to their local name, the substring after
//! the last `/` or `#`; unknown labels fall back to it.

use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use serde_json::Value;

use crate::error::{Error, Result};

use super::{ContentFragment, ParsedResource, Parser};

/// Property element names recognized as `owl_property` entities.
const PROPERTY_KINDS: &[(&str, &str)] = &[
    ("ObjectProperty", "object"),
    ("DatatypeProperty", "datatype"),
    ("AnnotationProperty", "annotation"),
    ("FunctionalProperty", "functional"),
    ("InverseFunctionalProperty", "inverse functional"),
    ("TransitiveProperty", "transitive"),
    ("SymmetricProperty", "symmetric"),
];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kind {
    Ontology,
    Class,
    Property(usize),
    Individual,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TextField {
    Label,
    Comment,
    Definition,
    VersionInfo,
    Guid,
}

#[derive(Debug, Default)]
struct Entity {
    about: String,
    label: Option<String>,
    comment: Option<String>,
    definition: Option<String>,
    version_info: Option<String>,
    guid: Option<String>,
    sub_class_of: Vec<String>,
    same_as: Vec<String>,
    domain: Option<String>,
    range: Option<String>,
    types: Vec<String>,
}

impl Entity {
    fn display_label(&self) -> String {
        self.label
            .clone()
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| local_name(&self.about).to_string())
    }
}

#[derive(Debug, Default)]
pub struct OwlParser;

impl OwlParser {
    pub fn new() -> Self {
        Self
    }
}

/// The substring after the last `/` or `#` in a URI.
fn local_name(uri: &str) -> &str {
    uri.rsplit(|c| c == '/' || c == '#').next().unwrap_or(uri)
}

fn entity_kind(local: &[u8]) -> Option<Kind> {
    if local == b"Ontology" {
        return Some(Kind::Ontology);
    }
    if local == b"Class" {
        return Some(Kind::Class);
    }
    if local == b"NamedIndividual" {
        return Some(Kind::Individual);
    }
    PROPERTY_KINDS
        .iter()
        .position(|(name, _)| name.as_bytes() == local)
        .map(Kind::Property)
}

fn attr_value(e: &BytesStart, name: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == name {
            return attr.unescape_value().ok().map(|v| v.into_owned());
        }
    }
    None
}

/// Resolve an `rdf:resource` reference on a child element of the
/// current entity, storing its local name.
fn apply_resource_child(entity: &mut Entity, local: &[u8], e: &BytesStart) {
    let Some(resource) = attr_value(e, b"resource") else {
        return;
    };
    let target = local_name(&resource).to_string();
    match local {
        b"subClassOf" => entity.sub_class_of.push(target),
        b"sameAs" => entity.same_as.push(target),
        b"domain" => entity.domain = Some(target),
        b"range" => entity.range = Some(target),
        b"type" => entity.types.push(target),
        _ => {}
    }
}

fn text_field(local: &[u8]) -> Option<TextField> {
    match local {
        b"label" => Some(TextField::Label),
        b"comment" => Some(TextField::Comment),
        b"definition" => Some(TextField::Definition),
        b"versionInfo" => Some(TextField::VersionInfo),
        b"guid" => Some(TextField::Guid),
        _ => None,
    }
}

fn store_text(entity: &mut Entity, field: TextField, text: String) {
    match field {
        TextField::Label => entity.label = Some(text),
        TextField::Comment => entity.comment = Some(text),
        TextField::Definition => entity.definition = Some(text),
        TextField::VersionInfo => entity.version_info = Some(text),
        TextField::Guid => entity.guid = Some(text),
    }
}

fn base_metadata(entity: &Entity) -> BTreeMap<String, Value> {
    let mut meta = BTreeMap::new();
    meta.insert("iri".to_string(), Value::from(entity.about.clone()));
    meta.insert(
        "local_name".to_string(),
        Value::from(local_name(&entity.about)),
    );
    meta
}

fn ontology_fragment(entity: &Entity) -> (String, BTreeMap<String, Value>) {
    let mut parts = vec![format!("Ontology: {}", entity.display_label())];
    if let Some(comment) = &entity.comment {
        parts.push(comment.clone());
    }
    if let Some(version) = &entity.version_info {
        parts.push(format!("Version: {version}"));
    }
    let mut meta = base_metadata(entity);
    if let Some(version) = &entity.version_info {
        meta.insert("version_info".to_string(), Value::from(version.clone()));
    }
    (parts.join(". "), meta)
}

fn class_fragment(entity: &Entity) -> (String, BTreeMap<String, Value>) {
    let mut parts = vec![format!("Class: {}", entity.display_label())];
    // skos:definition is the curated text; rdfs:comment is the fallback
    if let Some(text) = entity.definition.as_ref().or(entity.comment.as_ref()) {
        parts.push(text.clone());
    }
    if !entity.sub_class_of.is_empty() {
        parts.push(format!("Subclass of: {}", entity.sub_class_of.join(", ")));
    }
    if !entity.same_as.is_empty() {
        parts.push(format!("Same as: {}", entity.same_as.join(", ")));
    }
    if let Some(guid) = &entity.guid {
        parts.push(format!("GUID: {guid}"));
    }
    let mut meta = base_metadata(entity);
    meta.insert(
        "sub_class_of".to_string(),
        Value::from(entity.sub_class_of.clone()),
    );
    meta.insert("same_as".to_string(), Value::from(entity.same_as.clone()));
    if let Some(guid) = &entity.guid {
        meta.insert("guid".to_string(), Value::from(guid.clone()));
    }
    (parts.join(". "), meta)
}

fn property_fragment(entity: &Entity, kind_idx: usize) -> (String, BTreeMap<String, Value>) {
    let kind = PROPERTY_KINDS[kind_idx].1;
    let mut parts = vec![format!("Property: {} ({kind})", entity.display_label())];
    if let Some(domain) = &entity.domain {
        parts.push(format!("Domain: {domain}"));
    }
    if let Some(range) = &entity.range {
        parts.push(format!("Range: {range}"));
    }
    let mut meta = base_metadata(entity);
    meta.insert("property_type".to_string(), Value::from(kind));
    if let Some(domain) = &entity.domain {
        meta.insert("domain".to_string(), Value::from(domain.clone()));
    }
    if let Some(range) = &entity.range {
        meta.insert("range".to_string(), Value::from(range.clone()));
    }
    (parts.join(". "), meta)
}

fn individual_fragment(entity: &Entity) -> (String, BTreeMap<String, Value>) {
    let mut parts = vec![format!("Individual: {}", entity.display_label())];
    if !entity.types.is_empty() {
        parts.push(format!("Type: {}", entity.types.join(", ")));
    }
    let mut meta = base_metadata(entity);
    meta.insert("types".to_string(), Value::from(entity.types.clone()));
    (parts.join(". "), meta)
}

impl Parser for OwlParser {
    fn content_type(&self) -> &str {
        "owl"
    }

    fn can_parse(&self, payload: &str) -> bool {
        payload.contains("<rdf:RDF") && payload.contains("owl:")
    }

    fn parse(
        &self,
        payload: &str,
        resource_id: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<ParsedResource> {
        let mut reader = quick_xml::Reader::from_str(payload);
        reader.config_mut().trim_text(true);

        let mut saw_rdf_root = false;
        let mut current: Option<(Kind, Entity, Vec<u8>)> = None;
        let mut entity_depth = 0usize;
        let mut pending_text: Option<TextField> = None;

        let mut ontologies: Vec<Entity> = Vec::new();
        let mut classes: Vec<Entity> = Vec::new();
        let mut properties: Vec<(usize, Entity)> = Vec::new();
        let mut individuals: Vec<Entity> = Vec::new();

        let mut finish = |kind: Kind, entity: Entity| match kind {
            Kind::Ontology => ontologies.push(entity),
            Kind::Class => classes.push(entity),
            Kind::Property(idx) => properties.push((idx, entity)),
            Kind::Individual => individuals.push(entity),
        };

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let local = e.local_name().as_ref().to_vec();
                    if local == b"RDF" {
                        saw_rdf_root = true;
                    }
                    if let Some((_, entity, _)) = current.as_mut() {
                        if entity_depth == 0 {
                            pending_text = text_field(&local);
                            apply_resource_child(entity, &local, &e);
                        }
                        entity_depth += 1;
                    } else if let Some(kind) = entity_kind(&local) {
                        let mut entity = Entity::default();
                        entity.about = attr_value(&e, b"about")
                            .or_else(|| attr_value(&e, b"ID"))
                            .unwrap_or_default();
                        current = Some((kind, entity, e.name().as_ref().to_vec()));
                        entity_depth = 0;
                        pending_text = None;
                    }
                }
                Ok(Event::Empty(e)) => {
                    let local = e.local_name().as_ref().to_vec();
                    if let Some((_, entity, _)) = current.as_mut() {
                        if entity_depth == 0 {
                            apply_resource_child(entity, &local, &e);
                        }
                    } else if let Some(kind) = entity_kind(&local) {
                        // Entity with no children, e.g. <owl:Class rdf:about="..."/>
                        let mut entity = Entity::default();
                        entity.about = attr_value(&e, b"about")
                            .or_else(|| attr_value(&e, b"ID"))
                            .unwrap_or_default();
                        finish(kind, entity);
                    }
                }
                Ok(Event::Text(t)) => {
                    if let (Some(field), Some((_, entity, _))) = (pending_text, &mut current) {
                        let text = t
                            .unescape()
                            .map_err(|e| Error::invalid(format!("invalid XML payload: {e}")))?
                            .trim()
                            .to_string();
                        if !text.is_empty() {
                            store_text(entity, field, text);
                        }
                    }
                }
                Ok(Event::End(e)) => {
                    if current.is_some() {
                        if entity_depth > 0 {
                            entity_depth -= 1;
                            pending_text = None;
                        } else {
                            let closes_entity = current
                                .as_ref()
                                .map(|(_, _, qname)| e.name().as_ref() == qname.as_slice())
                                .unwrap_or(false);
                            if closes_entity {
                                let (kind, entity, _) = current.take().unwrap();
                                finish(kind, entity);
                            }
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(Error::invalid(format!("invalid XML payload: {e}"))),
                _ => {}
            }
        }

        if !saw_rdf_root {
            return Err(Error::invalid("payload is not an rdf:RDF document"));
        }

        let ontology_parent = ontologies
            .first()
            .map(|o| local_name(&o.about).to_string())
            .filter(|n| !n.is_empty());

        let mut fragments: Vec<ContentFragment> = Vec::new();
        let mut push = |content: String,
                        fragment_type: &str,
                        parent_key: Option<String>,
                        metadata: BTreeMap<String, Value>| {
            let order = fragments.len();
            fragments.push(ContentFragment {
                content,
                fragment_type: fragment_type.to_string(),
                order,
                parent_key,
                metadata,
            });
        };

        for entity in &ontologies {
            let (content, meta) = ontology_fragment(entity);
            push(content, "owl_ontology", None, meta);
        }
        for entity in &classes {
            let (content, meta) = class_fragment(entity);
            push(content, "owl_class", ontology_parent.clone(), meta);
        }
        for (kind_idx, entity) in &properties {
            let (content, meta) = property_fragment(entity, *kind_idx);
            push(content, "owl_property", ontology_parent.clone(), meta);
        }
        for entity in &individuals {
            let (content, meta) = individual_fragment(entity);
            push(content, "owl_individual", ontology_parent.clone(), meta);
        }

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
