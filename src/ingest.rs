//! Content ingestion pipeline.
//!
//! Orchestrates parse → batch-embed → materialize: the selected parser
//! turns the payload into ordered fragments, the embedding provider is
//! asked for one batch covering all of them, then a resource point
//! (dimension 0, no vector) is created and each fragment becomes a
//! child point (dimension 1, with vector) linked to it by a segment.
//!
//! # Failure policy
//!
//! Everything before the resource point is pure and fails fast with no
//! writes: bad input, no matching parser, an empty parse, or an
//! embedding batch of the wrong length. A resource-point failure aborts
//! the request. Per-fragment failures after that are logged and
//! tolerated; the returned result lists only the fragments that were
//! actually stored, so callers can tell "stored but incomplete" from
//! "nothing stored".

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::graph::{HybridStore, Point};
use crate::parser::ParserRegistry;

/// An ingestion request. `content_type` is one of `text`, `json`,
/// `owl`, or `auto` (probe parsers in registration order).
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub payload: String,
    pub resource_id: String,
    pub content_type: String,
    pub singularity_id: Option<i64>,
    pub user_id: Option<i64>,
    pub metadata: BTreeMap<String, String>,
}

impl IngestRequest {
    pub fn new(payload: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            resource_id: resource_id.into(),
            content_type: "auto".to_string(),
            singularity_id: None,
            user_id: None,
            metadata: BTreeMap::new(),
        }
    }
}

/// Outcome of an ingestion. `total_fragments` counts parsed fragments;
/// `fragment_point_ids` and `segment_ids` list only stored ones, in
/// parse order.
#[derive(Debug, Clone)]
pub struct ContentParseResult {
    pub resource_point_id: i64,
    pub fragment_point_ids: Vec<i64>,
    pub segment_ids: Vec<i64>,
    pub parser_type: String,
    pub total_fragments: usize,
}

/// Importance decay over parse order. The first fragment of a resource
/// weighs 1.0, the second 0.5, and so on; tune here if a flatter curve
/// is ever needed.
pub fn fragment_weight(order: usize) -> f32 {
    1.0 / (order as f32 + 1.0)
}

pub struct Pipeline {
    store: Arc<HybridStore>,
    registry: ParserRegistry,
    embedder: Arc<dyn EmbeddingProvider>,
    embedding_type: String,
}

impl Pipeline {
    pub fn new(
        store: Arc<HybridStore>,
        registry: ParserRegistry,
        embedder: Arc<dyn EmbeddingProvider>,
        embedding_type: &str,
    ) -> Self {
        Self {
            store,
            registry,
            embedder,
            embedding_type: embedding_type.to_string(),
        }
    }

    pub async fn ingest(&self, request: IngestRequest) -> Result<ContentParseResult> {
        if request.payload.is_empty() {
            return Err(Error::invalid("payload must not be empty"));
        }
        if request.resource_id.is_empty() {
            return Err(Error::invalid("resource_id must not be empty"));
        }

        let parser = self
            .registry
            .resolve(&request.content_type, &request.payload)?;

        let parsed = parser.parse(&request.payload, &request.resource_id, &request.metadata)?;
        if parsed.fragments.is_empty() {
            return Err(Error::EmptyParse);
        }

        let contents: Vec<String> = parsed.fragments.iter().map(|f| f.content.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&self.embedding_type, &contents)
            .await?;
        if embeddings.len() != parsed.fragments.len() {
            return Err(Error::EmbeddingMismatch {
                expected: parsed.fragments.len(),
                actual: embeddings.len(),
            });
        }

        // Resource point: dimension 0, never gets a vector.
        let resource_point = Point {
            id: 0,
            layer: 0,
            dimension: 0,
            weight: 1.0,
            singularity_id: request.singularity_id,
            user_id: request.user_id,
            payload: Some(format!(
                "Resource: {} ({}) with {} fragments",
                request.resource_id,
                parsed.resource_type,
                parsed.fragments.len()
            )),
        };
        let resource = self.store.add_point(None, resource_point, None).await?;

        let mut fragment_point_ids = Vec::with_capacity(parsed.fragments.len());
        let mut segment_ids = Vec::with_capacity(parsed.fragments.len());

        for (fragment, embedding) in parsed.fragments.iter().zip(embeddings) {
            let point = Point {
                id: 0,
                layer: 0,
                dimension: 1,
                weight: fragment_weight(fragment.order),
                singularity_id: request.singularity_id,
                user_id: request.user_id,
                payload: Some(fragment.content.clone()),
            };
            match self
                .store
                .add_point(Some(resource.point_id), point, Some(embedding))
                .await
            {
                Ok(outcome) => {
                    fragment_point_ids.push(outcome.point_id);
                    segment_ids.extend(outcome.segment_id);
                }
                Err(e) => {
                    eprintln!(
                        "Warning: fragment {} of resource {} not stored: {}",
                        fragment.order, request.resource_id, e
                    );
                }
            }
        }

        Ok(ContentParseResult {
            resource_point_id: resource.point_id,
            fragment_point_ids,
            segment_ids,
            parser_type: parsed.resource_type,
            total_fragments: parsed.fragments.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_weight_decays_with_order() {
        assert!((fragment_weight(0) - 1.0).abs() < 1e-6);
        assert!((fragment_weight(1) - 0.5).abs() < 1e-6);
        assert!((fragment_weight(3) - 0.25).abs() < 1e-6);
    }
}
