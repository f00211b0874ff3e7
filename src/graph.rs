//! Hybrid point/segment store.
//!
//! Unifies the KV metadata store and the vector index into one logical
//! entity set. A **point** is a knowledge node: metadata in the KV
//! store under `point:<id>`, plus (when it carries text) a vector and
//! the text itself in the vector index. A **segment** is a directed
//! edge stored under two keys, `seg:in:<from>:<to>` and
//! `seg:out:<to>:<from>`, so both directions scan as key ranges.
//!
//! # Write policy
//!
//! Within one `add_point` the KV write happens before the vector upsert
//! happens before the segment write. A KV failure aborts the call with
//! nothing stored; a vector failure after a successful KV write is
//! logged and swallowed and the id is still returned (at-least-once
//! metadata, best-effort vector). The store holds no locks across
//! vector-index or embedding calls.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::embedding::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::ids::IdAllocator;
use crate::kv::{get_json, prefix_end, put_json, KvStore};
use crate::vector::{Distance, Filter, VectorIndex, VectorRecord};

/// A knowledge node.
///
/// `dimension` is a domain tag: 0 = resource (never has a vector),
/// 1 = fragment (carries one). `layer` is an abstraction tier, opaque
/// to the store and used only for filtering. `payload` text is kept
/// only next to the vector, never in the KV record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Point {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub layer: i32,
    #[serde(default)]
    pub dimension: i32,
    #[serde(default = "default_weight")]
    pub weight: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub singularity_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl Default for Point {
    fn default() -> Self {
        Self {
            id: 0,
            layer: 0,
            dimension: 0,
            weight: default_weight(),
            singularity_id: None,
            user_id: None,
            payload: None,
        }
    }
}

fn default_weight() -> f32 {
    1.0
}

/// The KV-persisted shape of a point: everything except the payload
/// text. Field names are the binding external layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PointRecord {
    id: i64,
    layer: i32,
    dimension: i32,
    weight: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    singularity_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<i64>,
}

impl From<&Point> for PointRecord {
    fn from(p: &Point) -> Self {
        Self {
            id: p.id,
            layer: p.layer,
            dimension: p.dimension,
            weight: p.weight,
            singularity_id: p.singularity_id,
            user_id: p.user_id,
        }
    }
}

impl PointRecord {
    fn into_point(self) -> Point {
        Point {
            id: self.id,
            layer: self.layer,
            dimension: self.dimension,
            weight: self.weight,
            singularity_id: self.singularity_id,
            user_id: self.user_id,
            payload: None,
        }
    }
}

/// A directed edge between two points, persisted under both the
/// inbound and the outbound key with identical JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: i64,
    pub from_id: i64,
    pub to_id: i64,
    #[serde(default = "default_weight")]
    pub weight: f32,
    #[serde(default)]
    pub layer: i32,
    #[serde(default)]
    pub dimension: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub singularity_id: Option<i64>,
}

/// Result of [`HybridStore::add_point`]: the point id plus the id of
/// the auto-created segment when a `from_id` was given.
#[derive(Debug, Clone, Copy)]
pub struct AddPointOutcome {
    pub point_id: i64,
    pub segment_id: Option<i64>,
}

/// A filtered vector-search request. Exactly one of `query` /
/// `query_embedding` must be set; omitted filter fields are not
/// applied.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: Option<String>,
    pub query_embedding: Option<Vec<f32>>,
    pub singularity_id: Option<i64>,
    pub dimension: Option<i32>,
    pub layer: Option<i32>,
    pub limit: usize,
    pub score_threshold: f32,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: None,
            query_embedding: None,
            singularity_id: None,
            dimension: None,
            layer: None,
            limit: 10,
            score_threshold: 0.0,
        }
    }
}

/// One search hit, score and payload verbatim from the vector index.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: i64,
    pub score: f32,
    pub payload: HashMap<String, Value>,
}

pub fn point_key(id: i64) -> String {
    format!("point:{id}")
}

pub fn seg_in_key(from_id: i64, to_id: i64) -> String {
    format!("seg:in:{from_id}:{to_id}")
}

pub fn seg_out_key(from_id: i64, to_id: i64) -> String {
    format!("seg:out:{to_id}:{from_id}")
}

/// Payload fields indexed for filtering, created on open.
const INDEXED_FIELDS: &[(&str, &str)] = &[
    ("layer", "integer"),
    ("dimension", "integer"),
    ("weight", "float"),
    ("singularityId", "integer"),
    ("userId", "integer"),
    ("fromId", "integer"),
];

pub struct HybridStore {
    kv: Arc<dyn KvStore>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    collection: String,
    embedding_type: String,
    point_ids: IdAllocator,
    segment_ids: IdAllocator,
}

impl HybridStore {
    /// Open the store over its backends: ensure the collection and its
    /// payload indexes exist, then advance both id allocators past any
    /// id already present in the KV store so a restart never re-issues
    /// a live id.
    pub async fn open(
        kv: Arc<dyn KvStore>,
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        collection: &str,
        vector_size: usize,
        distance: Distance,
        embedding_type: &str,
    ) -> Result<Self> {
        if !vectors.collection_exists(collection).await? {
            vectors
                .create_collection(collection, vector_size, distance)
                .await?;
        }
        for (field, schema_type) in INDEXED_FIELDS {
            vectors
                .create_payload_index(collection, field, schema_type)
                .await?;
        }

        let store = Self {
            kv,
            vectors,
            embedder,
            collection: collection.to_string(),
            embedding_type: embedding_type.to_string(),
            point_ids: IdAllocator::new(),
            segment_ids: IdAllocator::new(),
        };
        store.recover_id_floor().await?;
        Ok(store)
    }

    async fn recover_id_floor(&self) -> Result<()> {
        let points = self
            .kv
            .range_scan("point:", &prefix_end("point:"))
            .await?;
        for (key, _) in &points {
            if let Ok(id) = key["point:".len()..].parse::<i64>() {
                self.point_ids.advance_past(id);
            }
        }

        let segments = self
            .kv
            .range_scan("seg:in:", &prefix_end("seg:in:"))
            .await?;
        for (_, value) in &segments {
            if let Ok(seg) = serde_json::from_slice::<Segment>(value) {
                self.segment_ids.advance_past(seg.id);
            }
        }
        Ok(())
    }

    pub fn kv(&self) -> &Arc<dyn KvStore> {
        &self.kv
    }

    pub fn vectors(&self) -> &Arc<dyn VectorIndex> {
        &self.vectors
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Create a point. Assigns an id when `point.id == 0`. The KV write
    /// is fatal on failure; vector-side failures after it are logged
    /// and swallowed. With `from_id` set, a segment `from_id -> id` is
    /// appended after the point lands.
    pub async fn add_point(
        &self,
        from_id: Option<i64>,
        mut point: Point,
        embedding: Option<Vec<f32>>,
    ) -> Result<AddPointOutcome> {
        if point.id == 0 {
            point.id = self.point_ids.next();
        } else {
            // Caller-chosen id: keep the allocator ahead of it.
            self.point_ids.advance_past(point.id);
        }

        put_json(self.kv.as_ref(), &point_key(point.id), &PointRecord::from(&point)).await?;

        // Resource points (dimension 0) never get a vector entry.
        if point.dimension != 0 {
            if let Some(vector) = self.resolve_embedding(&point, embedding).await {
                let record = VectorRecord {
                    id: point.id as u64,
                    vector,
                    payload: self.vector_payload(&point, from_id),
                };
                if let Err(e) = self.vectors.upsert_points(&self.collection, vec![record]).await {
                    eprintln!(
                        "Warning: vector upsert for point {} failed: {}",
                        point.id, e
                    );
                }
            }
        }

        let segment_id = match from_id {
            Some(from) => Some(self.add_segment(from, point.id).await?),
            None => None,
        };

        Ok(AddPointOutcome {
            point_id: point.id,
            segment_id,
        })
    }

    /// Rewrite a point's metadata and refresh its vector: a non-empty
    /// payload re-embeds (unless an embedding is supplied), an empty
    /// payload deletes the vector entry.
    pub async fn update_point(&self, point: Point, embedding: Option<Vec<f32>>) -> Result<()> {
        let key = point_key(point.id);
        if !self.kv.exists(&key).await? {
            return Err(Error::NotFound(key));
        }

        put_json(self.kv.as_ref(), &key, &PointRecord::from(&point)).await?;

        let has_payload = point.payload.as_deref().is_some_and(|p| !p.is_empty());
        if point.dimension != 0 && (has_payload || embedding.is_some()) {
            let vector = match embedding {
                Some(v) => v,
                None => {
                    let payload = point.payload.as_deref().unwrap_or_default();
                    let mut batch = self
                        .embedder
                        .embed_batch(&self.embedding_type, &[payload.to_string()])
                        .await?;
                    if batch.is_empty() {
                        return Err(Error::EmbeddingMismatch {
                            expected: 1,
                            actual: 0,
                        });
                    }
                    batch.remove(0)
                }
            };
            let record = VectorRecord {
                id: point.id as u64,
                vector,
                payload: self.vector_payload(&point, None),
            };
            self.vectors
                .upsert_points(&self.collection, vec![record])
                .await?;
        } else {
            self.vectors
                .delete_points(&self.collection, &[point.id as u64])
                .await?;
        }
        Ok(())
    }

    /// Delete a point's metadata and vector. Segments referencing the
    /// id are left in place; callers tolerate dangling edges.
    pub async fn delete_point(&self, id: i64) -> Result<()> {
        let existed = self.kv.delete(&point_key(id)).await?;
        if !existed {
            return Err(Error::NotFound(point_key(id)));
        }
        self.vectors
            .delete_points(&self.collection, &[id as u64])
            .await?;
        Ok(())
    }

    pub async fn get_point(&self, id: i64) -> Result<Option<Point>> {
        let record: Option<PointRecord> = get_json(self.kv.as_ref(), &point_key(id)).await?;
        Ok(record.map(PointRecord::into_point))
    }

    /// Append a segment `from_id -> to_id`, written under both the
    /// inbound and outbound key. If the second write fails the first is
    /// undone, so a half-edge is never left behind.
    pub async fn add_segment(&self, from_id: i64, to_id: i64) -> Result<i64> {
        if from_id <= 0 || to_id <= 0 {
            return Err(Error::invalid("segment endpoints must be assigned point ids"));
        }

        let segment = Segment {
            id: self.segment_ids.next(),
            from_id,
            to_id,
            weight: 1.0,
            layer: 0,
            dimension: 0,
            singularity_id: None,
        };

        let in_key = seg_in_key(from_id, to_id);
        let out_key = seg_out_key(from_id, to_id);

        put_json(self.kv.as_ref(), &in_key, &segment).await?;
        if let Err(e) = put_json(self.kv.as_ref(), &out_key, &segment).await {
            if let Err(undo) = self.kv.delete(&in_key).await {
                eprintln!("Warning: could not undo half-written segment {in_key}: {undo}");
            }
            return Err(e);
        }

        Ok(segment.id)
    }

    /// Delete a segment. Both keys must be present; observing exactly
    /// one is reported as an inconsistency with the surviving key.
    pub async fn delete_segment(&self, from_id: i64, to_id: i64) -> Result<()> {
        let in_key = seg_in_key(from_id, to_id);
        let out_key = seg_out_key(from_id, to_id);

        let in_present = self.kv.exists(&in_key).await?;
        let out_present = self.kv.exists(&out_key).await?;

        match (in_present, out_present) {
            (false, false) => Err(Error::NotFound(in_key)),
            (true, false) => Err(Error::Inconsistency {
                key: in_key,
                message: "half-edge: outbound record missing".to_string(),
            }),
            (false, true) => Err(Error::Inconsistency {
                key: out_key,
                message: "half-edge: inbound record missing".to_string(),
            }),
            (true, true) => {
                self.kv.delete(&in_key).await?;
                self.kv.delete(&out_key).await?;
                Ok(())
            }
        }
    }

    pub async fn get_segment(&self, from_id: i64, to_id: i64) -> Result<Option<Segment>> {
        get_json(self.kv.as_ref(), &seg_in_key(from_id, to_id)).await
    }

    /// Filtered vector search. Embeds the query text unless the caller
    /// supplied a vector; results come back verbatim from the index,
    /// score-descending with sub-threshold hits excluded.
    pub async fn search(&self, request: SearchRequest) -> Result<Vec<SearchHit>> {
        let vector = match (request.query, request.query_embedding) {
            (Some(_), Some(_)) | (None, None) => {
                return Err(Error::invalid(
                    "exactly one of query or query_embedding must be set",
                ));
            }
            (None, Some(vector)) => vector,
            (Some(query), None) => {
                let mut batch = self
                    .embedder
                    .embed_batch(&self.embedding_type, &[query])
                    .await?;
                if batch.is_empty() {
                    return Err(Error::EmbeddingMismatch {
                        expected: 1,
                        actual: 0,
                    });
                }
                batch.remove(0)
            }
        };

        let mut filter = Filter::new();
        if let Some(singularity_id) = request.singularity_id {
            filter = filter.field("singularityId", singularity_id);
        }
        if let Some(dimension) = request.dimension {
            filter = filter.field("dimension", dimension);
        }
        if let Some(layer) = request.layer {
            filter = filter.field("layer", layer);
        }
        let filter = if filter.is_empty() { None } else { Some(filter) };

        let hits = self
            .vectors
            .search(
                &self.collection,
                &vector,
                filter.as_ref(),
                request.limit,
                request.score_threshold,
            )
            .await?;

        Ok(hits
            .into_iter()
            .map(|h| SearchHit {
                id: h.id as i64,
                score: h.score,
                payload: h.payload,
            })
            .collect())
    }

    /// Embedding for a new point: the supplied one wins; otherwise a
    /// non-empty payload is embedded. Provider failures here are
    /// best-effort: logged, and the point stays vector-less.
    async fn resolve_embedding(
        &self,
        point: &Point,
        embedding: Option<Vec<f32>>,
    ) -> Option<Vec<f32>> {
        if embedding.is_some() {
            return embedding;
        }
        let payload = point.payload.as_deref().filter(|p| !p.is_empty())?;
        match self
            .embedder
            .embed_batch(&self.embedding_type, &[payload.to_string()])
            .await
        {
            Ok(mut batch) if !batch.is_empty() => Some(batch.remove(0)),
            Ok(_) => {
                eprintln!(
                    "Warning: embedding provider returned no vector for point {}",
                    point.id
                );
                None
            }
            Err(e) => {
                eprintln!("Warning: embedding for point {} failed: {}", point.id, e);
                None
            }
        }
    }

    fn vector_payload(&self, point: &Point, from_id: Option<i64>) -> HashMap<String, Value> {
        let mut payload = HashMap::new();
        payload.insert("layer".to_string(), Value::from(point.layer));
        payload.insert("dimension".to_string(), Value::from(point.dimension));
        payload.insert("weight".to_string(), Value::from(point.weight as f64));
        if let Some(singularity_id) = point.singularity_id {
            payload.insert("singularityId".to_string(), Value::from(singularity_id));
        }
        if let Some(user_id) = point.user_id {
            payload.insert("userId".to_string(), Value::from(user_id));
        }
        if let Some(from_id) = from_id {
            payload.insert("fromId".to_string(), Value::from(from_id));
        }
        if let Some(text) = &point.payload {
            payload.insert("payload".to_string(), Value::from(text.clone()));
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_record_serializes_binding_layout() {
        let point = Point {
            id: 12,
            layer: 1,
            dimension: 1,
            weight: 0.5,
            singularity_id: Some(7),
            user_id: None,
            payload: Some("text that must not be persisted".to_string()),
        };
        let json = serde_json::to_value(PointRecord::from(&point)).unwrap();
        assert_eq!(json["id"], 12);
        assert_eq!(json["singularityId"], 7);
        assert!(json.get("payload").is_none());
        assert!(json.get("userId").is_none());
    }

    #[test]
    fn segment_keys_follow_layout() {
        assert_eq!(seg_in_key(17, 42), "seg:in:17:42");
        assert_eq!(seg_out_key(17, 42), "seg:out:42:17");
        assert_eq!(point_key(5), "point:5");
    }
}
