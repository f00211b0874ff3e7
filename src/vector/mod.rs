//! Vector index abstraction.
//!
//! A [`VectorIndex`] is a named set of collections, each holding
//! `(id, vector, payload)` tuples with a fixed dimensionality and
//! distance function chosen at creation. Searches are k-nearest with an
//! optional AND-of-equalities payload filter; results come back ordered
//! by score descending with sub-threshold hits already excluded, and
//! callers never re-sort.
//!
//! | Impl | Backing |
//! |------|---------|
//! | [`memory::MemoryVectorIndex`] | brute-force scan over in-process maps |
//! | [`sqlite::SqliteVectorIndex`] | f32 BLOBs + payload JSON in SQLite, scored in process |

pub mod memory;
pub mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};

/// Distance function fixed at collection creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distance {
    Cosine,
    Dot,
}

impl Distance {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "cosine" => Ok(Distance::Cosine),
            "dot" => Ok(Distance::Dot),
            other => Err(Error::invalid(format!("unknown distance '{other}'"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Distance::Cosine => "cosine",
            Distance::Dot => "dot",
        }
    }

    /// Similarity score between two equal-length vectors; higher is closer.
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Distance::Cosine => cosine_similarity(a, b),
            Distance::Dot => a.iter().zip(b.iter()).map(|(x, y)| x * y).sum(),
        }
    }
}

/// One indexed vector with its metadata payload.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: u64,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, Value>,
}

/// A search hit: id, similarity score, and the stored payload.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: u64,
    pub score: f32,
    pub payload: HashMap<String, Value>,
}

/// Conjunction of field-equality conditions over payload values.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub must: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.must.push((name.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
    }

    pub fn matches(&self, payload: &HashMap<String, Value>) -> bool {
        self.must
            .iter()
            .all(|(name, value)| payload.get(name) == Some(value))
    }
}

/// Named vector collections with filtered kNN search.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn create_collection(
        &self,
        name: &str,
        vector_size: usize,
        distance: Distance,
    ) -> Result<()>;

    async fn collection_exists(&self, name: &str) -> Result<bool>;

    async fn delete_collection(&self, name: &str) -> Result<()>;

    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Insert or overwrite points; concurrent upserts to the same id
    /// are last-writer-wins.
    async fn upsert_points(&self, collection: &str, points: Vec<VectorRecord>) -> Result<()>;

    async fn delete_points(&self, collection: &str, ids: &[u64]) -> Result<()>;

    /// Score-ordered hits at or above `score_threshold`, at most `limit`.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: Option<&Filter>,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>>;

    /// Declare a payload field as filterable. Idempotent: declaring an
    /// existing index is not an error.
    async fn create_payload_index(
        &self,
        collection: &str,
        field: &str,
        schema_type: &str,
    ) -> Result<()>;
}

/// Compute cosine similarity between two vectors.
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Brute-force scoring shared by both implementations: score every
/// candidate, drop filter misses and sub-threshold hits, sort
/// descending, truncate.
fn rank(
    candidates: impl Iterator<Item = (u64, Vec<f32>, HashMap<String, Value>)>,
    query: &[f32],
    distance: Distance,
    filter: Option<&Filter>,
    limit: usize,
    score_threshold: f32,
) -> Vec<ScoredPoint> {
    let mut hits: Vec<ScoredPoint> = candidates
        .filter_map(|(id, vector, payload)| {
            if let Some(f) = filter {
                if !f.matches(&payload) {
                    return None;
                }
            }
            let score = distance.score(query, &vector);
            if score < score_threshold {
                return None;
            }
            Some(ScoredPoint { id, score, payload })
        })
        .collect();
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(limit);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn cosine_identical_and_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn dot_score() {
        let score = Distance::Dot.score(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]);
        assert!((score - 32.0).abs() < 1e-6);
    }

    #[test]
    fn filter_matches_all_conditions() {
        let mut payload = HashMap::new();
        payload.insert("dimension".to_string(), Value::from(1));
        payload.insert("singularityId".to_string(), Value::from(7));

        let filter = Filter::new().field("dimension", 1).field("singularityId", 7);
        assert!(filter.matches(&payload));

        let wrong = Filter::new().field("dimension", 1).field("singularityId", 8);
        assert!(!wrong.matches(&payload));

        let absent = Filter::new().field("layer", 0);
        assert!(!absent.matches(&payload));
    }
}
