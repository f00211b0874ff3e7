//! In-memory [`VectorIndex`] for tests and ephemeral deployments.
//!
//! Collections live in a `HashMap` behind `std::sync::RwLock`; search
//! is a brute-force scored scan.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::{rank, Distance, Filter, ScoredPoint, VectorIndex, VectorRecord};

struct Collection {
    vector_size: usize,
    distance: Distance,
    points: HashMap<u64, VectorRecord>,
    payload_indexes: HashSet<String>,
}

#[derive(Default)]
pub struct MemoryVectorIndex {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn create_collection(
        &self,
        name: &str,
        vector_size: usize,
        distance: Distance,
    ) -> Result<()> {
        if vector_size == 0 {
            return Err(Error::invalid("vector_size must be > 0"));
        }
        let mut collections = self.collections.write().unwrap();
        if collections.contains_key(name) {
            return Err(Error::invalid(format!("collection '{name}' already exists")));
        }
        collections.insert(
            name.to_string(),
            Collection {
                vector_size,
                distance,
                points: HashMap::new(),
                payload_indexes: HashSet::new(),
            },
        );
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let collections = self.collections.read().unwrap();
        Ok(collections.contains_key(name))
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().unwrap();
        collections
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("collection '{name}'")))
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let collections = self.collections.read().unwrap();
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn upsert_points(&self, collection: &str, points: Vec<VectorRecord>) -> Result<()> {
        let mut collections = self.collections.write().unwrap();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| Error::NotFound(format!("collection '{collection}'")))?;
        for point in &points {
            if point.vector.len() != coll.vector_size {
                return Err(Error::invalid(format!(
                    "vector size {} does not match collection size {}",
                    point.vector.len(),
                    coll.vector_size
                )));
            }
        }
        for point in points {
            coll.points.insert(point.id, point);
        }
        Ok(())
    }

    async fn delete_points(&self, collection: &str, ids: &[u64]) -> Result<()> {
        let mut collections = self.collections.write().unwrap();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| Error::NotFound(format!("collection '{collection}'")))?;
        for id in ids {
            coll.points.remove(id);
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: Option<&Filter>,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.read().unwrap();
        let coll = collections
            .get(collection)
            .ok_or_else(|| Error::NotFound(format!("collection '{collection}'")))?;
        if vector.len() != coll.vector_size {
            return Err(Error::invalid(format!(
                "query vector size {} does not match collection size {}",
                vector.len(),
                coll.vector_size
            )));
        }
        let candidates = coll
            .points
            .values()
            .map(|p| (p.id, p.vector.clone(), p.payload.clone()));
        Ok(rank(
            candidates,
            vector,
            coll.distance,
            filter,
            limit,
            score_threshold,
        ))
    }

    async fn create_payload_index(
        &self,
        collection: &str,
        field: &str,
        _schema_type: &str,
    ) -> Result<()> {
        let mut collections = self.collections.write().unwrap();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| Error::NotFound(format!("collection '{collection}'")))?;
        coll.payload_indexes.insert(field.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn record(id: u64, vector: Vec<f32>, fields: &[(&str, i64)]) -> VectorRecord {
        let payload = fields
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
            .collect::<HashMap<_, _>>();
        VectorRecord { id, vector, payload }
    }

    #[tokio::test]
    async fn search_orders_by_score_and_applies_threshold() {
        let index = MemoryVectorIndex::new();
        index.create_collection("c", 2, Distance::Cosine).await.unwrap();
        index
            .upsert_points(
                "c",
                vec![
                    record(1, vec![1.0, 0.0], &[]),
                    record(2, vec![0.7, 0.7], &[]),
                    record(3, vec![0.0, 1.0], &[]),
                ],
            )
            .await
            .unwrap();

        let hits = index.search("c", &[1.0, 0.0], None, 10, 0.5).await.unwrap();
        let ids: Vec<u64> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn search_applies_equality_filter() {
        let index = MemoryVectorIndex::new();
        index.create_collection("c", 2, Distance::Cosine).await.unwrap();
        index
            .upsert_points(
                "c",
                vec![
                    record(1, vec![1.0, 0.0], &[("dimension", 1), ("singularityId", 7)]),
                    record(2, vec![1.0, 0.0], &[("dimension", 1), ("singularityId", 8)]),
                    record(3, vec![1.0, 0.0], &[("dimension", 0)]),
                ],
            )
            .await
            .unwrap();

        let filter = Filter::new().field("dimension", 1).field("singularityId", 7);
        let hits = index
            .search("c", &[1.0, 0.0], Some(&filter), 10, 0.0)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 1);
    }

    #[tokio::test]
    async fn upsert_rejects_wrong_dimensionality() {
        let index = MemoryVectorIndex::new();
        index.create_collection("c", 3, Distance::Dot).await.unwrap();
        let err = index
            .upsert_points("c", vec![record(1, vec![1.0, 2.0], &[])])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn upsert_same_id_is_last_writer_wins() {
        let index = MemoryVectorIndex::new();
        index.create_collection("c", 1, Distance::Dot).await.unwrap();
        index
            .upsert_points("c", vec![record(5, vec![1.0], &[("layer", 0)])])
            .await
            .unwrap();
        index
            .upsert_points("c", vec![record(5, vec![2.0], &[("layer", 3)])])
            .await
            .unwrap();
        let hits = index.search("c", &[1.0], None, 10, 0.0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].payload["layer"], 3);
    }

    #[tokio::test]
    async fn payload_index_creation_is_idempotent() {
        let index = MemoryVectorIndex::new();
        index.create_collection("c", 1, Distance::Dot).await.unwrap();
        index.create_payload_index("c", "layer", "integer").await.unwrap();
        index.create_payload_index("c", "layer", "integer").await.unwrap();
    }

    #[tokio::test]
    async fn missing_collection_is_not_found() {
        let index = MemoryVectorIndex::new();
        let err = index.search("nope", &[1.0], None, 10, 0.0).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
