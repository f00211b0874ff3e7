//! Hybrid store integration tests over in-memory backends.

use std::sync::Arc;

use async_trait::async_trait;

use synapse::embedding::EmbeddingProvider;
use synapse::error::{Error, Result};
use synapse::graph::{seg_in_key, seg_out_key, HybridStore, Point, SearchRequest};
use synapse::kv::{memory::MemoryKv, KvStore};
use synapse::vector::{memory::MemoryVectorIndex, Distance, VectorIndex};

const DIMS: usize = 4;

/// Deterministic pseudo-embedding: accumulate byte values per lane and
/// normalize.
fn embed_text(text: &str, dims: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dims];
    for (i, b) in text.bytes().enumerate() {
        v[i % dims] += (b as f32) / 255.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

struct StubEmbedder;

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    fn model_name(&self) -> &str {
        "stub"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed_batch(&self, _embedding_type: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| embed_text(t, DIMS)).collect())
    }
}

struct Fixture {
    kv: Arc<dyn KvStore>,
    vectors: Arc<dyn VectorIndex>,
    store: HybridStore,
}

async fn fixture() -> Fixture {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let vectors: Arc<dyn VectorIndex> = Arc::new(MemoryVectorIndex::new());
    let store = HybridStore::open(
        kv.clone(),
        vectors.clone(),
        Arc::new(StubEmbedder),
        "points",
        DIMS,
        Distance::Cosine,
        "default",
    )
    .await
    .unwrap();
    Fixture { kv, vectors, store }
}

fn point(id: i64, dimension: i32, singularity_id: Option<i64>, payload: &str) -> Point {
    Point {
        id,
        dimension,
        singularity_id,
        payload: Some(payload.to_string()),
        ..Point::default()
    }
}

#[tokio::test]
async fn segment_is_stored_under_both_keys_with_identical_payload() {
    let f = fixture().await;
    f.store.add_segment(17, 42).await.unwrap();

    let inbound = f.kv.get(&seg_in_key(17, 42)).await.unwrap().unwrap();
    let outbound = f.kv.get(&seg_out_key(17, 42)).await.unwrap().unwrap();
    assert_eq!(inbound, outbound);

    let segment = f.store.get_segment(17, 42).await.unwrap().unwrap();
    assert_eq!(segment.from_id, 17);
    assert_eq!(segment.to_id, 42);
}

#[tokio::test]
async fn deleted_segment_leaves_no_keys_behind() {
    let f = fixture().await;
    f.store.add_segment(17, 42).await.unwrap();
    f.store.delete_segment(17, 42).await.unwrap();

    assert!(!f.kv.exists(&seg_in_key(17, 42)).await.unwrap());
    assert!(!f.kv.exists(&seg_out_key(17, 42)).await.unwrap());
}

#[tokio::test]
async fn deleting_a_missing_segment_is_not_found() {
    let f = fixture().await;
    let err = f.store.delete_segment(1, 2).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn half_edge_is_reported_as_inconsistency() {
    let f = fixture().await;
    f.store.add_segment(17, 42).await.unwrap();
    f.kv.delete(&seg_out_key(17, 42)).await.unwrap();

    let err = f.store.delete_segment(17, 42).await.unwrap_err();
    match err {
        Error::Inconsistency { key, .. } => assert_eq!(key, seg_in_key(17, 42)),
        other => panic!("expected inconsistency, got {other:?}"),
    }
}

#[tokio::test]
async fn segment_endpoints_must_be_assigned() {
    let f = fixture().await;
    let err = f.store.add_segment(0, 42).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn search_filters_on_singularity_and_dimension() {
    let f = fixture().await;
    let vector = vec![1.0, 0.0, 0.0, 0.0];

    f.store
        .add_point(None, point(1001, 0, None, "resource"), None)
        .await
        .unwrap();
    f.store
        .add_point(None, point(1002, 1, Some(7), "tenant seven"), Some(vector.clone()))
        .await
        .unwrap();
    f.store
        .add_point(None, point(1003, 1, Some(8), "tenant eight"), Some(vector.clone()))
        .await
        .unwrap();

    let hits = f
        .store
        .search(SearchRequest {
            query_embedding: Some(vector),
            singularity_id: Some(7),
            dimension: Some(1),
            ..SearchRequest::default()
        })
        .await
        .unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, 1002);
    assert_eq!(hits[0].payload["payload"], "tenant seven");
}

#[tokio::test]
async fn dimension_zero_points_never_reach_the_vector_index() {
    let f = fixture().await;
    // Even an explicit embedding must not land for a resource point.
    f.store
        .add_point(
            None,
            point(50, 0, None, "resource text"),
            Some(vec![1.0, 0.0, 0.0, 0.0]),
        )
        .await
        .unwrap();

    let hits = f
        .vectors
        .search("points", &[1.0, 0.0, 0.0, 0.0], None, 100, -1.0)
        .await
        .unwrap();
    assert!(hits.iter().all(|h| h.id != 50));
}

#[tokio::test]
async fn search_requires_exactly_one_query_form() {
    let f = fixture().await;

    let err = f.store.search(SearchRequest::default()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let err = f
        .store
        .search(SearchRequest {
            query: Some("q".to_string()),
            query_embedding: Some(vec![1.0, 0.0, 0.0, 0.0]),
            ..SearchRequest::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn text_queries_are_embedded_and_searchable() {
    let f = fixture().await;
    f.store
        .add_point(None, point(0, 1, None, "the quick brown fox"), None)
        .await
        .unwrap();

    let hits = f
        .store
        .search(SearchRequest {
            query: Some("the quick brown fox".to_string()),
            ..SearchRequest::default()
        })
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].score > 0.99);
}

#[tokio::test]
async fn assigned_ids_are_strictly_increasing() {
    let f = fixture().await;
    let mut prev = 0;
    for _ in 0..10 {
        let outcome = f
            .store
            .add_point(None, Point::default(), None)
            .await
            .unwrap();
        assert!(outcome.point_id > prev);
        prev = outcome.point_id;
    }
}

#[tokio::test]
async fn reopening_advances_ids_past_existing_points() {
    let f = fixture().await;
    f.store
        .add_point(None, point(500, 1, None, "preexisting"), None)
        .await
        .unwrap();
    f.store.add_segment(1, 2).await.unwrap();

    let reopened = HybridStore::open(
        f.kv.clone(),
        f.vectors.clone(),
        Arc::new(StubEmbedder),
        "points",
        DIMS,
        Distance::Cosine,
        "default",
    )
    .await
    .unwrap();

    let outcome = reopened
        .add_point(None, Point::default(), None)
        .await
        .unwrap();
    assert!(outcome.point_id > 500);

    let segment_id = reopened.add_segment(3, 4).await.unwrap();
    let first = f.store.get_segment(1, 2).await.unwrap().unwrap();
    assert!(segment_id > first.id);
}

#[tokio::test]
async fn add_point_with_from_id_appends_a_segment() {
    let f = fixture().await;
    let parent = f
        .store
        .add_point(None, Point::default(), None)
        .await
        .unwrap();
    let child = f
        .store
        .add_point(Some(parent.point_id), point(0, 1, None, "child"), None)
        .await
        .unwrap();

    assert!(child.segment_id.is_some());
    let segment = f
        .store
        .get_segment(parent.point_id, child.point_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(segment.id, child.segment_id.unwrap());
}

#[tokio::test]
async fn delete_point_leaves_segments_dangling() {
    let f = fixture().await;
    let parent = f
        .store
        .add_point(None, Point::default(), None)
        .await
        .unwrap();
    let child = f
        .store
        .add_point(Some(parent.point_id), point(0, 1, None, "child"), None)
        .await
        .unwrap();

    f.store.delete_point(child.point_id).await.unwrap();

    assert!(f.store.get_point(child.point_id).await.unwrap().is_none());
    // The edge survives deliberately; callers tolerate dangling segments.
    assert!(f
        .store
        .get_segment(parent.point_id, child.point_id)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn delete_point_removes_metadata_and_vector() {
    let f = fixture().await;
    let outcome = f
        .store
        .add_point(None, point(0, 1, None, "to be deleted"), None)
        .await
        .unwrap();

    f.store.delete_point(outcome.point_id).await.unwrap();

    let hits = f
        .store
        .search(SearchRequest {
            query: Some("to be deleted".to_string()),
            ..SearchRequest::default()
        })
        .await
        .unwrap();
    assert!(hits.is_empty());

    let err = f.store.delete_point(outcome.point_id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn update_point_with_empty_payload_drops_the_vector() {
    let f = fixture().await;
    let outcome = f
        .store
        .add_point(None, point(0, 1, None, "searchable text"), None)
        .await
        .unwrap();

    let mut updated = point(outcome.point_id, 1, None, "searchable text");
    updated.payload = None;
    f.store.update_point(updated, None).await.unwrap();

    let hits = f
        .store
        .search(SearchRequest {
            query: Some("searchable text".to_string()),
            ..SearchRequest::default()
        })
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn update_point_refreshes_metadata_and_vector() {
    let f = fixture().await;
    let outcome = f
        .store
        .add_point(None, point(0, 1, None, "original text"), None)
        .await
        .unwrap();

    let mut updated = point(outcome.point_id, 1, Some(9), "replacement text");
    updated.weight = 0.25;
    f.store.update_point(updated, None).await.unwrap();

    let stored = f.store.get_point(outcome.point_id).await.unwrap().unwrap();
    assert_eq!(stored.singularity_id, Some(9));
    assert!((stored.weight - 0.25).abs() < 1e-6);

    let hits = f
        .store
        .search(SearchRequest {
            query: Some("replacement text".to_string()),
            singularity_id: Some(9),
            ..SearchRequest::default()
        })
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, outcome.point_id);
}

#[tokio::test]
async fn update_of_missing_point_is_not_found() {
    let f = fixture().await;
    let err = f
        .store
        .update_point(point(9999, 1, None, "ghost"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn point_payload_is_never_written_to_the_kv_store() {
    let f = fixture().await;
    let outcome = f
        .store
        .add_point(None, point(0, 1, Some(3), "secret body text"), None)
        .await
        .unwrap();

    let raw = f
        .kv
        .get(&format!("point:{}", outcome.point_id))
        .await
        .unwrap()
        .unwrap();
    let record: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert!(record.get("payload").is_none());
    assert_eq!(record["singularityId"], 3);
    assert_eq!(record["dimension"], 1);
}
