use super::*;
use crate::config::{Config, StoreConfig};
use crate::database::lancedb::EmbeddingStore;
use tempfile::TempDir;

fn hit(id: &str, score: f32) -> SearchHit {
    SearchHit {
        id: id.to_string(),
        score,
        distance: 1.0 - score,
    }
}

async fn create_test_index(
    records: &[(&str, Vec<f32>)],
) -> (SimilarityIndex, EmbeddingStore, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        store: StoreConfig {
            embedding_dimension: 2,
            ..StoreConfig::default()
        },
        ..Config::default()
    };

    let client = Arc::new(StoreClient::open(&config).await.expect("should open client"));
    let store = EmbeddingStore::new(Arc::clone(&client), 2)
        .await
        .expect("should create store");

    let (ids, vectors): (Vec<String>, Vec<Vec<f32>>) = records
        .iter()
        .map(|(id, vector)| ((*id).to_string(), vector.clone()))
        .unzip();
    store
        .batch_upsert(Collection::Participants, ids, vectors)
        .await
        .expect("should seed participants");

    let index = SimilarityIndex::new(client, 2, SearchParams::from_config(&config.store));
    (index, store, temp_dir)
}

#[test]
fn rank_hits_orders_by_score_then_id() {
    let ranked = rank_hits(
        vec![hit("b", 0.5), hit("c", 0.9), hit("a", 0.5)],
        None,
        10,
    );
    let ids: Vec<_> = ranked.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["c", "a", "b"]);
}

#[test]
fn rank_hits_excludes_and_truncates() {
    let ranked = rank_hits(
        vec![hit("self", 1.0), hit("a", 0.8), hit("b", 0.7), hit("c", 0.1)],
        Some("self"),
        2,
    );
    let ids: Vec<_> = ranked.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[test]
fn rank_hits_keeps_best_duplicate() {
    let ranked = rank_hits(vec![hit("a", 0.2), hit("a", 0.9), hit("b", 0.5)], None, 10);
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0], hit("a", 0.9));
}

#[test]
fn search_params_follow_config() {
    let config = StoreConfig {
        nprobes: 32,
        refine_factor: Some(5),
        query_timeout_secs: 7,
        ..StoreConfig::default()
    };
    let params = SearchParams::from_config(&config);
    assert_eq!(params.nprobes, 32);
    assert_eq!(params.refine_factor, Some(5));
    assert_eq!(params.timeout, Duration::from_secs(7));
}

#[tokio::test]
async fn search_ranks_by_cosine_similarity() {
    let (index, _store, _temp_dir) = create_test_index(&[
        ("east", vec![1.0, 0.0]),
        ("north", vec![0.0, 1.0]),
        ("northeast", vec![0.707_106_8, 0.707_106_8]),
    ])
    .await;

    let hits = index
        .search(Collection::Participants, &[1.0, 0.0], None, 3)
        .await
        .expect("search should succeed");

    let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["east", "northeast", "north"]);
    assert!((hits[0].score - 1.0).abs() < 1e-4);
    assert!(hits[2].score.abs() < 1e-4);
    for hit in &hits {
        assert!((hit.score + hit.distance - 1.0).abs() < 1e-5);
    }
}

#[tokio::test]
async fn search_excludes_requested_id() {
    let (index, _store, _temp_dir) = create_test_index(&[
        ("me", vec![1.0, 0.0]),
        ("other", vec![0.0, 1.0]),
    ])
    .await;

    let hits = index
        .search(Collection::Participants, &[1.0, 0.0], Some("me"), 5)
        .await
        .expect("search should succeed");

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "other");
}

#[tokio::test]
async fn search_respects_top_k() {
    let (index, _store, _temp_dir) = create_test_index(&[
        ("a", vec![1.0, 0.0]),
        ("b", vec![0.0, 1.0]),
        ("c", vec![0.6, 0.8]),
    ])
    .await;

    let hits = index
        .search(Collection::Participants, &[0.6, 0.8], None, 2)
        .await
        .expect("search should succeed");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "c");

    let none = index
        .search(Collection::Participants, &[0.6, 0.8], None, 0)
        .await
        .expect("search should succeed");
    assert!(none.is_empty());
}

#[tokio::test]
async fn search_rejects_wrong_dimension() {
    let (index, _store, _temp_dir) = create_test_index(&[("a", vec![1.0, 0.0])]).await;

    let result = index
        .search(Collection::Participants, &[1.0, 0.0, 0.0], None, 2)
        .await;
    assert!(matches!(
        result,
        Err(RecommenderError::DimensionMismatch { .. })
    ));
}

#[tokio::test]
async fn search_empty_collection() {
    let (index, _store, _temp_dir) = create_test_index(&[]).await;

    let hits = index
        .search(Collection::Participants, &[1.0, 0.0], None, 5)
        .await
        .expect("search should succeed on empty table");
    assert!(hits.is_empty());
}

#[test]
fn search_limit_never_exceeds_table_size() {
    assert_eq!(search_limit(3, 100), 3 + SEARCH_MARGIN);
    assert_eq!(search_limit(3, 5), 5);
    assert_eq!(search_limit(usize::MAX, 42), 42);
}

#[tokio::test]
async fn search_with_unbounded_top_k_returns_every_row() {
    let (index, _store, _temp_dir) = create_test_index(&[
        ("a", vec![1.0, 0.0]),
        ("b", vec![0.0, 1.0]),
        ("c", vec![0.6, 0.8]),
    ])
    .await;

    let hits = index
        .search(Collection::Participants, &[1.0, 0.0], Some("a"), usize::MAX)
        .await
        .expect("search should succeed");
    let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["c", "b"]);
}

#[tokio::test]
async fn duplicate_rows_do_not_shorten_results() {
    let (index, _store, _temp_dir) = create_test_index(&[
        ("a", vec![1.0, 0.0]),
        ("a", vec![1.0, 0.0]),
        ("a", vec![1.0, 0.0]),
        ("b", vec![0.8, 0.6]),
        ("c", vec![0.6, 0.8]),
        ("d", vec![0.0, 1.0]),
    ])
    .await;

    let hits = index
        .search(Collection::Participants, &[1.0, 0.0], None, 3)
        .await
        .expect("search should succeed");
    let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}
