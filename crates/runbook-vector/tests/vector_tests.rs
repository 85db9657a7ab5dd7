use std::collections::HashSet;

use runbook_core::traits::Retriever;
use runbook_core::types::SourceKind;
use runbook_vector::{CacheEntry, EmbeddingCache, VectorIndex};

#[test]
fn nearest_vectors_rank_first() {
    let mut index = VectorIndex::new(3);
    index.index("a#1", vec![1.0, 0.0, 0.0]).unwrap();
    index.index("b#1", vec![0.7, 0.7, 0.0]).unwrap();
    index.index("c#1", vec![0.0, 0.0, 5.0]).unwrap();

    let hits = index.search(&[1.0, 0.1, 0.0], 10);
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["a#1", "b#1", "c#1"]);
    assert!(hits.iter().all(|h| h.source == SourceKind::Vector));
    assert!(hits[2].score.abs() < 1e-6, "orthogonal vector scores zero");
}

#[test]
fn stored_vectors_are_normalized() {
    let mut index = VectorIndex::new(2);
    index.index("a#1", vec![3.0, 4.0]).unwrap();
    let v = index.get("a#1").unwrap();
    assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);

    let hits = index.search(&[30.0, 40.0], 1);
    assert!((hits[0].score - 1.0).abs() < 1e-5);
}

#[test]
fn equal_similarity_breaks_ties_by_id() {
    let mut index = VectorIndex::new(2);
    for id in ["z#1", "b#1", "m#1"] {
        index.index(id, vec![1.0, 1.0]).unwrap();
    }
    let ids: Vec<String> = index.search(&[1.0, 1.0], 10).into_iter().map(|h| h.id).collect();
    assert_eq!(ids, vec!["b#1", "m#1", "z#1"]);
}

#[test]
fn dimension_mismatches_are_rejected() {
    let mut index = VectorIndex::new(3);
    assert!(index.index("a#1", vec![1.0, 0.0]).is_err());
    index.index("a#1", vec![1.0, 0.0, 0.0]).unwrap();
    assert!(index.search(&[1.0, 0.0], 10).is_empty());
}

#[test]
fn remove_and_filter() {
    let mut index = VectorIndex::new(2);
    index.index("docs#1", vec![1.0, 0.0]).unwrap();
    index.index("issues#1", vec![0.9, 0.1]).unwrap();
    index.index("issues#2", vec![0.0, 1.0]).unwrap();

    let hits = index.search_where(&[1.0, 0.0], 1, &|id| id.starts_with("issues"));
    assert_eq!(hits[0].id, "issues#1");

    index.remove(&["issues#1".to_string()]);
    assert_eq!(index.len(), 2);
    assert!(!index.contains("issues#1"));
    assert_eq!(index.search(&[1.0, 0.0], 1)[0].id, "docs#1");
}

#[test]
fn empty_index_returns_nothing() {
    let index = VectorIndex::new(4);
    assert!(index.is_empty());
    assert!(index.search(&[1.0, 0.0, 0.0, 0.0], 5).is_empty());
}

#[test]
fn embedding_cache_is_scoped_by_embedder() {
    let cache = EmbeddingCache::new();
    cache.put_many(vec![
        CacheEntry::new("h1", "hash:xxh64:d2", vec![1.0, 0.0]),
        CacheEntry::new("h2", "hash:xxh64:d2", vec![0.0, 1.0]),
        CacheEntry::new("h1", "other", vec![0.5, 0.5]),
    ]);

    let hashes = vec!["h1".to_string(), "h2".to_string(), "h3".to_string()];
    let found = cache.get_many("hash:xxh64:d2", &hashes);
    assert_eq!(found.len(), 2);
    assert_eq!(found["h1"], vec![1.0, 0.0]);
    assert_eq!(cache.get_many("other", &hashes).len(), 1);

    let live: HashSet<String> = ["h2".to_string()].into_iter().collect();
    assert_eq!(cache.retain(&live), 2);
    assert_eq!(cache.len(), 1);
    assert!(cache.get_many("hash:xxh64:d2", &hashes).contains_key("h2"));
}
