use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub content_hash: String,
    pub embedder_id: String,
    pub vector: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(content_hash: impl Into<String>, embedder_id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self { content_hash: content_hash.into(), embedder_id: embedder_id.into(), vector, created_at: Utc::now() }
    }
}

/// Embeddings keyed by `(content_hash, embedder_id)`.
///
/// Consulted before calling a provider so unchanged chunk text is never
/// embedded twice, across rebuilds as well as incremental updates.
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    entries: RwLock<HashMap<(String, String), CacheEntry>>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached vectors for the requested hashes; misses are simply absent.
    pub fn get_many(&self, embedder_id: &str, hashes: &[String]) -> HashMap<String, Vec<f32>> {
        let entries = self.entries.read();
        hashes
            .iter()
            .filter_map(|h| {
                entries
                    .get(&(h.clone(), embedder_id.to_string()))
                    .map(|e| (h.clone(), e.vector.clone()))
            })
            .collect()
    }

    pub fn put_many(&self, entries: Vec<CacheEntry>) {
        let mut map = self.entries.write();
        for e in entries {
            map.insert((e.content_hash.clone(), e.embedder_id.clone()), e);
        }
    }

    /// Drop entries whose content hash is no longer referenced.
    pub fn retain(&self, live_hashes: &HashSet<String>) -> usize {
        let mut map = self.entries.write();
        let before = map.len();
        map.retain(|(hash, _), _| live_hashes.contains(hash));
        before - map.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
