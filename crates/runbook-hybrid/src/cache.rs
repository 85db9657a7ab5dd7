use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tracing::debug;

use runbook_core::config::CacheSettings;
use runbook_core::types::{SearchFilters, SearchResponse};

/// Filters in canonical form: trimmed, lowercased source types, sorted and
/// deduplicated. An absent or empty list means "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NormalizedFilters {
    pub source_types: Vec<String>,
    pub projects: Vec<String>,
}

impl NormalizedFilters {
    pub fn from_filters(filters: &SearchFilters) -> Self {
        Self {
            source_types: canonical(filters.source_types.as_deref(), true),
            projects: canonical(filters.projects.as_deref(), false),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.source_types.is_empty() && self.projects.is_empty()
    }
}

fn canonical(values: Option<&[String]>, lowercase: bool) -> Vec<String> {
    let mut out: Vec<String> = values
        .unwrap_or_default()
        .iter()
        .map(|v| if lowercase { v.trim().to_lowercase() } else { v.trim().to_string() })
        .collect();
    out.sort();
    out.dedup();
    out
}

/// `(query, filters, top_k)` after normalization, so surface formatting
/// differences share one entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub query: String,
    pub filters: NormalizedFilters,
    pub top_k: usize,
}

impl CacheKey {
    pub fn new(query: &str, filters: NormalizedFilters, top_k: usize) -> Self {
        Self { query: normalize_query(query), filters, top_k }
    }
}

/// Lowercase with whitespace runs collapsed.
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().map(str::to_lowercase).collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

struct Entry {
    response: SearchResponse,
    generation: u64,
    inserted: Instant,
}

struct Inner {
    lru: LruCache<CacheKey, Entry>,
    hits: u64,
    misses: u64,
}

/// Bounded LRU of full search responses.
///
/// Every entry is stamped with the snapshot generation it was computed from.
/// A lookup under any other generation, or past the TTL, is a miss and drops
/// the entry. Lookups reorder the LRU list, so reads take the same lock as
/// writes; the critical section is a hash lookup.
pub struct QueryCache {
    inner: Mutex<Inner>,
    ttl: Option<Duration>,
}

impl QueryCache {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { inner: Mutex::new(Inner { lru: LruCache::new(capacity), hits: 0, misses: 0 }), ttl }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        let ttl = (settings.ttl_secs > 0).then(|| Duration::from_secs(settings.ttl_secs));
        Self::new(settings.capacity, ttl)
    }

    pub fn get(&self, key: &CacheKey, generation: u64) -> Option<SearchResponse> {
        let mut inner = self.inner.lock();
        let valid = match inner.lru.get(key) {
            None => None,
            Some(entry) => Some(entry.generation == generation && !self.expired(entry)),
        };
        match valid {
            Some(true) => {
                inner.hits += 1;
                inner.lru.get(key).map(|e| e.response.clone())
            }
            Some(false) => {
                debug!(query = %key.query, "dropping stale cache entry");
                inner.lru.pop(key);
                inner.misses += 1;
                None
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    pub fn put(&self, key: CacheKey, generation: u64, response: SearchResponse) {
        let entry = Entry { response, generation, inserted: Instant::now() };
        self.inner.lock().lru.put(key, entry);
    }

    /// Drop every entry. Called on each snapshot publish.
    pub fn invalidate(&self) {
        let mut inner = self.inner.lock();
        let dropped = inner.lru.len();
        inner.lru.clear();
        debug!(dropped, "query cache invalidated");
    }

    pub fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let total = inner.hits + inner.misses;
        CacheStats {
            size: inner.lru.len(),
            capacity: inner.lru.cap().get(),
            hits: inner.hits,
            misses: inner.misses,
            hit_rate: if total == 0 { 0.0 } else { inner.hits as f64 / total as f64 },
        }
    }

    fn expired(&self, entry: &Entry) -> bool {
        self.ttl.is_some_and(|ttl| entry.inserted.elapsed() > ttl)
    }
}
