//! runbook-vector
//!
//! In-memory cosine index and the embedding cache keyed by
//! `(content_hash, embedder_id)`. The cache is consulted prior to calling a
//! provider and written through on misses.
pub mod cache;
pub mod index;

pub use cache::{CacheEntry, EmbeddingCache};
pub use index::VectorIndex;
