use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use runbook_core::traits::Retriever;
use runbook_core::types::{Chunk, ChunkId, Document, DocumentId, SourceType};
use runbook_text::Bm25Index;
use runbook_vector::VectorIndex;

use crate::cache::NormalizedFilters;

/// A chunk plus the document fields search results and filters need.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub chunk: Chunk,
    pub title: String,
    pub url: String,
    pub source_type: SourceType,
    pub project: String,
}

impl ChunkRecord {
    pub fn new(chunk: Chunk, document: &Document) -> Self {
        Self {
            chunk,
            title: document.title.clone(),
            url: document.url.clone(),
            source_type: document.source_type,
            project: document.project.clone(),
        }
    }

    pub fn matches(&self, filters: &NormalizedFilters) -> bool {
        (filters.source_types.is_empty() || filters.source_types.iter().any(|s| s == self.source_type.as_str()))
            && (filters.projects.is_empty() || filters.projects.iter().any(|p| p == &self.project))
    }
}

/// One immutable generation of everything search reads.
///
/// The lexical index, the vector index and the chunk catalog always come
/// from the same build; readers hold an `Arc` to the whole thing.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    pub generation: u64,
    pub version: String,
    pub built_at: DateTime<Utc>,
    pub lexical: Bm25Index,
    /// `None` when vectors were not built for this generation.
    pub vector: Option<VectorIndex>,
    pub catalog: HashMap<ChunkId, ChunkRecord>,
    pub doc_chunks: HashMap<DocumentId, Vec<ChunkId>>,
    pub embedder_id: Option<String>,
    pub chunking_fingerprint: String,
}

impl IndexSnapshot {
    pub fn empty() -> Self {
        Self {
            generation: 0,
            version: String::new(),
            built_at: DateTime::<Utc>::default(),
            lexical: Bm25Index::default(),
            vector: None,
            catalog: HashMap::new(),
            doc_chunks: HashMap::new(),
            embedder_id: None,
            chunking_fingerprint: String::new(),
        }
    }

    /// True once a build has been published.
    pub fn is_ready(&self) -> bool {
        self.generation > 0
    }

    pub fn lexical_len(&self) -> usize {
        self.lexical.len()
    }

    pub fn vector_len(&self) -> usize {
        self.vector.as_ref().map_or(0, |v| v.len())
    }
}

/// The published snapshot. Readers clone the `Arc` and drop the lock
/// immediately; publishing replaces the pointer in one write.
#[derive(Debug)]
pub struct SnapshotHandle {
    current: RwLock<Arc<IndexSnapshot>>,
    next_generation: AtomicU64,
}

impl Default for SnapshotHandle {
    fn default() -> Self {
        Self { current: RwLock::new(Arc::new(IndexSnapshot::empty())), next_generation: AtomicU64::new(1) }
    }
}

impl SnapshotHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> Arc<IndexSnapshot> {
        self.current.read().clone()
    }

    /// Stamp the next generation and swap it in. Generations never repeat,
    /// even across [`SnapshotHandle::clear`].
    pub fn publish(&self, mut snapshot: IndexSnapshot) -> Arc<IndexSnapshot> {
        snapshot.generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        snapshot.version = format!("{}-g{}", snapshot.built_at.format("v%Y%m%d_%H%M%S"), snapshot.generation);
        let snapshot = Arc::new(snapshot);
        *self.current.write() = snapshot.clone();
        snapshot
    }

    /// Back to the empty, not-ready state.
    pub fn clear(&self) {
        *self.current.write() = Arc::new(IndexSnapshot::empty());
    }
}
