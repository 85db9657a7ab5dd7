use std::collections::BTreeMap;
use tracing::warn;

use runbook_core::error::{Error, Result};
use runbook_core::traits::Retriever;
use runbook_core::types::{sort_hits, ChunkId, SearchHit, SourceKind};
use runbook_embed::{dot, l2_normalize};

/// Exact nearest-neighbour index over unit vectors.
///
/// Vectors are normalized on insert, so the inner product is the cosine
/// similarity. Search is a full scan; equal similarities are ordered by
/// chunk id.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dim: usize,
    vectors: BTreeMap<ChunkId, Vec<f32>>,
}

impl VectorIndex {
    pub fn new(dim: usize) -> Self {
        Self { dim, vectors: BTreeMap::new() }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn index(&mut self, chunk_id: impl Into<ChunkId>, mut embedding: Vec<f32>) -> Result<()> {
        let chunk_id = chunk_id.into();
        if embedding.len() != self.dim {
            return Err(Error::Operation(format!(
                "embedding for {chunk_id} has dimension {} (index expects {})",
                embedding.len(),
                self.dim
            )));
        }
        l2_normalize(&mut embedding);
        self.vectors.insert(chunk_id, embedding);
        Ok(())
    }

    pub fn remove(&mut self, chunk_ids: &[ChunkId]) {
        for id in chunk_ids {
            self.vectors.remove(id);
        }
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        self.vectors.contains_key(chunk_id)
    }

    pub fn get(&self, chunk_id: &str) -> Option<&[f32]> {
        self.vectors.get(chunk_id).map(Vec::as_slice)
    }
}

impl Retriever for VectorIndex {
    type Query = [f32];

    fn kind(&self) -> SourceKind {
        SourceKind::Vector
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn search_where(&self, query: &[f32], pool_size: usize, allow: &dyn Fn(&str) -> bool) -> Vec<SearchHit> {
        if pool_size == 0 || self.vectors.is_empty() {
            return Vec::new();
        }
        if query.len() != self.dim {
            warn!(query_dim = query.len(), index_dim = self.dim, "query embedding dimension mismatch");
            return Vec::new();
        }
        let mut q = query.to_vec();
        l2_normalize(&mut q);
        let mut hits: Vec<SearchHit> = self
            .vectors
            .iter()
            .filter(|(id, _)| allow(id.as_str()))
            .map(|(id, v)| SearchHit { id: id.clone(), score: dot(&q, v), source: SourceKind::Vector })
            .collect();
        sort_hits(&mut hits);
        hits.truncate(pool_size);
        hits
    }
}
