//! Reciprocal Rank Fusion of the lexical and vector candidate lists.
//!
//! ```text
//! RRF(d) = Σ 1 / (k + rank_r(d))
//! ```
//!
//! `rank_r` is the 1-indexed position of `d` in retriever `r`'s list; a
//! retriever that did not return `d` contributes nothing. Only ranks matter,
//! so BM25 scores and cosine similarities never need to be put on one scale.

use std::collections::HashMap;

use runbook_core::types::{ChunkId, SearchHit};

#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub chunk_id: ChunkId,
    pub score: f32,
    pub bm25_rank: Option<usize>,
    pub bm25_score: Option<f32>,
    pub vector_rank: Option<usize>,
    pub vector_score: Option<f32>,
}

impl FusedHit {
    fn new(chunk_id: ChunkId) -> Self {
        Self { chunk_id, score: 0.0, bm25_rank: None, bm25_score: None, vector_rank: None, vector_score: None }
    }

    /// The better (smaller) of the two ranks.
    pub fn best_rank(&self) -> usize {
        match (self.bm25_rank, self.vector_rank) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => usize::MAX,
        }
    }
}

/// Both inputs must already be ranked best first. The output is ordered by
/// fused score, then best individual rank, then chunk id, so identical inputs
/// always give an identical list.
pub fn fuse(lexical: &[SearchHit], vector: &[SearchHit], k: f32) -> Vec<FusedHit> {
    let mut by_id: HashMap<&str, FusedHit> = HashMap::with_capacity(lexical.len() + vector.len());

    for (rank, hit) in lexical.iter().enumerate() {
        let rank_1_indexed = rank + 1;
        let entry = by_id.entry(hit.id.as_str()).or_insert_with(|| FusedHit::new(hit.id.clone()));
        entry.score += 1.0 / (k + rank_1_indexed as f32);
        entry.bm25_rank = Some(rank_1_indexed);
        entry.bm25_score = Some(hit.score);
    }
    for (rank, hit) in vector.iter().enumerate() {
        let rank_1_indexed = rank + 1;
        let entry = by_id.entry(hit.id.as_str()).or_insert_with(|| FusedHit::new(hit.id.clone()));
        entry.score += 1.0 / (k + rank_1_indexed as f32);
        entry.vector_rank = Some(rank_1_indexed);
        entry.vector_score = Some(hit.score);
    }

    let mut fused: Vec<FusedHit> = by_id.into_values().collect();
    fused.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.best_rank().cmp(&b.best_rank()))
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    fused
}
