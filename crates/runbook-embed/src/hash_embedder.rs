use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use runbook_core::traits::Embedder;

use crate::normalize::l2_normalize;

/// Offline embedder: each lowercased word is hashed into a bucket with a
/// hash-derived sign and weight, then the vector is L2-normalized.
///
/// Texts sharing vocabulary land close together; there is no semantics beyond
/// that. Used for tests, demos and as the default provider when no model
/// service is configured.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
    id: String,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, id: format!("hash:xxh64:d{dim}") }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        if self.dim == 0 {
            return v;
        }
        let words = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase);
        for word in words {
            let mut hasher = XxHash64::with_seed(0);
            word.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let sign = if h & (1 << 63) == 0 { 1.0 } else { -1.0 };
            let weight = 0.5 + ((h >> 32) as u32 as f32) / (u32::MAX as f32);
            v[idx] += sign * weight;
        }
        l2_normalize(&mut v);
        v
    }
}

impl Embedder for HashEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
