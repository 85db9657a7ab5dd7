//! runbook-embed
//!
//! Embedding providers and the async client the indexer and search path use
//! to call them.
use std::sync::Arc;

use runbook_core::config::EmbeddingSettings;
use runbook_core::error::{Error, Result};
use runbook_core::traits::Embedder;

pub mod client;
pub mod hash_embedder;
pub mod normalize;

pub use client::{EmbeddingClient, RetryPolicy};
pub use hash_embedder::HashEmbedder;
pub use normalize::{cosine, dot, l2_normalize};

/// Provider named by `embedding.provider`.
pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    match settings.provider.as_str() {
        "hash" | "fake" => {
            tracing::info!(dim = settings.dim, "using hash embedder");
            Ok(Arc::new(HashEmbedder::new(settings.dim)))
        }
        other => Err(Error::InvalidConfig(format!("unknown embedding provider '{other}'"))),
    }
}
