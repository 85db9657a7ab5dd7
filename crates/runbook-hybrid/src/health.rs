use serde::{Deserialize, Serialize};

use runbook_core::metrics::MetricsSnapshot;

use crate::cache::CacheStats;
use crate::manager::RebuildReport;
use crate::snapshot::IndexSnapshot;

/// Readiness and counters for an API layer to expose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// At least one snapshot has been published.
    pub index_ready: bool,
    pub generation: u64,
    pub version: String,
    pub lexical_chunks: usize,
    pub vector_chunks: usize,
    pub embedder_id: Option<String>,
    pub last_rebuild: Option<RebuildReport>,
    pub cache: CacheStats,
    pub metrics: MetricsSnapshot,
}

impl HealthReport {
    pub fn collect(
        snapshot: &IndexSnapshot,
        last_rebuild: Option<RebuildReport>,
        cache: CacheStats,
        metrics: MetricsSnapshot,
    ) -> Self {
        Self {
            index_ready: snapshot.is_ready(),
            generation: snapshot.generation,
            version: snapshot.version.clone(),
            lexical_chunks: snapshot.lexical_len(),
            vector_chunks: snapshot.vector_len(),
            embedder_id: snapshot.embedder_id.clone(),
            last_rebuild,
            cache,
            metrics,
        }
    }

    /// Ready, and the most recent build did not fail.
    pub fn is_healthy(&self) -> bool {
        self.index_ready && self.last_rebuild.as_ref().map_or(true, RebuildReport::succeeded)
    }
}
