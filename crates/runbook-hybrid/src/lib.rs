//! runbook-hybrid
//!
//! Hybrid retrieval over published index snapshots: reciprocal rank fusion,
//! snippets, the generation-stamped query cache, the index manager that
//! builds and swaps snapshots, the search service that reads them, and
//! ranking metrics for labelled query sets.
pub mod cache;
pub mod engine;
pub mod eval;
pub mod fusion;
pub mod health;
pub mod manager;
pub mod service;
pub mod snapshot;
pub mod snippet;

pub use cache::{CacheKey, CacheStats, NormalizedFilters, QueryCache};
pub use engine::{Engine, IngestReport};
pub use eval::{evaluate, parse_cases, EvalCase, EvalReport, EvalSummary, QueryEval};
pub use fusion::{fuse, FusedHit};
pub use health::HealthReport;
pub use manager::{IndexManager, ManagerConfig, RebuildReport, RebuildStatus, UpdateMode, UpdateOutcome};
pub use service::{HybridSearchService, ServiceConfig};
pub use snapshot::{ChunkRecord, IndexSnapshot, SnapshotHandle};
pub use snippet::SnippetBuilder;
