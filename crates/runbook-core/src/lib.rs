//! Shared foundation for runbook retrieval.
//!
//! Domain types, the error type, Figment-backed configuration, capability
//! traits, markdown chunking, the in-memory document store, ingestion and
//! search metrics. Everything index-specific lives in the sibling crates.

pub mod chunker;
pub mod config;
pub mod error;
pub mod hash;
pub mod ingest;
pub mod issue;
pub mod markdown;
pub mod metrics;
pub mod source;
pub mod store;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
