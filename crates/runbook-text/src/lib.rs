//! runbook-text
//!
//! Lexical side of retrieval: a tantivy tokenizer chain shared by indexing and
//! querying, and an in-memory BM25 index with incremental add/remove.
pub mod analyzer;
pub mod bm25;

pub use analyzer::Analyzer;
pub use bm25::{Bm25Index, Bm25Params};
