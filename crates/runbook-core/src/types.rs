//! Domain types shared by the chunker, both indexes and the search service.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::hash::content_hash;

pub type ChunkId = String;
pub type DocumentId = String;

/// Where a document came from: product documentation or an issue thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Docs,
    Issues,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Docs => "docs",
            SourceType::Issues => "issues",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docs" => Ok(SourceType::Docs),
            "issues" => Ok(SourceType::Issues),
            other => Err(Error::Validation(format!("unknown source type '{other}'"))),
        }
    }
}

/// A source document as handed to ingestion.
///
/// `content_hash` is computed from the normalized `raw_content` at construction
/// and never recomputed; a document with the same hash is treated as unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub source_type: SourceType,
    pub project: String,
    pub url: String,
    pub title: String,
    pub raw_content: String,
    pub content_hash: String,
}

impl Document {
    pub fn new(
        id: impl Into<DocumentId>,
        source_type: SourceType,
        project: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        raw_content: impl Into<String>,
    ) -> Self {
        let raw_content = raw_content.into();
        let content_hash = content_hash(&raw_content);
        Self {
            id: id.into(),
            source_type,
            project: project.into(),
            url: url.into(),
            title: title.into(),
            raw_content,
            content_hash,
        }
    }
}

/// A heading-scoped slice of a document; the unit both indexes store.
///
/// - `chunk_id`: `"{document_id}#{hash prefix}"`, unique system-wide
/// - `chunk_index`: position within the parent document, used for stable ordering
/// - `heading_path`: ancestry of section titles, outermost first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub chunk_index: usize,
    pub heading_path: Vec<String>,
    pub text: String,
    pub token_count: usize,
    pub content_hash: String,
}

/// Indicates which retriever produced a hit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Lexical,
    Vector,
}

/// The minimal surface returned by both retrievers.
///
/// `id` matches `Chunk::chunk_id`. `score` is retriever-specific but
/// higher is always better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: ChunkId,
    pub score: f32,
    pub source: SourceKind,
}

/// Score descending, then chunk id ascending.
pub fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
}

/// Filters as received from the API layer, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects: Option<Vec<String>>,
}

impl SearchFilters {
    pub fn source_types<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_types = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn projects<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projects = Some(values.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub filters: SearchFilters,
    /// Falls back to `retrieval.default_top_k` when absent.
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default = "default_include_scores")]
    pub include_scores: bool,
}

fn default_include_scores() -> bool {
    true
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), filters: SearchFilters::default(), top_k: None, include_scores: true }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn include_scores(mut self, include: bool) -> Self {
        self.include_scores = include;
        self
    }
}

/// Per-retriever ranks and scores behind a fused result. Absent retrievers are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub bm25_score: Option<f32>,
    pub bm25_rank: Option<usize>,
    pub vector_score: Option<f32>,
    pub vector_rank: Option<usize>,
    pub final_score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub title: String,
    pub url: String,
    pub source_type: SourceType,
    pub project: String,
    pub heading_path: Vec<String>,
    /// HTML-escaped text with matched terms wrapped in `<mark>`.
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<ScoreBreakdown>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    Hybrid,
    Bm25Only,
    VectorOnly,
    /// Neither retriever could answer.
    None,
}

impl RetrievalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMode::Hybrid => "hybrid",
            RetrievalMode::Bm25Only => "bm25_only",
            RetrievalMode::VectorOnly => "vector_only",
            RetrievalMode::None => "none",
        }
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<ScoredChunk>,
    /// Fused candidates that survived filtering, before truncation to `top_k`.
    pub total_results: usize,
    pub latency_ms: f64,
    pub retrieval_mode: RetrievalMode,
    pub cache_hit: bool,
    /// False until the first index snapshot has been published.
    pub index_ready: bool,
}
