use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use runbook_core::config::RetrievalSettings;
use runbook_core::error::{Error, Result};
use runbook_core::metrics::SearchMetrics;
use runbook_core::traits::Retriever;
use runbook_core::types::{
    RetrievalMode, ScoreBreakdown, ScoredChunk, SearchHit, SearchRequest, SearchResponse, SourceType,
};
use runbook_embed::EmbeddingClient;

use crate::cache::{CacheKey, NormalizedFilters, QueryCache};
use crate::fusion::{fuse, FusedHit};
use crate::snapshot::{IndexSnapshot, SnapshotHandle};
use crate::snippet::SnippetBuilder;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub rrf_k: f32,
    pub pool_multiplier: usize,
    pub default_top_k: usize,
    pub max_top_k: usize,
    pub max_query_chars: usize,
    pub lexical_budget: Duration,
    pub vector_budget: Duration,
    pub snippets: SnippetBuilder,
}

impl ServiceConfig {
    pub fn from_settings(settings: &RetrievalSettings) -> Self {
        Self {
            rrf_k: settings.rrf_k,
            pool_multiplier: settings.pool_multiplier.max(1),
            default_top_k: settings.default_top_k,
            max_top_k: settings.max_top_k,
            max_query_chars: settings.max_query_chars,
            lexical_budget: Duration::from_millis(settings.lexical_budget_ms),
            vector_budget: Duration::from_millis(settings.vector_budget_ms),
            snippets: SnippetBuilder::new(settings.snippet_window_words, settings.snippet_max_chars),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_settings(&RetrievalSettings::default())
    }
}

/// What one retriever produced for one request.
enum Leg {
    Answered(Vec<SearchHit>),
    /// Nothing to ask: index absent or empty, or no embedder.
    Unavailable,
    /// Timed out or errored. Such responses are not cached.
    Failed,
}

impl Leg {
    fn hits(&self) -> Option<&[SearchHit]> {
        match self {
            Leg::Answered(hits) => Some(hits),
            _ => None,
        }
    }
}

/// Hybrid retrieval over the currently published snapshot.
///
/// Both retrievers run concurrently, each under its own time budget, against
/// one `Arc<IndexSnapshot>` taken at the start of the request. A retriever
/// that is missing, slow or failing is dropped from fusion and the response
/// says so through `retrieval_mode`.
pub struct HybridSearchService {
    handle: Arc<SnapshotHandle>,
    cache: Arc<QueryCache>,
    client: Option<EmbeddingClient>,
    metrics: Arc<SearchMetrics>,
    config: ServiceConfig,
}

impl HybridSearchService {
    pub fn new(
        handle: Arc<SnapshotHandle>,
        cache: Arc<QueryCache>,
        client: Option<EmbeddingClient>,
        metrics: Arc<SearchMetrics>,
        config: ServiceConfig,
    ) -> Self {
        Self { handle, cache, client, metrics, config }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    #[instrument(skip_all, fields(query_chars = request.query.len()))]
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let start = Instant::now();
        let (top_k, filters) = match self.validate(&request) {
            Ok(valid) => valid,
            Err(e) => {
                self.metrics.record_rejected();
                warn!(error = %e, "search_rejected");
                return Err(e);
            }
        };
        let query = request.query.trim();
        let snapshot = self.handle.load();

        if !snapshot.is_ready() {
            self.metrics.record_request(start.elapsed());
            debug!("index not ready");
            return Ok(SearchResponse {
                query: request.query,
                results: Vec::new(),
                total_results: 0,
                latency_ms: elapsed_ms(start),
                retrieval_mode: RetrievalMode::None,
                cache_hit: false,
                index_ready: false,
            });
        }

        let key = CacheKey::new(query, filters.clone(), top_k);
        if let Some(mut cached) = self.cache.get(&key, snapshot.generation) {
            self.metrics.record_cache(true);
            cached.query = request.query;
            cached.cache_hit = true;
            cached.latency_ms = elapsed_ms(start);
            if !request.include_scores {
                strip_scores(&mut cached);
            }
            self.metrics.record_request(start.elapsed());
            debug!(generation = snapshot.generation, "query cache hit");
            return Ok(cached);
        }
        self.metrics.record_cache(false);

        let pool = top_k.saturating_mul(self.config.pool_multiplier).max(top_k);
        let terms = snapshot.lexical.analyzer().tokenize(query);
        let (lexical, vector) = tokio::join!(
            self.lexical_leg(&snapshot, &terms, &filters, pool),
            self.vector_leg(&snapshot, query, &filters, pool),
        );

        let mode = match (lexical.hits(), vector.hits()) {
            (Some(_), Some(_)) => RetrievalMode::Hybrid,
            (Some(_), None) => RetrievalMode::Bm25Only,
            (None, Some(_)) => RetrievalMode::VectorOnly,
            (None, None) => RetrievalMode::None,
        };
        if mode != RetrievalMode::Hybrid {
            self.metrics.record_degraded();
        }
        let transient = matches!(lexical, Leg::Failed) || matches!(vector, Leg::Failed);

        let mut fused = fuse(
            lexical.hits().unwrap_or_default(),
            vector.hits().unwrap_or_default(),
            self.config.rrf_k,
        );
        let total_results = fused.len();
        fused.truncate(top_k);

        let term_set: HashSet<String> = terms.into_iter().collect();
        let results = fused.iter().filter_map(|hit| self.present(&snapshot, hit, &term_set)).collect();

        let mut response = SearchResponse {
            query: request.query,
            results,
            total_results,
            latency_ms: elapsed_ms(start),
            retrieval_mode: mode,
            cache_hit: false,
            index_ready: true,
        };
        // A publish during this search has already cleared the cache.
        if !transient && self.handle.load().generation == snapshot.generation {
            self.cache.put(key, snapshot.generation, response.clone());
        }
        if !request.include_scores {
            strip_scores(&mut response);
        }

        self.metrics.record_request(start.elapsed());
        info!(
            generation = snapshot.generation,
            mode = %mode,
            results = response.results.len(),
            total = total_results,
            latency_ms = response.latency_ms,
            "search_complete"
        );
        Ok(response)
    }

    /// Returns the effective `top_k` and canonical filters.
    fn validate(&self, request: &SearchRequest) -> Result<(usize, NormalizedFilters)> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(Error::Validation("query must not be empty".to_string()));
        }
        let chars = query.chars().count();
        if chars > self.config.max_query_chars {
            return Err(Error::Validation(format!(
                "query is {chars} characters (max {})",
                self.config.max_query_chars
            )));
        }

        let top_k = request.top_k.unwrap_or(self.config.default_top_k);
        if top_k == 0 || top_k > self.config.max_top_k {
            return Err(Error::Validation(format!("top_k must be within [1, {}]", self.config.max_top_k)));
        }

        let filters = &request.filters;
        let values = filters.source_types.iter().chain(filters.projects.iter()).flatten();
        if values.into_iter().any(|v| v.trim().is_empty()) {
            return Err(Error::Validation("filter values must not be empty".to_string()));
        }
        for value in filters.source_types.iter().flatten() {
            value.parse::<SourceType>()?;
        }
        Ok((top_k, NormalizedFilters::from_filters(filters)))
    }

    async fn lexical_leg(
        &self,
        snapshot: &Arc<IndexSnapshot>,
        terms: &[String],
        filters: &NormalizedFilters,
        pool: usize,
    ) -> Leg {
        if snapshot.lexical.is_empty() {
            return Leg::Unavailable;
        }
        let snapshot = Arc::clone(snapshot);
        let terms = terms.to_vec();
        let filters = filters.clone();
        let task = tokio::task::spawn_blocking(move || {
            let allow = |id: &str| allowed(&snapshot, &filters, id);
            snapshot.lexical.search_where(terms.as_slice(), pool, &allow)
        });
        match tokio::time::timeout(self.config.lexical_budget, task).await {
            Ok(Ok(hits)) => Leg::Answered(hits),
            Ok(Err(e)) => {
                warn!(retriever = "lexical", error = %e, "retriever_degraded");
                Leg::Failed
            }
            Err(_) => {
                warn!(retriever = "lexical", budget_ms = self.config.lexical_budget.as_millis() as u64, "retriever_degraded");
                Leg::Failed
            }
        }
    }

    async fn vector_leg(
        &self,
        snapshot: &Arc<IndexSnapshot>,
        query: &str,
        filters: &NormalizedFilters,
        pool: usize,
    ) -> Leg {
        let Some(client) = &self.client else { return Leg::Unavailable };
        let indexed = snapshot.vector.as_ref().is_some_and(|v| !v.is_empty());
        if !indexed || snapshot.embedder_id.as_deref() != Some(client.embedder_id()) {
            return Leg::Unavailable;
        }

        let run = async {
            let embedding = client.embed_query(query).await?;
            let snapshot = Arc::clone(snapshot);
            let filters = filters.clone();
            tokio::task::spawn_blocking(move || {
                let allow = |id: &str| allowed(&snapshot, &filters, id);
                snapshot
                    .vector
                    .as_ref()
                    .map(|index| index.search_where(embedding.as_slice(), pool, &allow))
                    .unwrap_or_default()
            })
            .await
            .map_err(|e| Error::Operation(e.to_string()))
        };
        match tokio::time::timeout(self.config.vector_budget, run).await {
            Ok(Ok(hits)) => Leg::Answered(hits),
            Ok(Err(e)) => {
                warn!(retriever = "vector", error = %e, "retriever_degraded");
                Leg::Failed
            }
            Err(_) => {
                warn!(retriever = "vector", budget_ms = self.config.vector_budget.as_millis() as u64, "retriever_degraded");
                Leg::Failed
            }
        }
    }

    fn present(&self, snapshot: &IndexSnapshot, hit: &FusedHit, terms: &HashSet<String>) -> Option<ScoredChunk> {
        let record = snapshot.catalog.get(&hit.chunk_id)?;
        let none = HashSet::new();
        let highlight = if hit.bm25_rank.is_some() { terms } else { &none };
        Some(ScoredChunk {
            chunk_id: hit.chunk_id.clone(),
            document_id: record.chunk.document_id.clone(),
            title: record.title.clone(),
            url: record.url.clone(),
            source_type: record.source_type,
            project: record.project.clone(),
            heading_path: record.chunk.heading_path.clone(),
            snippet: self.config.snippets.build(&record.chunk.text, highlight),
            scores: Some(ScoreBreakdown {
                bm25_score: hit.bm25_score,
                bm25_rank: hit.bm25_rank,
                vector_score: hit.vector_score,
                vector_rank: hit.vector_rank,
                final_score: hit.score,
            }),
        })
    }
}

fn allowed(snapshot: &IndexSnapshot, filters: &NormalizedFilters, chunk_id: &str) -> bool {
    snapshot.catalog.get(chunk_id).is_some_and(|record| record.matches(filters))
}

fn strip_scores(response: &mut SearchResponse) {
    for result in &mut response.results {
        result.scores = None;
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
