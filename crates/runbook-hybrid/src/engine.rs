use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use runbook_core::chunker::Chunker;
use runbook_core::config::Settings;
use runbook_core::error::{Error, Result};
use runbook_core::ingest::{IngestStats, IngestionPipeline};
use runbook_core::metrics::SearchMetrics;
use runbook_core::source::DirectorySource;
use runbook_core::store::InMemoryDocumentStore;
use runbook_core::traits::{DocumentStore, Embedder};
use runbook_core::types::{Document, DocumentId, SearchRequest, SearchResponse};
use runbook_embed::{get_default_embedder, EmbeddingClient};
use runbook_vector::EmbeddingCache;

use crate::cache::QueryCache;
use crate::health::HealthReport;
use crate::manager::{IndexManager, ManagerConfig, UpdateOutcome};
use crate::service::{HybridSearchService, ServiceConfig};
use crate::snapshot::SnapshotHandle;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub stats: IngestStats,
    /// Present when the ingest published a new snapshot.
    pub index: Option<UpdateOutcome>,
}

/// Owns one retrieval stack: store, snapshot handle, caches, metrics, the
/// index manager and the search service.
///
/// Starts with an empty, not-ready snapshot. Ingest or [`Engine::rebuild`]
/// publishes the first generation; [`Engine::shutdown`] returns to empty.
pub struct Engine {
    settings: Settings,
    store: Arc<InMemoryDocumentStore>,
    pipeline: IngestionPipeline,
    handle: Arc<SnapshotHandle>,
    cache: Arc<QueryCache>,
    metrics: Arc<SearchMetrics>,
    manager: Arc<IndexManager>,
    service: HybridSearchService,
}

impl Engine {
    /// Uses the provider named by `embedding.provider`.
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let embedder = get_default_embedder(&settings.embedding)?;
        Self::build(settings, Some(embedder))
    }

    pub fn with_embedder(settings: Settings, embedder: Arc<dyn Embedder>) -> Result<Self> {
        settings.validate()?;
        Self::build(settings, Some(embedder))
    }

    /// Lexical retrieval only; every search reports `bm25_only`.
    pub fn lexical_only(settings: Settings) -> Result<Self> {
        settings.validate()?;
        Self::build(settings, None)
    }

    fn build(settings: Settings, embedder: Option<Arc<dyn Embedder>>) -> Result<Self> {
        let store = Arc::new(InMemoryDocumentStore::new());
        let dyn_store: Arc<dyn DocumentStore> = store.clone();
        let pipeline = IngestionPipeline::new(dyn_store.clone(), Chunker::new(settings.chunking.clone()));
        let handle = Arc::new(SnapshotHandle::new());
        let cache = Arc::new(QueryCache::from_settings(&settings.cache));
        let metrics = Arc::new(SearchMetrics::new());
        let client = embedder.map(|e| EmbeddingClient::new(e, &settings.embedding));

        let manager = Arc::new(IndexManager::new(
            dyn_store,
            handle.clone(),
            cache.clone(),
            Arc::new(EmbeddingCache::new()),
            client.clone(),
            ManagerConfig::from_settings(&settings),
            metrics.clone(),
        ));
        let service = HybridSearchService::new(
            handle.clone(),
            cache.clone(),
            client,
            metrics.clone(),
            ServiceConfig::from_settings(&settings.retrieval),
        );
        Ok(Self { settings, store, pipeline, handle, cache, metrics, manager, service })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<InMemoryDocumentStore> {
        &self.store
    }

    pub fn manager(&self) -> &Arc<IndexManager> {
        &self.manager
    }

    pub fn query_cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Store the documents, then publish: a full build the first time,
    /// afterwards an incremental update for whatever changed, including
    /// documents an earlier failed update left out of the live indexes.
    pub async fn ingest(&self, documents: Vec<Document>, force: bool) -> Result<IngestReport> {
        let stats = self.pipeline.ingest(documents, force);
        let index = if !self.handle.load().is_ready() {
            Some(self.manager.rebuild().await?)
        } else if stats.has_changes() || self.manager.has_pending_changes() {
            Some(self.manager.incremental_update(&stats.changed).await?)
        } else {
            None
        };
        Ok(IngestReport { stats, index })
    }

    pub async fn ingest_source(&self, source: &DirectorySource, force: bool) -> Result<IngestReport> {
        let documents = source.load()?;
        info!(source = %source.source_id(), documents = documents.len(), "loaded source");
        self.ingest(documents, force).await
    }

    /// Drop documents from the store and the live indexes.
    pub async fn remove_documents(&self, ids: &[DocumentId]) -> Result<Option<UpdateOutcome>> {
        let removed: Vec<DocumentId> = ids.iter().filter(|id| self.store.remove(id)).cloned().collect();
        if removed.is_empty() {
            return Err(Error::NotFound(format!("none of {} document(s) exist", ids.len())));
        }
        if !self.handle.load().is_ready() {
            return Ok(None);
        }
        self.manager.incremental_update(&removed).await.map(Some)
    }

    pub async fn rebuild(&self) -> Result<UpdateOutcome> {
        self.manager.rebuild().await
    }

    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        self.service.search(request).await
    }

    pub fn health(&self) -> HealthReport {
        HealthReport::collect(
            &self.handle.load(),
            self.manager.last_rebuild(),
            self.cache.stats(),
            self.metrics.snapshot(),
        )
    }

    /// Tear the published snapshot down and drop cached responses. Searches
    /// afterwards report `index_ready = false` until the next publish.
    pub fn shutdown(&self) {
        self.handle.clear();
        self.cache.invalidate();
        info!("engine shut down");
    }
}
