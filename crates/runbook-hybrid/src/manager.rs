use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument};

use runbook_core::config::Settings;
use runbook_core::error::{Error, Result};
use runbook_core::metrics::SearchMetrics;
use runbook_core::traits::DocumentStore;
use runbook_core::types::{Chunk, ChunkId, Document, DocumentId};
use runbook_embed::EmbeddingClient;
use runbook_text::{Bm25Index, Bm25Params};
use runbook_vector::{CacheEntry, EmbeddingCache, VectorIndex};

use crate::cache::QueryCache;
use crate::snapshot::{ChunkRecord, IndexSnapshot, SnapshotHandle};

#[derive(Debug, Clone, PartialEq)]
pub struct ManagerConfig {
    pub bm25: Bm25Params,
    pub build_vectors: bool,
    pub incremental_max_documents: usize,
    pub chunking_fingerprint: String,
}

impl ManagerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            bm25: Bm25Params { k1: settings.retrieval.bm25_k1, b: settings.retrieval.bm25_b },
            build_vectors: settings.index.build_vectors,
            incremental_max_documents: settings.index.incremental_max_documents,
            chunking_fingerprint: settings.chunking.fingerprint(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    FullRebuild,
    Incremental,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    pub mode: UpdateMode,
    /// Generation now being served.
    pub generation: u64,
    pub version: String,
    pub chunks_indexed: usize,
    pub chunks_removed: usize,
    /// Chunks that needed a provider call.
    pub embedded: usize,
    /// Chunks served from the embedding cache.
    pub reused_embeddings: usize,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RebuildStatus {
    Succeeded { generation: u64 },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebuildReport {
    pub mode: UpdateMode,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: f64,
    #[serde(flatten)]
    pub status: RebuildStatus,
}

impl RebuildReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, RebuildStatus::Succeeded { .. })
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct EmbedStats {
    embedded: usize,
    reused: usize,
}

/// Builds index snapshots from the document store and publishes them.
///
/// At most one build runs at a time. A build that fails leaves the
/// previously published snapshot serving and is recorded in
/// [`IndexManager::last_rebuild`]. Documents a failed incremental update
/// did not reach are kept and merged into the next update; a failed full
/// rebuild makes the next update a full rebuild.
pub struct IndexManager {
    store: Arc<dyn DocumentStore>,
    handle: Arc<SnapshotHandle>,
    query_cache: Arc<QueryCache>,
    embeddings: Arc<EmbeddingCache>,
    client: Option<EmbeddingClient>,
    config: ManagerConfig,
    metrics: Arc<SearchMetrics>,
    build_lock: tokio::sync::Mutex<()>,
    last: RwLock<Option<RebuildReport>>,
    pending: Mutex<Vec<DocumentId>>,
    needs_full_rebuild: AtomicBool,
}

impl IndexManager {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        handle: Arc<SnapshotHandle>,
        query_cache: Arc<QueryCache>,
        embeddings: Arc<EmbeddingCache>,
        client: Option<EmbeddingClient>,
        config: ManagerConfig,
        metrics: Arc<SearchMetrics>,
    ) -> Self {
        Self {
            store,
            handle,
            query_cache,
            embeddings,
            client,
            config,
            metrics,
            build_lock: tokio::sync::Mutex::new(()),
            last: RwLock::new(None),
            pending: Mutex::new(Vec::new()),
            needs_full_rebuild: AtomicBool::new(false),
        }
    }

    pub fn last_rebuild(&self) -> Option<RebuildReport> {
        self.last.read().clone()
    }

    pub fn embedding_cache(&self) -> &Arc<EmbeddingCache> {
        &self.embeddings
    }

    /// True when an earlier failure left store changes out of the live indexes.
    pub fn has_pending_changes(&self) -> bool {
        self.needs_full_rebuild.load(Ordering::SeqCst) || !self.pending.lock().is_empty()
    }

    /// Rebuild everything from the store and publish it as a new generation.
    #[instrument(skip_all)]
    pub async fn rebuild(&self) -> Result<UpdateOutcome> {
        let _guard = self.build_lock.lock().await;
        let start = Instant::now();
        let result = self.full_rebuild().await;
        self.finish(UpdateMode::FullRebuild, start, result)
    }

    /// Run [`IndexManager::rebuild`] on the runtime without waiting for it.
    pub fn spawn_rebuild(self: &Arc<Self>) -> tokio::task::JoinHandle<Result<UpdateOutcome>> {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.rebuild().await })
    }

    /// Patch the live indexes for the given documents, or fall back to a
    /// full rebuild when patching is not safe.
    #[instrument(skip_all, fields(documents = changed.len()))]
    pub async fn incremental_update(&self, changed: &[DocumentId]) -> Result<UpdateOutcome> {
        let _guard = self.build_lock.lock().await;
        let start = Instant::now();
        let current = self.handle.load();
        let changed = self.take_pending(changed);

        if let Some(reason) = self.full_rebuild_reason(&current, changed.len()) {
            info!(reason, "incremental update falling back to full rebuild");
            let result = self.full_rebuild().await;
            return self.finish(UpdateMode::FullRebuild, start, result);
        }
        if changed.is_empty() {
            return Ok(UpdateOutcome {
                mode: UpdateMode::Incremental,
                generation: current.generation,
                version: current.version.clone(),
                chunks_indexed: 0,
                chunks_removed: 0,
                embedded: 0,
                reused_embeddings: 0,
                duration_ms: 0.0,
            });
        }
        let result = self.apply_changes(&current, &changed).await;
        if result.is_err() {
            let mut pending = self.pending.lock();
            pending.extend(changed);
            debug!(pending = pending.len(), "documents kept for the next update");
        }
        self.finish(UpdateMode::Incremental, start, result)
    }

    /// `changed` plus whatever an earlier failed update left behind, deduplicated.
    fn take_pending(&self, changed: &[DocumentId]) -> Vec<DocumentId> {
        let mut merged = std::mem::take(&mut *self.pending.lock());
        merged.extend(changed.iter().cloned());
        let mut seen = HashSet::new();
        merged.retain(|id| seen.insert(id.clone()));
        merged
    }

    fn vector_client(&self) -> Option<&EmbeddingClient> {
        self.client.as_ref().filter(|_| self.config.build_vectors)
    }

    fn full_rebuild_reason(&self, current: &IndexSnapshot, changed: usize) -> Option<&'static str> {
        if !current.is_ready() {
            return Some("no published snapshot");
        }
        if self.needs_full_rebuild.load(Ordering::SeqCst) {
            return Some("previous full rebuild failed");
        }
        if current.chunking_fingerprint != self.config.chunking_fingerprint {
            return Some("chunking policy changed");
        }
        let embedder_id = self.vector_client().map(EmbeddingClient::embedder_id);
        if current.embedder_id.as_deref() != embedder_id {
            return Some("embedder changed");
        }
        if changed > self.config.incremental_max_documents {
            return Some("change set too large");
        }
        None
    }

    async fn full_rebuild(&self) -> anyhow::Result<UpdateOutcome> {
        let result = self.build_full().await;
        match &result {
            Ok(_) => {
                self.needs_full_rebuild.store(false, Ordering::SeqCst);
                self.pending.lock().clear();
            }
            Err(_) => self.needs_full_rebuild.store(true, Ordering::SeqCst),
        }
        result
    }

    async fn build_full(&self) -> anyhow::Result<UpdateOutcome> {
        let chunks = self.store.list_chunks()?;
        let records = self.records_for(chunks)?;
        let all: Vec<Chunk> = records.iter().map(|r| r.chunk.clone()).collect();
        debug!(chunks = all.len(), "building snapshot");

        let mut lexical = Bm25Index::new(self.config.bm25);
        lexical.index(&all);

        let client = self.vector_client();
        let (vector, stats) = match client {
            Some(client) => {
                let mut index = VectorIndex::new(client.dim());
                let stats = self.embed_into(client, &all, &mut index).await?;
                (Some(index), stats)
            }
            None => (None, EmbedStats::default()),
        };

        let mut catalog = HashMap::with_capacity(records.len());
        let mut doc_chunks: HashMap<DocumentId, Vec<ChunkId>> = HashMap::new();
        for record in records {
            doc_chunks.entry(record.chunk.document_id.clone()).or_default().push(record.chunk.chunk_id.clone());
            catalog.insert(record.chunk.chunk_id.clone(), record);
        }
        let live: HashSet<String> = catalog.values().map(|r| r.chunk.content_hash.clone()).collect();

        let snapshot = IndexSnapshot {
            generation: 0,
            version: String::new(),
            built_at: Utc::now(),
            lexical,
            vector,
            catalog,
            doc_chunks,
            embedder_id: client.map(|c| c.embedder_id().to_string()),
            chunking_fingerprint: self.config.chunking_fingerprint.clone(),
        };
        let indexed = snapshot.catalog.len();
        let published = self.publish(snapshot);
        let pruned = self.embeddings.retain(&live);
        debug!(pruned, "embedding cache pruned");

        Ok(UpdateOutcome {
            mode: UpdateMode::FullRebuild,
            generation: published.generation,
            version: published.version.clone(),
            chunks_indexed: indexed,
            chunks_removed: 0,
            embedded: stats.embedded,
            reused_embeddings: stats.reused,
            duration_ms: 0.0,
        })
    }

    async fn apply_changes(&self, current: &IndexSnapshot, changed: &[DocumentId]) -> anyhow::Result<UpdateOutcome> {
        let mut next = current.clone();
        let mut seen = HashSet::new();
        let mut added: Vec<Chunk> = Vec::new();
        let mut removed = 0;

        for doc_id in changed.iter().filter(|id| seen.insert(id.as_str())) {
            let old = next.doc_chunks.remove(doc_id).unwrap_or_default();
            let document = self.store.get_document(doc_id)?;
            let fresh_chunks = match document {
                Some(_) => self.store.chunks_for(doc_id)?,
                None => Vec::new(),
            };

            let keep: HashSet<&str> = fresh_chunks.iter().map(|c| c.chunk_id.as_str()).collect();
            let stale: Vec<ChunkId> = old.iter().filter(|id| !keep.contains(id.as_str())).cloned().collect();
            next.lexical.remove(&stale);
            if let Some(vector) = next.vector.as_mut() {
                vector.remove(&stale);
            }
            for id in &stale {
                next.catalog.remove(id);
            }
            removed += stale.len();

            let Some(document) = document else { continue };
            let previous: HashSet<&ChunkId> = old.iter().collect();
            let mut ids = Vec::with_capacity(fresh_chunks.len());
            for chunk in fresh_chunks {
                ids.push(chunk.chunk_id.clone());
                if !previous.contains(&chunk.chunk_id) {
                    added.push(chunk.clone());
                }
                // Unchanged chunks still pick up document metadata edits.
                next.catalog.insert(chunk.chunk_id.clone(), ChunkRecord::new(chunk, &document));
            }
            if !ids.is_empty() {
                next.doc_chunks.insert(doc_id.clone(), ids);
            }
        }

        next.lexical.index(&added);
        let mut stats = EmbedStats::default();
        if let (Some(client), Some(vector)) = (self.vector_client(), next.vector.as_mut()) {
            stats = self.embed_into(client, &added, vector).await?;
        }
        next.built_at = Utc::now();
        let published = self.publish(next);

        Ok(UpdateOutcome {
            mode: UpdateMode::Incremental,
            generation: published.generation,
            version: published.version.clone(),
            chunks_indexed: added.len(),
            chunks_removed: removed,
            embedded: stats.embedded,
            reused_embeddings: stats.reused,
            duration_ms: 0.0,
        })
    }

    /// Join chunks with their documents. Chunks whose document is gone are skipped.
    fn records_for(&self, chunks: Vec<Chunk>) -> anyhow::Result<Vec<ChunkRecord>> {
        let mut documents: HashMap<DocumentId, Option<Document>> = HashMap::new();
        let mut records = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            if !documents.contains_key(&chunk.document_id) {
                let doc = self.store.get_document(&chunk.document_id)?;
                documents.insert(chunk.document_id.clone(), doc);
            }
            match documents.get(&chunk.document_id).and_then(Option::as_ref) {
                Some(document) => records.push(ChunkRecord::new(chunk, document)),
                None => debug!(chunk_id = %chunk.chunk_id, "skipping chunk without document"),
            }
        }
        Ok(records)
    }

    /// Vectors for `chunks`, from the embedding cache where possible, inserted into `index`.
    async fn embed_into(&self, client: &EmbeddingClient, chunks: &[Chunk], index: &mut VectorIndex) -> anyhow::Result<EmbedStats> {
        let hashes: Vec<String> = chunks.iter().map(|c| c.content_hash.clone()).collect();
        let mut vectors = self.embeddings.get_many(client.embedder_id(), &hashes);

        let mut pending = HashSet::new();
        let missing: Vec<&Chunk> = chunks
            .iter()
            .filter(|c| !vectors.contains_key(&c.content_hash) && pending.insert(c.content_hash.as_str()))
            .collect();
        let stats = EmbedStats { embedded: missing.len(), reused: chunks.len() - missing.len() };

        if !missing.is_empty() {
            let texts = missing.iter().map(|c| c.text.clone()).collect();
            let fresh = client.embed_all(texts).await?;
            let entries: Vec<CacheEntry> = missing
                .iter()
                .zip(fresh)
                .map(|(c, v)| CacheEntry::new(c.content_hash.clone(), client.embedder_id(), v))
                .collect();
            for entry in &entries {
                vectors.insert(entry.content_hash.clone(), entry.vector.clone());
            }
            self.embeddings.put_many(entries);
        }

        for chunk in chunks {
            let vector = vectors
                .get(&chunk.content_hash)
                .ok_or_else(|| anyhow::anyhow!("no embedding for chunk {}", chunk.chunk_id))?;
            index.index(chunk.chunk_id.clone(), vector.clone())?;
        }
        Ok(stats)
    }

    fn publish(&self, snapshot: IndexSnapshot) -> Arc<IndexSnapshot> {
        let published = self.handle.publish(snapshot);
        self.query_cache.invalidate();
        published
    }

    fn finish(&self, mode: UpdateMode, start: Instant, result: anyhow::Result<UpdateOutcome>) -> Result<UpdateOutcome> {
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        match result {
            Ok(mut outcome) => {
                outcome.duration_ms = duration_ms;
                self.metrics.record_rebuild(true);
                *self.last.write() = Some(RebuildReport {
                    mode: outcome.mode,
                    finished_at: Utc::now(),
                    duration_ms,
                    status: RebuildStatus::Succeeded { generation: outcome.generation },
                });
                info!(
                    mode = ?outcome.mode,
                    generation = outcome.generation,
                    chunks = outcome.chunks_indexed,
                    removed = outcome.chunks_removed,
                    embedded = outcome.embedded,
                    reused = outcome.reused_embeddings,
                    duration_ms,
                    "rebuild_complete"
                );
                Ok(outcome)
            }
            Err(e) => {
                let message = format!("{e:#}");
                self.metrics.record_rebuild(false);
                *self.last.write() = Some(RebuildReport {
                    mode,
                    finished_at: Utc::now(),
                    duration_ms,
                    status: RebuildStatus::Failed { error: message.clone() },
                });
                error!(mode = ?mode, error = %message, "rebuild_failed");
                Err(Error::Rebuild(message))
            }
        }
    }
}
