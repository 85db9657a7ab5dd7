use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::chunker::Chunker;
use crate::traits::DocumentStore;
use crate::types::{Document, DocumentId};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestStats {
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub chunks_written: usize,
    pub errors: usize,
    /// Documents whose chunks were rewritten; feed these to an incremental index update.
    pub changed: Vec<DocumentId>,
    pub duration_ms: f64,
}

impl IngestStats {
    pub fn has_changes(&self) -> bool {
        !self.changed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Created,
    Updated,
    Skipped,
}

/// Stores documents and their chunks, skipping content that has not changed.
pub struct IngestionPipeline {
    store: Arc<dyn DocumentStore>,
    chunker: Chunker,
}

impl IngestionPipeline {
    pub fn new(store: Arc<dyn DocumentStore>, chunker: Chunker) -> Self {
        Self { store, chunker }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// A failing document is counted in `errors` and does not stop the run.
    /// `force` re-chunks documents whose content hash is unchanged.
    pub fn ingest<I>(&self, documents: I, force: bool) -> IngestStats
    where
        I: IntoIterator<Item = Document>,
    {
        let start = Instant::now();
        let mut stats = IngestStats::default();
        for document in documents {
            let doc_id = document.id.clone();
            match self.process(document, force) {
                Ok((outcome, chunks)) => {
                    stats.processed += 1;
                    match outcome {
                        Outcome::Created => stats.created += 1,
                        Outcome::Updated => stats.updated += 1,
                        Outcome::Skipped => stats.skipped += 1,
                    }
                    if outcome != Outcome::Skipped {
                        stats.chunks_written += chunks;
                        stats.changed.push(doc_id.clone());
                    }
                    debug!(doc_id = %doc_id, outcome = ?outcome, chunks, "processed_document");
                }
                Err(e) => {
                    stats.errors += 1;
                    error!(doc_id = %doc_id, error = %e, "document_processing_error");
                }
            }
        }
        stats.duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        info!(
            processed = stats.processed,
            created = stats.created,
            updated = stats.updated,
            skipped = stats.skipped,
            chunks = stats.chunks_written,
            errors = stats.errors,
            "ingestion_complete"
        );
        stats
    }

    fn process(&self, document: Document, force: bool) -> anyhow::Result<(Outcome, usize)> {
        let existing = self.store.get_document(&document.id)?;
        if let Some(existing) = &existing {
            if existing.content_hash == document.content_hash && !force {
                return Ok((Outcome::Skipped, 0));
            }
        }
        let outcome = if existing.is_some() { Outcome::Updated } else { Outcome::Created };
        let chunks = self.chunker.chunk(&document);
        let count = chunks.len();
        let doc_id = document.id.clone();
        self.store.upsert(document)?;
        self.store.replace_chunks(&doc_id, chunks)?;
        Ok((outcome, count))
    }
}
