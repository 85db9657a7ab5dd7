use parking_lot::RwLock;
use std::collections::BTreeMap;

use crate::traits::DocumentStore;
use crate::types::{Chunk, Document, DocumentId};

/// Process-local document store. Documents and chunk lists are kept in
/// id order so `list_chunks` is deterministic across runs.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<BTreeMap<DocumentId, Document>>,
    chunks: RwLock<BTreeMap<DocumentId, Vec<Chunk>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a document and its chunks. Returns whether it existed.
    pub fn remove(&self, document_id: &str) -> bool {
        self.chunks.write().remove(document_id);
        self.documents.write().remove(document_id).is_some()
    }

    pub fn document_count(&self) -> usize {
        self.documents.read().len()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.read().values().map(Vec::len).sum()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn list_chunks(&self) -> anyhow::Result<Vec<Chunk>> {
        Ok(self.chunks.read().values().flat_map(|c| c.iter().cloned()).collect())
    }

    fn get_document(&self, id: &str) -> anyhow::Result<Option<Document>> {
        Ok(self.documents.read().get(id).cloned())
    }

    fn upsert(&self, document: Document) -> anyhow::Result<bool> {
        let mut documents = self.documents.write();
        let changed = documents
            .get(&document.id)
            .map_or(true, |existing| existing.content_hash != document.content_hash);
        documents.insert(document.id.clone(), document);
        Ok(changed)
    }

    fn replace_chunks(&self, document_id: &str, mut chunks: Vec<Chunk>) -> anyhow::Result<()> {
        if !self.documents.read().contains_key(document_id) {
            anyhow::bail!("cannot store chunks for unknown document '{document_id}'");
        }
        chunks.sort_by_key(|c| c.chunk_index);
        let mut all = self.chunks.write();
        if chunks.is_empty() {
            all.remove(document_id);
        } else {
            all.insert(document_id.to_string(), chunks);
        }
        Ok(())
    }

    fn chunks_for(&self, document_id: &str) -> anyhow::Result<Vec<Chunk>> {
        Ok(self.chunks.read().get(document_id).cloned().unwrap_or_default())
    }
}
