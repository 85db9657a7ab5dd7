use crate::types::{Chunk, Document, SearchHit, SourceKind};

/// External "text → vector" capability.
///
/// Implementations do not retry; callers wrap them with a retry policy.
/// All vectors for one `embedder_id` share the same dimensionality.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g., `hash:xxh64:d384`).
    fn embedder_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

/// Uniform ranked retrieval over one index.
///
/// Both the lexical and the vector index implement this; the search service
/// queries them the same way and only differs in the query representation.
pub trait Retriever: Send + Sync {
    type Query: ?Sized;

    fn kind(&self) -> SourceKind;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Up to `pool_size` hits among chunks accepted by `allow`, best first,
    /// ties broken by ascending chunk id. Rejected chunks never take a slot.
    fn search_where(&self, query: &Self::Query, pool_size: usize, allow: &dyn Fn(&str) -> bool) -> Vec<SearchHit>;

    fn search(&self, query: &Self::Query, pool_size: usize) -> Vec<SearchHit> {
        self.search_where(query, pool_size, &|_| true)
    }
}

/// Canonical document and chunk storage.
pub trait DocumentStore: Send + Sync {
    /// All chunks, grouped by document and ordered by `chunk_index`.
    fn list_chunks(&self) -> anyhow::Result<Vec<Chunk>>;
    fn get_document(&self, id: &str) -> anyhow::Result<Option<Document>>;
    /// Insert or replace a document. Returns whether its content hash changed.
    fn upsert(&self, document: Document) -> anyhow::Result<bool>;
    fn replace_chunks(&self, document_id: &str, chunks: Vec<Chunk>) -> anyhow::Result<()>;
    fn chunks_for(&self, document_id: &str) -> anyhow::Result<Vec<Chunk>>;
}
