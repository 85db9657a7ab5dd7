use std::collections::{BTreeMap, HashMap};

use runbook_core::types::{sort_hits, Chunk, ChunkId, SearchHit, SourceKind};
use runbook_core::traits::Retriever;

use crate::analyzer::Analyzer;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// In-memory inverted index scored with Okapi BM25.
///
/// Postings are kept per term as `chunk_id -> term frequency`. Each chunk also
/// remembers its distinct terms so removal only touches the postings it
/// contributed to.
#[derive(Debug, Clone, Default)]
pub struct Bm25Index {
    params: Bm25Params,
    analyzer: Analyzer,
    postings: HashMap<String, BTreeMap<ChunkId, u32>>,
    chunk_terms: HashMap<ChunkId, Vec<String>>,
    chunk_lengths: HashMap<ChunkId, usize>,
    total_length: usize,
}

impl Bm25Index {
    pub fn new(params: Bm25Params) -> Self {
        Self { params, ..Self::default() }
    }

    pub fn params(&self) -> Bm25Params {
        self.params
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// Add chunks; a chunk id that is already indexed is replaced.
    pub fn index(&mut self, chunks: &[Chunk]) {
        for chunk in chunks {
            self.remove_one(&chunk.chunk_id);
            let tokens = self.analyzer.tokenize(&chunk.text);
            let mut tf: HashMap<String, u32> = HashMap::new();
            for token in &tokens {
                *tf.entry(token.clone()).or_default() += 1;
            }
            let mut terms = Vec::with_capacity(tf.len());
            for (term, count) in tf {
                self.postings.entry(term.clone()).or_default().insert(chunk.chunk_id.clone(), count);
                terms.push(term);
            }
            self.chunk_terms.insert(chunk.chunk_id.clone(), terms);
            self.chunk_lengths.insert(chunk.chunk_id.clone(), tokens.len());
            self.total_length += tokens.len();
        }
    }

    /// Drop chunks and their postings. Unknown ids are ignored.
    pub fn remove(&mut self, chunk_ids: &[ChunkId]) {
        for id in chunk_ids {
            self.remove_one(id);
        }
    }

    fn remove_one(&mut self, chunk_id: &str) {
        let Some(terms) = self.chunk_terms.remove(chunk_id) else { return };
        for term in terms {
            if let Some(list) = self.postings.get_mut(&term) {
                list.remove(chunk_id);
                if list.is_empty() {
                    self.postings.remove(&term);
                }
            }
        }
        if let Some(len) = self.chunk_lengths.remove(chunk_id) {
            self.total_length -= len;
        }
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        self.chunk_lengths.contains_key(chunk_id)
    }

    pub fn document_frequency(&self, term: &str) -> usize {
        self.postings.get(term).map_or(0, BTreeMap::len)
    }

    fn avg_length(&self) -> f32 {
        if self.chunk_lengths.is_empty() {
            0.0
        } else {
            self.total_length as f32 / self.chunk_lengths.len() as f32
        }
    }

    fn idf(&self, df: usize) -> f32 {
        let n = self.chunk_lengths.len() as f32;
        let df = df as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// Tokenize free text with the index analyzer and search it.
    pub fn search_text(&self, query: &str, pool_size: usize) -> Vec<SearchHit> {
        let terms = self.analyzer.tokenize(query);
        self.search(&terms, pool_size)
    }

    fn score(&self, terms: &[String], allow: &dyn Fn(&str) -> bool) -> Vec<SearchHit> {
        let Bm25Params { k1, b } = self.params;
        let avg_len = self.avg_length().max(f32::EPSILON);
        let mut unique: Vec<&String> = terms.iter().collect();
        unique.sort();
        unique.dedup();

        let mut scores: HashMap<&str, f32> = HashMap::new();
        for term in unique {
            let Some(list) = self.postings.get(term.as_str()) else { continue };
            let idf = self.idf(list.len());
            for (chunk_id, &tf) in list {
                if !allow(chunk_id.as_str()) {
                    continue;
                }
                let tf = tf as f32;
                let len = self.chunk_lengths.get(chunk_id).copied().unwrap_or(0) as f32;
                let norm = tf + k1 * (1.0 - b + b * len / avg_len);
                *scores.entry(chunk_id.as_str()).or_default() += idf * (tf * (k1 + 1.0)) / norm;
            }
        }
        scores
            .into_iter()
            .map(|(id, score)| SearchHit { id: id.to_string(), score, source: SourceKind::Lexical })
            .collect()
    }
}

impl Retriever for Bm25Index {
    type Query = [String];

    fn kind(&self) -> SourceKind {
        SourceKind::Lexical
    }

    fn len(&self) -> usize {
        self.chunk_lengths.len()
    }

    fn search_where(&self, terms: &[String], pool_size: usize, allow: &dyn Fn(&str) -> bool) -> Vec<SearchHit> {
        if terms.is_empty() || pool_size == 0 || self.chunk_lengths.is_empty() {
            return Vec::new();
        }
        let mut hits = self.score(terms, allow);
        sort_hits(&mut hits);
        hits.truncate(pool_size);
        hits
    }
}
