use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::hash::content_hash;
use crate::markdown::{split_sections, Section};
use crate::types::{Chunk, Document};

/// Words per token used by the token estimate (`tokens ≈ words / 0.75`).
const WORDS_PER_TOKEN: f32 = 0.75;
/// Hex characters of the content hash kept in a chunk id.
const CHUNK_ID_HASH_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Sections below this size are merged into the following section.
    pub min_tokens: usize,
    /// Sections above this size are split into overlapping windows.
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { min_tokens: 100, max_tokens: 400, overlap_tokens: 50 }
    }
}

impl ChunkingConfig {
    /// Identifies the chunking policy. Chunks produced under a different
    /// fingerprint cannot be patched incrementally into an index.
    pub fn fingerprint(&self) -> String {
        format!("heading-v1:{}:{}:{}", self.min_tokens, self.max_tokens, self.overlap_tokens)
    }
}

/// Heading-aware splitter turning one document into ordered, deduplicated chunks.
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Chunks in document order. Identical chunk text within one document is
    /// kept once; ids are derived from the content hash, so re-chunking an
    /// unchanged section yields the same id.
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.raw_content.trim().is_empty() {
            return Vec::new();
        }
        let sections = self.merge_small_sections(split_sections(&document.raw_content));
        let mut chunks = Vec::new();
        let mut seen = HashSet::new();
        for section in sections {
            let pieces = if count_tokens(&section.text) <= self.config.max_tokens {
                vec![section.text]
            } else {
                self.split_with_overlap(&section.text)
            };
            for text in pieces {
                let hash = content_hash(&text);
                if !seen.insert(hash.clone()) {
                    continue;
                }
                chunks.push(Chunk {
                    chunk_id: format!("{}#{}", document.id, &hash[..CHUNK_ID_HASH_LEN]),
                    document_id: document.id.clone(),
                    chunk_index: chunks.len(),
                    heading_path: section.heading_path.clone(),
                    token_count: count_tokens(&text),
                    text,
                    content_hash: hash,
                });
            }
        }
        chunks
    }

    fn merge_small_sections(&self, sections: Vec<Section>) -> Vec<Section> {
        let mut merged = Vec::new();
        let mut iter = sections.into_iter();
        let Some(mut current) = iter.next() else { return merged };
        for next in iter {
            let current_tokens = count_tokens(&current.text);
            let next_tokens = count_tokens(&next.text);
            if current_tokens < self.config.min_tokens && current_tokens + next_tokens <= self.config.max_tokens {
                let heading_path = if next.heading_path.is_empty() { current.heading_path } else { next.heading_path };
                current = Section { heading_path, text: format!("{}\n\n{}", current.text, next.text) };
            } else {
                merged.push(std::mem::replace(&mut current, next));
            }
        }
        merged.push(current);
        merged
    }

    fn split_with_overlap(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let window = words_for_tokens(self.config.max_tokens).max(1);
        let overlap = words_for_tokens(self.config.overlap_tokens).min(window - 1);
        let mut pieces = Vec::new();
        let mut start = 0;
        while start < words.len() {
            let mut end = (start + window).min(words.len());
            if end < words.len() {
                // Prefer ending on a sentence boundary in the second half of the window.
                let half = start + (end - start) / 2;
                if let Some(pos) = (half..end).rev().find(|&i| ends_sentence(words[i])) {
                    end = pos + 1;
                }
            }
            pieces.push(words[start..end].join(" "));
            if end >= words.len() {
                break;
            }
            start = end.saturating_sub(overlap).max(start + 1);
        }
        pieces
    }
}

/// Estimated token count: whitespace words divided by 0.75, rounded up.
pub fn count_tokens(text: &str) -> usize {
    let words = text.split_whitespace().count();
    if words == 0 {
        return 0;
    }
    (words as f32 / WORDS_PER_TOKEN).ceil() as usize
}

fn words_for_tokens(tokens: usize) -> usize {
    (tokens as f32 * WORDS_PER_TOKEN) as usize
}

fn ends_sentence(word: &str) -> bool {
    word.ends_with('.') || word.ends_with('!') || word.ends_with('?')
}
