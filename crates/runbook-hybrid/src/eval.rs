//! Retrieval quality over a labelled query set.
//!
//! Relevance is binary: a retrieved document id either is one of the
//! expected ids or it is not. Rankings are document ids in result order,
//! already deduplicated.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;
use tracing::info;

use runbook_core::error::{Error, Result};
use runbook_core::types::{DocumentId, SearchRequest};

use crate::engine::Engine;

/// Relevant ids among the first `k`, over how many were retrieved there.
pub fn precision_at_k(ranked: &[DocumentId], relevant: &[DocumentId], k: usize) -> f64 {
    let top = &ranked[..k.min(ranked.len())];
    if top.is_empty() {
        return 0.0;
    }
    let hits = top.iter().filter(|id| relevant.contains(id)).count();
    hits as f64 / top.len() as f64
}

pub fn recall_at_k(ranked: &[DocumentId], relevant: &[DocumentId], k: usize) -> f64 {
    let expected: HashSet<&DocumentId> = relevant.iter().collect();
    if expected.is_empty() {
        return 0.0;
    }
    let found: HashSet<&DocumentId> = ranked.iter().take(k).filter(|id| expected.contains(id)).collect();
    found.len() as f64 / expected.len() as f64
}

/// `1 / rank` of the first relevant id, 0 when none is retrieved.
pub fn reciprocal_rank(ranked: &[DocumentId], relevant: &[DocumentId]) -> f64 {
    ranked
        .iter()
        .position(|id| relevant.contains(id))
        .map_or(0.0, |i| 1.0 / (i + 1) as f64)
}

pub fn ndcg_at_k(ranked: &[DocumentId], relevant: &[DocumentId], k: usize) -> f64 {
    let gain = |i: usize| 1.0 / ((i + 2) as f64).log2();
    let dcg: f64 = ranked
        .iter()
        .take(k)
        .enumerate()
        .filter(|(_, id)| relevant.contains(id))
        .map(|(i, _)| gain(i))
        .sum();
    let ideal: f64 = (0..relevant.len().min(k)).map(gain).sum();
    if ideal == 0.0 {
        0.0
    } else {
        dcg / ideal
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalCase {
    pub query: String,
    pub expected_doc_id: DocumentId,
    #[serde(default)]
    pub difficulty: Option<String>,
}

/// A JSON array of cases.
pub fn parse_cases(json: &str) -> Result<Vec<EvalCase>> {
    serde_json::from_str(json).map_err(|e| Error::Validation(format!("evaluation dataset: {e}")))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEval {
    pub query: String,
    pub expected_doc_id: DocumentId,
    pub difficulty: Option<String>,
    pub retrieved_top_3: Vec<DocumentId>,
    /// 1-based; absent when the expected document was not retrieved.
    pub rank: Option<usize>,
    pub mrr: f64,
    pub ndcg: f64,
    pub recall: f64,
    pub precision: f64,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalSummary {
    pub count: usize,
    pub mrr: f64,
    pub ndcg: f64,
    pub recall: f64,
}

impl EvalSummary {
    fn over<'a>(queries: impl IntoIterator<Item = &'a QueryEval>) -> Self {
        let mut summary = Self::default();
        for q in queries {
            summary.count += 1;
            summary.mrr += q.mrr;
            summary.ndcg += q.ndcg;
            summary.recall += q.recall;
        }
        if summary.count > 0 {
            let n = summary.count as f64;
            summary.mrr /= n;
            summary.ndcg /= n;
            summary.recall /= n;
        }
        summary
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    pub k: usize,
    pub overall: EvalSummary,
    pub by_difficulty: BTreeMap<String, EvalSummary>,
    pub avg_latency_ms: f64,
    pub queries: Vec<QueryEval>,
}

/// Run every case through `engine` with `top_k = k` and score the rankings.
pub async fn evaluate(engine: &Engine, cases: &[EvalCase], k: usize) -> Result<EvalReport> {
    let mut queries = Vec::with_capacity(cases.len());
    for case in cases {
        let start = Instant::now();
        let response = engine.search(SearchRequest::new(case.query.clone()).with_top_k(k)).await?;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let mut seen = HashSet::new();
        let ranked: Vec<DocumentId> = response
            .results
            .into_iter()
            .map(|r| r.document_id)
            .filter(|id| seen.insert(id.clone()))
            .collect();
        let expected = std::slice::from_ref(&case.expected_doc_id);
        let rank = ranked.iter().position(|id| *id == case.expected_doc_id).map(|i| i + 1);

        let eval = QueryEval {
            query: case.query.clone(),
            expected_doc_id: case.expected_doc_id.clone(),
            difficulty: case.difficulty.clone(),
            retrieved_top_3: ranked.iter().take(3).cloned().collect(),
            rank,
            mrr: reciprocal_rank(&ranked, expected),
            ndcg: ndcg_at_k(&ranked, expected, k),
            recall: recall_at_k(&ranked, expected, k),
            precision: precision_at_k(&ranked, expected, k),
            latency_ms,
        };
        info!(query = %eval.query, rank = ?eval.rank, mrr = eval.mrr, latency_ms, "query_evaluated");
        queries.push(eval);
    }

    let mut by_difficulty = BTreeMap::new();
    for difficulty in ["easy", "medium", "hard"] {
        let subset = queries.iter().filter(|q| q.difficulty.as_deref() == Some(difficulty));
        let summary = EvalSummary::over(subset);
        if summary.count > 0 {
            by_difficulty.insert(difficulty.to_string(), summary);
        }
    }
    let avg_latency_ms = if queries.is_empty() {
        0.0
    } else {
        queries.iter().map(|q| q.latency_ms).sum::<f64>() / queries.len() as f64
    };

    Ok(EvalReport { k, overall: EvalSummary::over(&queries), by_difficulty, avg_latency_ms, queries })
}
