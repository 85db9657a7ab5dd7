use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use runbook_core::config::EmbeddingSettings;
use runbook_core::error::{Error, Result};
use runbook_core::traits::Embedder;

use crate::normalize::l2_normalize;

/// Bounded retries with exponential backoff: `backoff`, `2 * backoff`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { retries: 3, backoff: Duration::from_millis(100) }
    }
}

impl RetryPolicy {
    pub fn delay(&self, retry: u32) -> Duration {
        self.backoff.saturating_mul(1u32 << retry.min(16))
    }
}

/// Async front for a blocking [`Embedder`].
///
/// Calls run on tokio's blocking pool and are capped at `max_concurrency`
/// in flight, so a slow provider never occupies the async workers serving
/// searches. Every returned vector is checked against the embedder's
/// dimension and L2-normalized.
#[derive(Clone)]
pub struct EmbeddingClient {
    embedder: Arc<dyn Embedder>,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
    batch_size: usize,
    retry: RetryPolicy,
}

impl EmbeddingClient {
    pub fn new(embedder: Arc<dyn Embedder>, settings: &EmbeddingSettings) -> Self {
        let retry = RetryPolicy {
            retries: settings.retry_attempts,
            backoff: Duration::from_millis(settings.retry_backoff_ms),
        };
        Self::with_policy(embedder, settings.max_concurrency, settings.batch_size, retry)
    }

    pub fn with_policy(embedder: Arc<dyn Embedder>, max_concurrency: usize, batch_size: usize, retry: RetryPolicy) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            embedder,
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            batch_size: batch_size.max(1),
            retry,
        }
    }

    pub fn embedder_id(&self) -> &str {
        self.embedder.embedder_id()
    }

    pub fn dim(&self) -> usize {
        self.embedder.dim()
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(vec![text.to_string()]).await?;
        vectors.pop().ok_or_else(|| Error::Embedding("embedder returned no vector".to_string()))
    }

    /// One provider call (plus retries) for the whole slice.
    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let texts = Arc::new(texts);
        let mut retry = 0;
        loop {
            match self.attempt(texts.clone()).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) if retry < self.retry.retries => {
                    let delay = self.retry.delay(retry);
                    warn!(attempt = retry + 1, delay_ms = delay.as_millis() as u64, error = %e, "embedding attempt failed");
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) => {
                    return Err(Error::Embedding(format!("{} after {} attempt(s)", e, retry + 1)));
                }
            }
        }
    }

    /// Split into `batch_size` batches and run up to `max_concurrency` of them
    /// at once. Output order matches input order; any failed batch fails the call.
    pub async fn embed_all(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let total = texts.len();
        let batches: Vec<Vec<String>> = texts.chunks(self.batch_size).map(<[String]>::to_vec).collect();
        debug!(texts = total, batches = batches.len(), "embedding batches");
        let results: Vec<Vec<Vec<f32>>> = stream::iter(batches)
            .map(|batch| self.embed_batch(batch))
            .buffered(self.max_concurrency)
            .try_collect()
            .await?;
        Ok(results.into_iter().flatten().collect())
    }

    async fn attempt(&self, texts: Arc<Vec<String>>) -> anyhow::Result<Vec<Vec<f32>>> {
        let _permit = self.permits.acquire().await?;
        let embedder = self.embedder.clone();
        let expected = texts.len();
        let dim = embedder.dim();
        let mut vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts)).await??;
        if vectors.len() != expected {
            anyhow::bail!("embedder returned {} vectors for {} texts", vectors.len(), expected);
        }
        for v in &mut vectors {
            if v.len() != dim {
                anyhow::bail!("embedder returned dimension {} (expected {})", v.len(), dim);
            }
            if v.iter().any(|x| !x.is_finite()) {
                anyhow::bail!("embedder returned a non-finite component");
            }
            l2_normalize(v);
        }
        Ok(vectors)
    }
}
