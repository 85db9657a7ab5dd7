//! In-process counters and a fixed-bucket latency histogram for the search path.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Upper bounds in milliseconds; a final implicit bucket catches everything above.
pub const LATENCY_BUCKETS_MS: [f64; 8] = [10.0, 50.0, 100.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0];

#[derive(Debug, Default)]
pub struct SearchMetrics {
    requests_total: AtomicU64,
    requests_rejected: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    degraded_total: AtomicU64,
    rebuilds_succeeded: AtomicU64,
    rebuilds_failed: AtomicU64,
    latency: LatencyHistogram,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub requests_rejected: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub degraded_total: u64,
    pub rebuilds_succeeded: u64,
    pub rebuilds_failed: u64,
    /// Cumulative counts per bucket, `+Inf` last.
    pub latency_buckets: Vec<u64>,
    pub latency_p50_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
}

impl SearchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, latency: Duration) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.latency.observe(latency);
    }

    pub fn record_rejected(&self) {
        self.requests_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache(&self, hit: bool) {
        let counter = if hit { &self.cache_hits } else { &self.cache_misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_degraded(&self) {
        self.degraded_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rebuild(&self, succeeded: bool) {
        let counter = if succeeded { &self.rebuilds_succeeded } else { &self.rebuilds_failed };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_rejected: self.requests_rejected.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            degraded_total: self.degraded_total.load(Ordering::Relaxed),
            rebuilds_succeeded: self.rebuilds_succeeded.load(Ordering::Relaxed),
            rebuilds_failed: self.rebuilds_failed.load(Ordering::Relaxed),
            latency_buckets: self.latency.cumulative(),
            latency_p50_ms: self.latency.quantile(0.50),
            latency_p95_ms: self.latency.quantile(0.95),
            latency_p99_ms: self.latency.quantile(0.99),
        }
    }
}

#[derive(Debug, Default)]
struct LatencyHistogram {
    counts: [AtomicU64; LATENCY_BUCKETS_MS.len() + 1],
    max_micros: AtomicU64,
}

impl LatencyHistogram {
    fn observe(&self, latency: Duration) {
        let ms = latency.as_secs_f64() * 1000.0;
        let idx = LATENCY_BUCKETS_MS.iter().position(|&b| ms <= b).unwrap_or(LATENCY_BUCKETS_MS.len());
        self.counts[idx].fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.max_micros.fetch_max(micros, Ordering::Relaxed);
    }

    fn cumulative(&self) -> Vec<u64> {
        let mut total = 0;
        self.counts
            .iter()
            .map(|c| {
                total += c.load(Ordering::Relaxed);
                total
            })
            .collect()
    }

    /// Upper bound of the bucket holding the `q` quantile. Observations past
    /// the last bound report the largest latency seen.
    fn quantile(&self, q: f64) -> f64 {
        let cumulative = self.cumulative();
        let total = cumulative.last().copied().unwrap_or(0);
        if total == 0 {
            return 0.0;
        }
        let target = (q * total as f64).ceil().max(1.0) as u64;
        match cumulative.iter().position(|&c| c >= target) {
            Some(idx) if idx < LATENCY_BUCKETS_MS.len() => LATENCY_BUCKETS_MS[idx],
            _ => self.max_micros.load(Ordering::Relaxed) as f64 / 1000.0,
        }
    }
}
