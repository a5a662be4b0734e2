//! Process-local counters for the cache and refresh paths

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Metrics handle shared by the stats components
#[derive(Debug, Default)]
pub struct Metrics {
    stats_cache_hits: AtomicU64,
    stats_cache_misses: AtomicU64,
    provider_failures: AtomicU64,
    snapshots_written: AtomicU64,
    refresh_runs: AtomicU64,
    refresh_errors: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats_cache_hit(&self) {
        self.stats_cache_hits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "stats_cache_hits", "Metric incremented");
    }

    pub fn stats_cache_miss(&self) {
        self.stats_cache_misses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "stats_cache_misses", "Metric incremented");
    }

    pub fn provider_failure(&self) {
        self.provider_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "provider_failures", "Metric incremented");
    }

    pub fn snapshot_written(&self) {
        self.snapshots_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn refresh_completed(&self, errors: u64) {
        self.refresh_runs.fetch_add(1, Ordering::Relaxed);
        self.refresh_errors.fetch_add(errors, Ordering::Relaxed);
        tracing::debug!(counter = "refresh_runs", errors, "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            stats_cache_hits: self.stats_cache_hits.load(Ordering::Relaxed),
            stats_cache_misses: self.stats_cache_misses.load(Ordering::Relaxed),
            provider_failures: self.provider_failures.load(Ordering::Relaxed),
            snapshots_written: self.snapshots_written.load(Ordering::Relaxed),
            refresh_runs: self.refresh_runs.load(Ordering::Relaxed),
            refresh_errors: self.refresh_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub stats_cache_hits: u64,
    pub stats_cache_misses: u64,
    pub provider_failures: u64,
    pub snapshots_written: u64,
    pub refresh_runs: u64,
    pub refresh_errors: u64,
}
