//! Global atomic counters for LLM Bench.
//!
//! Counters are bumped at the call site and reported together by
//! [`Metrics::flush`] when an experiment reaches a terminal state. They are
//! process-wide totals across every experiment; per-experiment counts are on
//! the `experiment.finished` event.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lock-free counters.
pub struct Metrics {
    runs_executed: AtomicU64,
    runs_failed: AtomicU64,
    chunks_embedded: AtomicU64,
    broadcasts_dropped: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            runs_executed: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            chunks_embedded: AtomicU64::new(0),
            broadcasts_dropped: AtomicU64::new(0),
        }
    }

    /// Count one finished run, successful or not.
    pub fn inc_runs_executed(&self) {
        self.runs_executed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_executed", "counter incremented");
    }

    pub fn inc_runs_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_failed", "counter incremented");
    }

    pub fn add_chunks_embedded(&self, n: u64) {
        self.chunks_embedded.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "chunks_embedded", n, "counter incremented");
    }

    pub fn inc_broadcasts_dropped(&self) {
        self.broadcasts_dropped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "broadcasts_dropped", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event, tagged
    /// `scope = "process"`.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            scope = "process",
            runs_executed = self.runs_executed(),
            runs_failed = self.runs_failed(),
            chunks_embedded = self.chunks_embedded(),
            broadcasts_dropped = self.broadcasts_dropped(),
        );
    }

    pub fn runs_executed(&self) -> u64 {
        self.runs_executed.load(Ordering::Relaxed)
    }

    pub fn runs_failed(&self) -> u64 {
        self.runs_failed.load(Ordering::Relaxed)
    }

    pub fn chunks_embedded(&self) -> u64 {
        self.chunks_embedded.load(Ordering::Relaxed)
    }

    pub fn broadcasts_dropped(&self) -> u64 {
        self.broadcasts_dropped.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.runs_executed.store(0, Ordering::Relaxed);
        self.runs_failed.store(0, Ordering::Relaxed);
        self.chunks_embedded.store(0, Ordering::Relaxed);
        self.broadcasts_dropped.store(0, Ordering::Relaxed);
    }
}
