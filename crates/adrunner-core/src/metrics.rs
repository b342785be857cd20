//! Global atomic counters for adrunner observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a waterfall run).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    documents_fetched: AtomicU64,
    chains_resolved: AtomicU64,
    units_started: AtomicU64,
    runs_finished: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            documents_fetched: AtomicU64::new(0),
            chains_resolved: AtomicU64::new(0),
            units_started: AtomicU64::new(0),
            runs_finished: AtomicU64::new(0),
        }
    }

    pub fn inc_documents_fetched(&self) {
        self.documents_fetched.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "documents_fetched", "counter incremented");
    }

    pub fn inc_chains_resolved(&self) {
        self.chains_resolved.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "chains_resolved", "counter incremented");
    }

    pub fn inc_units_started(&self) {
        self.units_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "units_started", "counter incremented");
    }

    pub fn inc_runs_finished(&self) {
        self.runs_finished.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_finished", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            documents_fetched = self.documents_fetched(),
            chains_resolved = self.chains_resolved(),
            units_started = self.units_started(),
            runs_finished = self.runs_finished(),
        );
    }

    pub fn documents_fetched(&self) -> u64 {
        self.documents_fetched.load(Ordering::Relaxed)
    }

    pub fn chains_resolved(&self) -> u64 {
        self.chains_resolved.load(Ordering::Relaxed)
    }

    pub fn units_started(&self) -> u64 {
        self.units_started.load(Ordering::Relaxed)
    }

    pub fn runs_finished(&self) -> u64 {
        self.runs_finished.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_counters_increment() {
        let metrics = Metrics::new();
        metrics.inc_documents_fetched();
        metrics.inc_documents_fetched();
        metrics.inc_units_started();
        assert_eq!(metrics.documents_fetched(), 2);
        assert_eq!(metrics.units_started(), 1);
        assert_eq!(metrics.chains_resolved(), 0);
        metrics.flush();
    }
}
