//! Structured observability hooks for resolution and playback lifecycle.
//!
//! Events are emitted at `info!` level unless noted. Filter with `RUST_LOG`
//! (e.g. `RUST_LOG=adrunner_core=debug`).

use tracing::{debug, info, warn};

use crate::error::ErrorCode;

/// RAII guard that enters a run-scoped tracing span for a waterfall run.
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the run id.
    pub fn enter(run_id: &str) -> Self {
        Self {
            _span: run_span(run_id).entered(),
        }
    }
}

/// Span used for a waterfall run; usable with `Instrument` on spawned tasks.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("adrunner.run", run_id = %run_id)
}

/// Emit event: one resolution hop finished.
pub fn emit_chain_hop(tag: &str, depth: usize, error_code: Option<ErrorCode>) {
    debug!(
        event = "chain.hop",
        tag = %tag,
        depth = depth,
        error_code = error_code.map(|c| c.as_u16()),
    );
}

/// Emit event: a chain was produced by the resolver.
pub fn emit_chain_resolved(tag: &str, length: usize, error_code: Option<ErrorCode>) {
    info!(
        event = "chain.resolved",
        tag = %tag,
        length = length,
        error_code = error_code.map(|c| c.as_u16()),
    );
}

/// Emit event: a playback unit changed state.
pub fn emit_unit_transition(from: &str, to: &str) {
    debug!(event = "unit.transition", from = %from, to = %to);
}

/// Emit event: waterfall run started.
pub fn emit_run_started(run_id: &str, tag: &str) {
    info!(event = "run.started", run_id = %run_id, tag = %tag);
}

/// Emit event: one waterfall attempt failed (warning level).
pub fn emit_attempt_failed(run_id: &str, attempt: u32, error: &dyn std::fmt::Display) {
    warn!(event = "run.attempt_failed", run_id = %run_id, attempt = attempt, error = %error);
}

/// Emit event: waterfall run finished.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, attempts: u32, started: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        attempts = attempts,
        started = started,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let _span = RunSpan::enter("test-run-id");
    }
}
