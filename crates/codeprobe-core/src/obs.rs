//! Structured observability hooks for harness run lifecycle events.
//!
//! Events are emitted at `info!` level through the global subscriber
//! configured by [`crate::telemetry::init_tracing`].

use tracing::info;

/// RAII guard that enters a run-scoped tracing span for the duration of a
/// harness run, so per-sample events carry the run id automatically.
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the run id.
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("codeprobe.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: harness run started over N samples.
pub fn emit_run_started(run_id: &str, sample_count: usize) {
    info!(event = "run.started", run_id = %run_id, samples = sample_count);
}

/// Emit event: one sample pipeline finished.
pub fn emit_sample_finished(
    run_id: &str,
    sample: &str,
    goal: &str,
    conforming: bool,
    duration_ms: u64,
) {
    info!(
        event = "sample.finished",
        run_id = %run_id,
        sample = %sample,
        goal = %goal,
        conforming = conforming,
        duration_ms = duration_ms,
    );
}

/// Emit event: harness run finished with conformance totals.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, conforming: usize, total: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        conforming = conforming,
        total = total,
    );
}
