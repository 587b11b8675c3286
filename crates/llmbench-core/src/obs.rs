//! Structured lifecycle events for experiments and runs.
//!
//! Every event carries an `event = "..."` field so log pipelines can filter
//! on it regardless of message text. Spans come from [`experiment_span`];
//! attach them to the execution future with `tracing::Instrument`.

use llmbench_state::{ExperimentId, ExperimentStatus, RunStatus};
use tracing::{info, warn, Span};

/// Span tagging everything inside one experiment execution.
pub fn experiment_span(experiment_id: ExperimentId) -> Span {
    tracing::info_span!("llmbench.experiment", experiment_id)
}

/// Emit event: execution began (fresh start or resume).
pub fn emit_experiment_started(experiment_id: ExperimentId, total_runs: usize, skipped: usize) {
    info!(
        event = "experiment.started",
        experiment_id,
        total_runs,
        skipped,
    );
}

/// Emit event: one run reached a terminal status.
pub fn emit_run_finished(
    experiment_id: ExperimentId,
    model: &str,
    iteration: u32,
    status: RunStatus,
    duration_ms: u64,
) {
    info!(
        event = "run.finished",
        experiment_id,
        model = %model,
        iteration,
        status = status.as_str(),
        duration_ms,
    );
}

/// Emit event: the execution loop exited.
///
/// `failed_runs` counts only the runs this execution performed; runs skipped
/// on resume are not included.
pub fn emit_experiment_finished(
    experiment_id: ExperimentId,
    status: ExperimentStatus,
    completed_runs: usize,
    total_runs: usize,
    failed_runs: usize,
) {
    info!(
        event = "experiment.finished",
        experiment_id,
        status = status.as_str(),
        completed_runs,
        total_runs,
        failed_runs,
    );
}

/// Emit event: a document was chunked and embedded.
pub fn emit_document_ingested(document_id: i64, collection: &str, chunks: usize) {
    info!(
        event = "document.ingested",
        document_id,
        collection = %collection,
        chunks,
    );
}

/// Emit event: a progress message could not be delivered (warn level).
pub fn emit_broadcast_failed(experiment_id: ExperimentId, topic: &str, error: &dyn std::fmt::Display) {
    warn!(event = "broadcast.failed", experiment_id, topic = %topic, error = %error);
}

/// Emit event: the terminal status could not be persisted (warn level).
pub fn emit_finalize_error(experiment_id: ExperimentId, error: &dyn std::fmt::Display) {
    warn!(event = "experiment.finalize_error", experiment_id, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_experiment_span_create() {
        let span = experiment_span(42);
        let _entered = span.enter();
    }
}
