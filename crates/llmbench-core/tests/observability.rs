//! Observability tests for experiment lifecycle tracing.
//!
//! Each lifecycle emitter writes an event tagged with `event = "..."`;
//! these tests check the tags and key fields reach the log.

use std::sync::Arc;

use async_trait::async_trait;
use llmbench_core::*;
use llmbench_gateway::{GenerationBackend, GenerationRequest, GenerationResponse};
use llmbench_state::fakes::{MemoryCatalog, MemoryExperimentStore};
use llmbench_state::{ExperimentConfig, ExperimentStatus, ExperimentStore, NewExperiment, RunStatus};
use tracing::Instrument;
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_emit_experiment_started_logs_counts() {
    emit_experiment_started(11, 8, 3);
    assert!(logs_contain("experiment.started"));
    assert!(logs_contain("total_runs=8"));
    assert!(logs_contain("skipped=3"));
}

#[traced_test]
#[test]
fn test_emit_run_finished_logs_status() {
    emit_run_finished(11, "llama3.2:1b", 2, RunStatus::Failed, 1500);
    assert!(logs_contain("run.finished"));
    assert!(logs_contain("status=\"FAILED\""));
    assert!(logs_contain("duration_ms=1500"));
}

#[traced_test]
#[test]
fn test_emit_experiment_finished_logs_progress() {
    emit_experiment_finished(11, ExperimentStatus::Paused, 2, 4, 1);
    assert!(logs_contain("experiment.finished"));
    assert!(logs_contain("completed_runs=2"));
    assert!(logs_contain("failed_runs=1"));
}

#[traced_test]
#[test]
fn test_emit_document_ingested() {
    emit_document_ingested(5, "doc-5-nomic-embed-text", 12);
    assert!(logs_contain("document.ingested"));
    assert!(logs_contain("chunks=12"));
}

#[traced_test]
#[test]
fn test_emit_warnings() {
    emit_broadcast_failed(11, "/experiments/11/progress", &"socket closed");
    emit_finalize_error(11, &"database connection failed");
    assert!(logs_contain("WARN"));
    assert!(logs_contain("broadcast.failed"));
    assert!(logs_contain("experiment.finalize_error"));
}

#[traced_test]
#[tokio::test]
async fn test_experiment_span_wraps_future() {
    async { tracing::info!("inside") }
        .instrument(experiment_span(77))
        .await;
    assert!(logs_contain("llmbench.experiment"));
    assert!(logs_contain("experiment_id=77"));
}

struct QuietBackend;

#[async_trait]
impl GenerationBackend for QuietBackend {
    async fn generate(
        &self,
        _request: GenerationRequest,
    ) -> llmbench_gateway::Result<GenerationResponse> {
        Ok(GenerationResponse {
            text: "ok".into(),
            duration_ms: 1,
            tokens_per_second: 1.0,
            time_to_first_token_ms: 1,
            prompt_tokens: 1,
            completion_tokens: 1,
        })
    }
}

#[traced_test]
#[tokio::test]
async fn test_execution_emits_lifecycle_events() {
    let store = Arc::new(MemoryExperimentStore::new());
    let config = BenchConfig::default();
    let controller = ExecutionController::new(
        store.clone(),
        Arc::new(MemoryCatalog::new()),
        RunExecutor::new(store.clone(), Arc::new(QuietBackend), &config),
        ProgressBroadcaster::new(Arc::new(ChannelTransport::default())),
        &config,
    );
    let id = store
        .create_experiment(NewExperiment {
            name: "traced".into(),
            config: ExperimentConfig::new(["m"])
                .with_iterations(2)
                .with_variable("prompt", "hi"),
            task_template: None,
        })
        .await
        .unwrap()
        .id;

    controller.start(id).await.unwrap().wait().await.unwrap();

    assert!(logs_contain("experiment.started"));
    assert!(logs_contain("run.finished"));
    assert!(logs_contain("experiment.finished"));
    assert!(logs_contain("status=\"COMPLETED\""));
    assert!(logs_contain("failed_runs=0"));
    assert!(logs_contain("metric=\"flush\""));
    assert!(logs_contain("scope=\"process\""));
}
