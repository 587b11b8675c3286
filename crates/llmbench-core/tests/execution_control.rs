//! ExecutionController lifecycle tests over in-memory storage.
//!
//! The scripted backend can hold one call open until the test releases it,
//! which lets pause and cancel land at a known point in the matrix.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use llmbench_core::*;
use llmbench_gateway::{
    EmbeddingBackend, EmbeddingRequest, GatewayError, GenerationBackend, GenerationRequest,
    GenerationResponse,
};
use llmbench_rag::{RagConfig, RagPipeline};
use llmbench_state::fakes::{MemoryCatalog, MemoryExperimentStore, MemoryVectorStore};
use llmbench_state::{
    ExperimentConfig, ExperimentId, ExperimentStatus, ExperimentStore, NewExperiment, RunResult,
    RunStatus,
};
use tokio::sync::Notify;

#[derive(Default)]
struct ScriptedBackend {
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    /// 0-based call index held until `release` is notified
    gate_at: Option<usize>,
    entered: Notify,
    release: Notify,
}

impl ScriptedBackend {
    fn gated_at(call: usize) -> Self {
        Self {
            gate_at: Some(call),
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> llmbench_gateway::Result<GenerationResponse> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());
        if self.gate_at == Some(call) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        if request.model.starts_with("missing:") {
            return Err(GatewayError::ModelNotFound(request.model));
        }
        Ok(GenerationResponse {
            text: format!("answer {call}"),
            duration_ms: 10,
            tokens_per_second: 50.0,
            time_to_first_token_ms: 2,
            prompt_tokens: 5,
            completion_tokens: 5,
        })
    }
}

/// Holds the `EXPERIMENT_COMPLETED` publish until `release` is notified.
#[derive(Default)]
struct HoldingTransport {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl BroadcastTransport for HoldingTransport {
    async fn publish(
        &self,
        _topic: &str,
        envelope: &Envelope,
    ) -> std::result::Result<(), TransportError> {
        if envelope.message_type == MessageType::ExperimentCompleted {
            self.entered.notify_one();
            self.release.notified().await;
        }
        Ok(())
    }
}

/// Embeds text as counts of `a`, `b` and `c`.
struct LetterEmbedder;

#[async_trait]
impl EmbeddingBackend for LetterEmbedder {
    async fn embed(&self, request: EmbeddingRequest) -> llmbench_gateway::Result<Vec<f32>> {
        Ok(['a', 'b', 'c']
            .iter()
            .map(|ch| request.input.chars().filter(|c| c == ch).count() as f32)
            .collect())
    }
}

struct Harness {
    store: Arc<MemoryExperimentStore>,
    backend: Arc<ScriptedBackend>,
    transport: ChannelTransport,
    controller: ExecutionController,
}

fn harness(backend: ScriptedBackend) -> Harness {
    harness_with(backend, BenchConfig::default(), None)
}

fn harness_with(
    backend: ScriptedBackend,
    config: BenchConfig,
    rag: Option<(Arc<MemoryCatalog>, RagPipeline)>,
) -> Harness {
    let store = Arc::new(MemoryExperimentStore::new());
    let backend = Arc::new(backend);
    let transport = ChannelTransport::new(64);

    let (catalog, rag) = match rag {
        Some((catalog, pipeline)) => (catalog, Some(pipeline)),
        None => (Arc::new(MemoryCatalog::new()), None),
    };
    let mut executor = RunExecutor::new(store.clone(), backend.clone(), &config);
    if let Some(pipeline) = rag {
        executor = executor.with_rag(pipeline);
    }
    let controller = ExecutionController::new(
        store.clone(),
        catalog,
        executor,
        ProgressBroadcaster::new(Arc::new(transport.clone())),
        &config,
    );
    Harness {
        store,
        backend,
        transport,
        controller,
    }
}

async fn create(store: &MemoryExperimentStore, config: ExperimentConfig) -> ExperimentId {
    store
        .create_experiment(NewExperiment {
            name: "bench".into(),
            config,
            task_template: Some("Question {{n}}".into()),
        })
        .await
        .unwrap()
        .id
}

fn four_runs() -> ExperimentConfig {
    ExperimentConfig::new(["llama3.2:1b"])
        .with_iterations(4)
        .with_variable("n", "1")
}

async fn status_of(store: &MemoryExperimentStore, id: ExperimentId) -> ExperimentStatus {
    store.load_experiment(id).await.unwrap().status
}

#[tokio::test]
async fn start_runs_full_matrix_to_completion() {
    let h = harness(ScriptedBackend::default());
    let config = ExperimentConfig::new(["a", "b"])
        .with_embedding_models(["e1", "e2"])
        .with_iterations(2)
        .with_variable("n", "7");
    let id = create(&h.store, config).await;

    let handle = h.controller.start(id).await.unwrap();
    assert_eq!(handle.experiment_id(), id);
    assert_eq!(handle.wait().await.unwrap(), ExperimentStatus::Completed);

    let runs = h.store.load_runs_by_experiment(id).await.unwrap();
    assert_eq!(runs.len(), 8);
    assert!(runs.iter().all(|r| r.status == RunStatus::Success));
    assert!(runs.iter().all(|r| r.prompt.as_deref() == Some("Question 7")));
    assert_eq!(h.backend.calls(), 8);
    assert_eq!(
        h.store.status_history(id),
        vec![ExperimentStatus::Running, ExperimentStatus::Completed]
    );
    assert!(!h.controller.is_executing(id));
    assert!(h.controller.get_progress(id).is_none());
}

#[tokio::test]
async fn start_rejects_non_draft_experiment() {
    let h = harness(ScriptedBackend::default());
    let id = create(&h.store, four_runs()).await;
    h.controller.start(id).await.unwrap().wait().await.unwrap();

    let err = h.controller.start(id).await.unwrap_err();
    assert!(matches!(err, BenchError::InvalidState { experiment_id, .. } if experiment_id == id));
    assert_eq!(h.backend.calls(), 4);
}

#[tokio::test]
async fn start_rejects_experiment_already_executing() {
    let h = harness(ScriptedBackend::gated_at(0));
    let id = create(&h.store, four_runs()).await;
    let handle = h.controller.start(id).await.unwrap();
    h.backend.entered.notified().await;

    assert!(h.controller.is_executing(id));
    assert!(!handle.is_finished());
    let err = h.controller.start(id).await.unwrap_err();
    assert!(matches!(err, BenchError::InvalidState { .. }));

    h.backend.release.notify_one();
    assert_eq!(handle.wait().await.unwrap(), ExperimentStatus::Completed);
}

#[tokio::test]
async fn start_missing_experiment_is_not_found() {
    let h = harness(ScriptedBackend::default());
    let err = h.controller.start(404).await.unwrap_err();
    assert!(matches!(err, BenchError::NotFound(_)));
    assert!(!h.controller.is_executing(404));
}

#[tokio::test]
async fn invalid_config_leaves_experiment_in_draft() {
    let h = harness(ScriptedBackend::default());
    let id = create(&h.store, ExperimentConfig::new(Vec::<String>::new())).await;

    let err = h.controller.start(id).await.unwrap_err();
    assert!(matches!(err, BenchError::Configuration(_)));
    assert_eq!(status_of(&h.store, id).await, ExperimentStatus::Draft);
    assert!(h.store.status_history(id).is_empty());
    assert!(!h.controller.is_executing(id));
}

#[tokio::test]
async fn undefined_template_variable_leaves_experiment_in_draft() {
    let h = harness(ScriptedBackend::default());
    let id = create(&h.store, ExperimentConfig::new(["m"]).with_variable("topic", "x")).await;

    let err = h.controller.start(id).await.unwrap_err();
    assert!(matches!(err, BenchError::Configuration(_)));
    assert!(err.to_string().contains("template"));
    assert_eq!(status_of(&h.store, id).await, ExperimentStatus::Draft);
    assert!(h.store.status_history(id).is_empty());
    assert_eq!(h.backend.calls(), 0);
}

#[tokio::test]
async fn pause_takes_effect_after_current_run() {
    let h = harness(ScriptedBackend::gated_at(1));
    let id = create(&h.store, four_runs()).await;
    let handle = h.controller.start(id).await.unwrap();

    h.backend.entered.notified().await;
    h.controller.pause(id).unwrap();
    h.backend.release.notify_one();

    assert_eq!(handle.wait().await.unwrap(), ExperimentStatus::Paused);
    let runs = h.store.load_runs_by_experiment(id).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.status == RunStatus::Success));
    assert_eq!(h.backend.calls(), 2);
}

#[tokio::test]
async fn resume_continues_where_pause_stopped() {
    let h = harness(ScriptedBackend::gated_at(1));
    let id = create(&h.store, four_runs()).await;
    let handle = h.controller.start(id).await.unwrap();
    h.backend.entered.notified().await;
    h.controller.pause(id).unwrap();
    h.backend.release.notify_one();
    handle.wait().await.unwrap();

    let handle = h.controller.resume(id).await.unwrap();
    assert_eq!(handle.wait().await.unwrap(), ExperimentStatus::Completed);

    let runs = h.store.load_runs_by_experiment(id).await.unwrap();
    let iterations: Vec<u32> = runs.iter().map(|r| r.iteration).collect();
    assert_eq!(iterations, vec![1, 2, 3, 4]);
    assert_eq!(h.backend.calls(), 4);
    assert_eq!(
        h.store.status_history(id),
        vec![
            ExperimentStatus::Running,
            ExperimentStatus::Paused,
            ExperimentStatus::Running,
            ExperimentStatus::Completed,
        ]
    );
}

#[tokio::test]
async fn pause_during_last_run_then_resume_completes_without_runs() {
    let h = harness(ScriptedBackend::gated_at(3));
    let id = create(&h.store, four_runs()).await;
    let handle = h.controller.start(id).await.unwrap();
    h.backend.entered.notified().await;
    h.controller.pause(id).unwrap();
    h.backend.release.notify_one();

    assert_eq!(handle.wait().await.unwrap(), ExperimentStatus::Paused);
    assert_eq!(h.store.count_runs_by_experiment(id).await.unwrap(), 4);

    let handle = h.controller.resume(id).await.unwrap();
    assert_eq!(handle.wait().await.unwrap(), ExperimentStatus::Completed);
    assert_eq!(h.backend.calls(), 4);
}

#[tokio::test]
async fn resume_skips_persisted_runs_by_count() {
    let h = harness(ScriptedBackend::default());
    let id = create(&h.store, four_runs()).await;
    h.store
        .save_experiment_status(id, ExperimentStatus::Paused, None)
        .await
        .unwrap();
    for iteration in 1..=2 {
        h.store.seed_run(
            RunResult::pending(id, "llama3.2:1b", None, iteration)
                .start()
                .fail("interrupted", 1),
        );
    }

    let handle = h.controller.resume(id).await.unwrap();
    assert_eq!(handle.wait().await.unwrap(), ExperimentStatus::Completed);

    assert_eq!(h.backend.calls(), 2);
    let runs = h.store.load_runs_by_experiment(id).await.unwrap();
    let iterations: Vec<u32> = runs.iter().map(|r| r.iteration).collect();
    assert_eq!(iterations, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn resume_with_more_runs_than_matrix_completes_immediately() {
    let h = harness(ScriptedBackend::default());
    let id = create(&h.store, four_runs()).await;
    h.store
        .save_experiment_status(id, ExperimentStatus::Paused, None)
        .await
        .unwrap();
    for iteration in 1..=6 {
        h.store
            .seed_run(RunResult::pending(id, "llama3.2:1b", None, iteration));
    }

    let handle = h.controller.resume(id).await.unwrap();
    assert_eq!(handle.wait().await.unwrap(), ExperimentStatus::Completed);
    assert_eq!(h.backend.calls(), 0);
}

#[tokio::test]
async fn resume_rejects_non_paused_experiment() {
    let h = harness(ScriptedBackend::default());
    let id = create(&h.store, four_runs()).await;

    let err = h.controller.resume(id).await.unwrap_err();
    assert!(matches!(err, BenchError::InvalidState { .. }));
    assert_eq!(status_of(&h.store, id).await, ExperimentStatus::Draft);
}

#[tokio::test]
async fn cancel_marks_experiment_failed() {
    let h = harness(ScriptedBackend::gated_at(0));
    let id = create(&h.store, four_runs()).await;
    let handle = h.controller.start(id).await.unwrap();

    h.backend.entered.notified().await;
    h.controller.cancel(id).unwrap();
    h.backend.release.notify_one();

    assert_eq!(handle.wait().await.unwrap(), ExperimentStatus::Failed);
    let record = h.store.load_experiment(id).await.unwrap();
    assert_eq!(record.status_reason.as_deref(), Some(CANCELLED_REASON));
    assert_eq!(h.store.count_runs_by_experiment(id).await.unwrap(), 1);
}

#[tokio::test]
async fn control_during_finalize_is_rejected() {
    let store = Arc::new(MemoryExperimentStore::new());
    let transport = Arc::new(HoldingTransport::default());
    let config = BenchConfig::default();
    let controller = ExecutionController::new(
        store.clone(),
        Arc::new(MemoryCatalog::new()),
        RunExecutor::new(store.clone(), Arc::new(ScriptedBackend::default()), &config),
        ProgressBroadcaster::new(transport.clone()),
        &config,
    );
    let id = create(&store, four_runs()).await;
    let handle = controller.start(id).await.unwrap();

    // COMPLETED is already stored; the completion broadcast is in flight
    transport.entered.notified().await;
    assert_eq!(status_of(&store, id).await, ExperimentStatus::Completed);
    assert!(!handle.is_finished());
    assert!(matches!(
        controller.cancel(id),
        Err(BenchError::InvalidState { .. })
    ));
    assert!(matches!(
        controller.pause(id),
        Err(BenchError::InvalidState { .. })
    ));

    transport.release.notify_one();
    assert_eq!(handle.wait().await.unwrap(), ExperimentStatus::Completed);
    let record = store.load_experiment(id).await.unwrap();
    assert_eq!(record.status, ExperimentStatus::Completed);
    assert_eq!(record.status_reason, None);
    assert_eq!(
        store.status_history(id),
        vec![ExperimentStatus::Running, ExperimentStatus::Completed]
    );
}

#[tokio::test]
async fn control_without_live_execution_is_rejected() {
    let h = harness(ScriptedBackend::default());
    let id = create(&h.store, four_runs()).await;

    assert!(matches!(
        h.controller.pause(id),
        Err(BenchError::InvalidState { .. })
    ));
    assert!(matches!(
        h.controller.cancel(id),
        Err(BenchError::InvalidState { .. })
    ));
    assert_eq!(status_of(&h.store, id).await, ExperimentStatus::Draft);
}

#[tokio::test]
async fn failed_runs_do_not_stop_the_experiment() {
    let h = harness(ScriptedBackend::default());
    let config = ExperimentConfig::new(["missing:7b", "llama3.2:1b"])
        .with_iterations(2)
        .with_variable("n", "1");
    let id = create(&h.store, config).await;

    let status = h.controller.start(id).await.unwrap().wait().await.unwrap();
    assert_eq!(status, ExperimentStatus::Completed);

    let runs = h.store.load_runs_by_experiment(id).await.unwrap();
    assert_eq!(runs.len(), 4);
    let failed: Vec<_> = runs
        .iter()
        .filter(|r| r.status == RunStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().all(|r| r.model == "missing:7b"));
    assert!(failed[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("missing:7b"));
}

#[tokio::test]
async fn run_persistence_failure_fails_experiment() {
    let h = harness(ScriptedBackend::default());
    let id = create(&h.store, four_runs()).await;
    h.store.set_fail_run_writes(true);

    let status = h.controller.start(id).await.unwrap().wait().await.unwrap();
    assert_eq!(status, ExperimentStatus::Failed);

    let record = h.store.load_experiment(id).await.unwrap();
    assert!(record
        .status_reason
        .unwrap()
        .starts_with("run persistence failed"));
    assert_eq!(h.backend.calls(), 0);
}

#[tokio::test]
async fn progress_reflects_completed_runs() {
    let h = harness(ScriptedBackend::gated_at(1));
    let id = create(&h.store, four_runs()).await;
    let handle = h.controller.start(id).await.unwrap();
    h.backend.entered.notified().await;

    let progress = h.controller.get_progress(id).unwrap();
    assert_eq!(progress.completed_runs, 1);
    assert_eq!(progress.total_runs, 4);
    assert_eq!(progress.percent_complete, 25.0);

    h.backend.release.notify_one();
    handle.wait().await.unwrap();
    assert!(h.controller.get_progress(id).is_none());
}

#[tokio::test]
async fn broadcasts_follow_run_lifecycle() {
    let h = harness(ScriptedBackend::default());
    let id = create(
        &h.store,
        ExperimentConfig::new(["m"]).with_iterations(2).with_variable("n", "1"),
    )
    .await;
    let mut sub = h.transport.subscribe(progress_topic(id));

    h.controller.start(id).await.unwrap().wait().await.unwrap();

    let mut received = Vec::new();
    for _ in 0..7 {
        received.push(sub.recv().await.unwrap());
    }
    let types: Vec<MessageType> = received.iter().map(|e| e.message_type).collect();
    assert_eq!(
        types,
        vec![
            MessageType::RunStarted,
            MessageType::RunCompleted,
            MessageType::Progress,
            MessageType::RunStarted,
            MessageType::RunCompleted,
            MessageType::Progress,
            MessageType::ExperimentCompleted,
        ]
    );
    assert!(received.iter().all(|e| e.experiment_id == id));
    assert_eq!(received[1].payload["status"], "SUCCESS");
    assert_eq!(received[5].payload["completedRuns"], 2);
    assert_eq!(received[5].payload["percentComplete"], 100.0);
}

#[tokio::test]
async fn cancel_broadcasts_error_with_reason() {
    let h = harness(ScriptedBackend::gated_at(0));
    let id = create(&h.store, four_runs()).await;
    let mut sub = h.transport.subscribe(progress_topic(id));
    let handle = h.controller.start(id).await.unwrap();
    h.backend.entered.notified().await;
    h.controller.cancel(id).unwrap();
    h.backend.release.notify_one();
    handle.wait().await.unwrap();

    let mut last = None;
    for _ in 0..4 {
        last = sub.recv().await;
    }
    let last = last.unwrap();
    assert_eq!(last.message_type, MessageType::Error);
    assert_eq!(last.payload["reason"], CANCELLED_REASON);
}

#[tokio::test]
async fn rag_runs_prepend_retrieved_context() {
    let catalog = Arc::new(MemoryCatalog::new());
    catalog.put_document(3, "letters.txt", "aaaa bbbb cccc");
    catalog.register_embedding_model("letters", 3);
    let pipeline = RagPipeline::new(
        catalog.clone(),
        Arc::new(MemoryVectorStore::new()),
        Arc::new(LetterEmbedder),
    );
    let report = ingest_document(
        &pipeline,
        3,
        "letters",
        RagConfig {
            chunk_size: 5,
            overlap: 0,
        },
    )
    .await
    .unwrap();
    assert_eq!(report.chunk_count, 3);

    let config = BenchConfig::default().with_rag_top_k(1);
    let h = harness_with(ScriptedBackend::default(), config, Some((catalog, pipeline)));
    let experiment = ExperimentConfig::new(["m"])
        .with_embedding_models(["letters"])
        .with_rag(3)
        .with_variable("n", "aaa");
    let id = create(&h.store, experiment).await;

    let status = h.controller.start(id).await.unwrap().wait().await.unwrap();
    assert_eq!(status, ExperimentStatus::Completed);

    let prompt = h.backend.prompts.lock().unwrap()[0].clone();
    assert_eq!(prompt, "Context:\n\n[1] aaaa \n\nQuestion aaa");
    let run = &h.store.load_runs_by_experiment(id).await.unwrap()[0];
    assert_eq!(run.embedding_model.as_deref(), Some("letters"));
    assert_eq!(run.prompt.as_deref(), Some(prompt.as_str()));
}

#[tokio::test]
async fn rag_run_without_ingested_collection_fails_only_that_run() {
    let catalog = Arc::new(MemoryCatalog::new());
    catalog.put_document(3, "letters.txt", "aaaa");
    let pipeline = RagPipeline::new(
        catalog.clone(),
        Arc::new(MemoryVectorStore::new()),
        Arc::new(LetterEmbedder),
    );
    let h = harness_with(
        ScriptedBackend::default(),
        BenchConfig::default(),
        Some((catalog, pipeline)),
    );
    let id = create(
        &h.store,
        ExperimentConfig::new(["m"])
            .with_embedding_models(["letters"])
            .with_rag(3)
            .with_variable("n", "a"),
    )
    .await;

    let status = h.controller.start(id).await.unwrap().wait().await.unwrap();
    assert_eq!(status, ExperimentStatus::Completed);
    let run = &h.store.load_runs_by_experiment(id).await.unwrap()[0];
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error_message.as_deref().unwrap().contains("retrieval failed"));
    assert_eq!(h.backend.calls(), 0);
}

#[tokio::test]
async fn worker_pool_bounds_concurrent_experiments() {
    let config = BenchConfig::default().with_max_concurrent_experiments(1);
    let h = harness_with(ScriptedBackend::gated_at(0), config, None);
    let single = || ExperimentConfig::new(["m"]).with_variable("n", "1");
    let first = create(&h.store, single()).await;
    let second = create(&h.store, single()).await;

    let a = h.controller.start(first).await.unwrap();
    let b = h.controller.start(second).await.unwrap();
    h.backend.entered.notified().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // both accepted, only one holds a worker
    assert_eq!(h.backend.calls(), 1);
    assert_eq!(status_of(&h.store, first).await, ExperimentStatus::Running);
    assert_eq!(status_of(&h.store, second).await, ExperimentStatus::Running);

    h.backend.release.notify_one();
    assert_eq!(a.wait().await.unwrap(), ExperimentStatus::Completed);
    assert_eq!(b.wait().await.unwrap(), ExperimentStatus::Completed);
    assert_eq!(h.backend.calls(), 2);
}
