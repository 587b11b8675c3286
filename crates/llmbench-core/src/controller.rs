//! Experiment execution control.
//!
//! Each executing experiment is an actor task that owns its
//! [`ExecutionState`]. The controller keeps only a control sender and a
//! progress receiver per experiment, so pause, cancel and progress queries
//! never wait on a run in flight. Control messages are sampled between runs:
//! a run that has started always finishes before a pause or cancel is
//! honored.
//!
//! ```text
//! DRAFT ──start──► RUNNING ──► COMPLETED
//!                    │ ▲
//!              pause │ │ resume
//!                    ▼ │
//!                  PAUSED
//!  RUNNING ──cancel / storage failure──► FAILED
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use llmbench_state::{CatalogStore, ExperimentId, ExperimentStatus, ExperimentStore, RunStatus};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};

use crate::broadcaster::{MessageType, ProgressBroadcaster};
use crate::config::BenchConfig;
use crate::error::BenchError;
use crate::executor::{ExperimentContext, RunExecutor};
use crate::matrix::{generate_run_matrix, RunSpec};
use crate::metrics::METRICS;
use crate::obs;
use crate::validation::validate_config;
use crate::Result;

/// Reason persisted when an experiment is cancelled.
pub const CANCELLED_REASON: &str = "cancelled by user";

/// Request delivered to an executing experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    Pause,
    Cancel,
}

/// Point-in-time view of an execution's progress.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub completed_runs: usize,
    pub total_runs: usize,
    pub percent_complete: f64,
}

impl ProgressSnapshot {
    pub fn new(completed_runs: usize, total_runs: usize) -> Self {
        let percent_complete = if total_runs == 0 {
            100.0
        } else {
            completed_runs as f64 * 100.0 / total_runs as f64
        };
        Self {
            completed_runs,
            total_runs,
            percent_complete,
        }
    }
}

/// State of one executing experiment. Only its actor mutates it.
///
/// `completed_runs` never exceeds `total_runs` and never decreases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionState {
    pub experiment_id: ExperimentId,
    pub total_runs: usize,
    pub completed_runs: usize,
    pub paused: bool,
    pub cancelled: bool,
}

impl ExecutionState {
    pub fn new(experiment_id: ExperimentId, total_runs: usize, completed_runs: usize) -> Self {
        Self {
            experiment_id,
            total_runs,
            completed_runs: completed_runs.min(total_runs),
            paused: false,
            cancelled: false,
        }
    }

    pub fn apply(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::Pause => self.paused = true,
            ControlMessage::Cancel => self.cancelled = true,
        }
    }

    fn record_completed(&mut self) {
        self.completed_runs = (self.completed_runs + 1).min(self.total_runs);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot::new(self.completed_runs, self.total_runs)
    }
}

/// Handle to a spawned execution.
///
/// Dropping it detaches the task; the experiment keeps running.
#[derive(Debug)]
pub struct ExecutionHandle {
    experiment_id: ExperimentId,
    task: JoinHandle<ExperimentStatus>,
}

impl ExecutionHandle {
    pub fn experiment_id(&self) -> ExperimentId {
        self.experiment_id
    }

    /// Whether the execution task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the terminal status (`COMPLETED`, `PAUSED` or `FAILED`).
    pub async fn wait(self) -> Result<ExperimentStatus> {
        self.task
            .await
            .map_err(|e| BenchError::Execution(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Live execution registry
// ---------------------------------------------------------------------------

enum Slot {
    /// start/resume is validating; no actor yet
    Reserved,
    Live(LiveExecution),
}

struct LiveExecution {
    control: mpsc::UnboundedSender<ControlMessage>,
    progress: watch::Receiver<ProgressSnapshot>,
}

type LiveMap = Mutex<HashMap<ExperimentId, Slot>>;

fn lock(live: &LiveMap) -> MutexGuard<'_, HashMap<ExperimentId, Slot>> {
    live.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds an experiment's registry slot while start/resume runs its checks.
/// Released on drop unless committed.
struct Reservation {
    inner: Arc<ControllerInner>,
    experiment_id: ExperimentId,
    committed: bool,
}

impl Reservation {
    fn commit(mut self, execution: LiveExecution) {
        lock(&self.inner.live).insert(self.experiment_id, Slot::Live(execution));
        self.committed = true;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.committed {
            lock(&self.inner.live).remove(&self.experiment_id);
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

struct ControllerInner {
    store: Arc<dyn ExperimentStore>,
    catalog: Arc<dyn CatalogStore>,
    executor: RunExecutor,
    broadcaster: ProgressBroadcaster,
    live: LiveMap,
    permits: Arc<Semaphore>,
}

/// Starts, pauses, cancels and resumes experiments.
///
/// Cheap to clone; clones share the same registry and worker pool.
#[derive(Clone)]
pub struct ExecutionController {
    inner: Arc<ControllerInner>,
}

impl ExecutionController {
    pub fn new(
        store: Arc<dyn ExperimentStore>,
        catalog: Arc<dyn CatalogStore>,
        executor: RunExecutor,
        broadcaster: ProgressBroadcaster,
        config: &BenchConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                store,
                catalog,
                executor,
                broadcaster,
                live: Mutex::new(HashMap::new()),
                permits: Arc::new(Semaphore::new(config.max_concurrent_experiments.max(1))),
            }),
        }
    }

    /// Move a `DRAFT` experiment to `RUNNING` and execute its full matrix in
    /// the background.
    pub async fn start(&self, experiment_id: ExperimentId) -> Result<ExecutionHandle> {
        let reservation = self.reserve(experiment_id)?;
        let record = self.inner.store.load_experiment(experiment_id).await?;
        if record.status != ExperimentStatus::Draft {
            return Err(BenchError::invalid_state(
                experiment_id,
                format!("cannot start from {}", record.status),
            ));
        }
        validate_config(&record.config)?;
        let ctx = ExperimentContext::load(&record, self.inner.catalog.as_ref()).await?;
        ctx.render_prompt()?;
        let matrix = generate_run_matrix(&record.config);

        self.inner
            .store
            .save_experiment_status(experiment_id, ExperimentStatus::Running, None)
            .await?;
        info!(experiment_id, total_runs = matrix.len(), "experiment started");
        Ok(self.launch(reservation, ctx, matrix, 0))
    }

    /// Continue a `PAUSED` experiment.
    ///
    /// The matrix is regenerated from the stored config and as many entries
    /// as there are persisted runs are skipped from its head.
    pub async fn resume(&self, experiment_id: ExperimentId) -> Result<ExecutionHandle> {
        let reservation = self.reserve(experiment_id)?;
        let record = self.inner.store.load_experiment(experiment_id).await?;
        if record.status != ExperimentStatus::Paused {
            return Err(BenchError::invalid_state(
                experiment_id,
                format!("cannot resume from {}", record.status),
            ));
        }
        validate_config(&record.config)?;
        let ctx = ExperimentContext::load(&record, self.inner.catalog.as_ref()).await?;
        ctx.render_prompt()?;
        let matrix = generate_run_matrix(&record.config);
        let persisted = self
            .inner
            .store
            .count_runs_by_experiment(experiment_id)
            .await?;
        let skip = usize::try_from(persisted)
            .unwrap_or(usize::MAX)
            .min(matrix.len());

        self.inner
            .store
            .save_experiment_status(experiment_id, ExperimentStatus::Running, None)
            .await?;
        info!(experiment_id, skip, total_runs = matrix.len(), "experiment resumed");
        Ok(self.launch(reservation, ctx, matrix, skip))
    }

    /// Ask a live execution to pause after its current run.
    pub fn pause(&self, experiment_id: ExperimentId) -> Result<()> {
        self.send_control(experiment_id, ControlMessage::Pause)
    }

    /// Ask a live execution to stop after its current run and mark the
    /// experiment `FAILED`.
    pub fn cancel(&self, experiment_id: ExperimentId) -> Result<()> {
        self.send_control(experiment_id, ControlMessage::Cancel)
    }

    /// Latest progress, or `None` when the experiment is not executing.
    pub fn get_progress(&self, experiment_id: ExperimentId) -> Option<ProgressSnapshot> {
        match lock(&self.inner.live).get(&experiment_id) {
            Some(Slot::Live(execution)) => Some(*execution.progress.borrow()),
            _ => None,
        }
    }

    pub fn is_executing(&self, experiment_id: ExperimentId) -> bool {
        matches!(
            lock(&self.inner.live).get(&experiment_id),
            Some(Slot::Live(_))
        )
    }

    fn reserve(&self, experiment_id: ExperimentId) -> Result<Reservation> {
        let mut live = lock(&self.inner.live);
        if live.contains_key(&experiment_id) {
            return Err(BenchError::invalid_state(
                experiment_id,
                "already executing",
            ));
        }
        live.insert(experiment_id, Slot::Reserved);
        Ok(Reservation {
            inner: Arc::clone(&self.inner),
            experiment_id,
            committed: false,
        })
    }

    fn send_control(&self, experiment_id: ExperimentId, message: ControlMessage) -> Result<()> {
        let live = lock(&self.inner.live);
        match live.get(&experiment_id) {
            Some(Slot::Live(execution)) => {
                execution.control.send(message).map_err(|_| {
                    BenchError::invalid_state(experiment_id, "execution already finished")
                })?;
                info!(experiment_id, ?message, "control request queued");
                Ok(())
            }
            Some(Slot::Reserved) => Err(BenchError::invalid_state(
                experiment_id,
                "execution is still starting",
            )),
            None => {
                info!(experiment_id, ?message, "no live execution, request ignored");
                Err(BenchError::invalid_state(experiment_id, "not executing"))
            }
        }
    }

    fn launch(
        &self,
        reservation: Reservation,
        ctx: ExperimentContext,
        mut matrix: Vec<RunSpec>,
        skip: usize,
    ) -> ExecutionHandle {
        let experiment_id = ctx.experiment_id;
        let state = ExecutionState::new(experiment_id, matrix.len(), skip);
        let pending = matrix.split_off(skip).into_iter();

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (progress_tx, progress_rx) = watch::channel(state.snapshot());
        reservation.commit(LiveExecution {
            control: control_tx,
            progress: progress_rx,
        });
        obs::emit_experiment_started(experiment_id, state.total_runs, skip);

        let actor = ExecutionActor {
            inner: Arc::clone(&self.inner),
            ctx,
            pending,
            state,
            failed_runs: 0,
            control: control_rx,
            progress: progress_tx,
        };
        let permits = Arc::clone(&self.inner.permits);
        let task = tokio::spawn(
            async move {
                let _permit = permits.acquire_owned().await.ok();
                actor.run().await
            }
            .instrument(obs::experiment_span(experiment_id)),
        );

        ExecutionHandle {
            experiment_id,
            task,
        }
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct ExecutionActor {
    inner: Arc<ControllerInner>,
    ctx: ExperimentContext,
    pending: std::vec::IntoIter<RunSpec>,
    state: ExecutionState,
    /// failed runs in this execution only
    failed_runs: usize,
    control: mpsc::UnboundedReceiver<ControlMessage>,
    progress: watch::Sender<ProgressSnapshot>,
}

impl ExecutionActor {
    async fn run(mut self) -> ExperimentStatus {
        loop {
            self.drain_control();
            if self.state.cancelled || self.state.paused {
                return self.finish_requested().await;
            }
            let Some(spec) = self.pending.next() else {
                // no request may be accepted after this point and then dropped
                self.control.close();
                self.drain_control();
                if self.state.cancelled || self.state.paused {
                    return self.finish_requested().await;
                }
                return self.finish(ExperimentStatus::Completed, None).await;
            };

            self.publish(
                MessageType::RunStarted,
                json!({
                    "model": spec.model,
                    "embeddingModel": spec.embedding_model,
                    "iteration": spec.iteration,
                    "position": self.state.completed_runs + 1,
                    "totalRuns": self.state.total_runs,
                }),
            )
            .await;

            let run = match self
                .inner
                .executor
                .execute_single_run(&spec, &self.ctx)
                .await
            {
                Ok(run) => run,
                Err(e) => {
                    warn!(error = %e, model = %spec.model, iteration = spec.iteration, "run could not be persisted");
                    return self
                        .finish(
                            ExperimentStatus::Failed,
                            Some(format!("run persistence failed: {e}")),
                        )
                        .await;
                }
            };

            self.state.record_completed();
            if run.status == RunStatus::Failed {
                self.failed_runs += 1;
            }
            let snapshot = self.state.snapshot();
            self.progress.send_replace(snapshot);

            self.publish(
                MessageType::RunCompleted,
                json!({
                    "runId": run.run_id,
                    "model": run.model,
                    "embeddingModel": run.embedding_model,
                    "iteration": run.iteration,
                    "status": run.status,
                    "durationMs": run.duration_ms,
                    "tokensPerSecond": run.tokens_per_second,
                    "timeToFirstTokenMs": run.time_to_first_token_ms,
                    "errorMessage": run.error_message,
                }),
            )
            .await;
            self.publish(MessageType::Progress, progress_payload(&snapshot))
                .await;
        }
    }

    fn drain_control(&mut self) {
        while let Ok(message) = self.control.try_recv() {
            self.state.apply(message);
        }
    }

    /// Terminal status for a pause or cancel request; cancel wins.
    async fn finish_requested(self) -> ExperimentStatus {
        if self.state.cancelled {
            self.finish(ExperimentStatus::Failed, Some(CANCELLED_REASON.to_string()))
                .await
        } else {
            self.finish(ExperimentStatus::Paused, None).await
        }
    }

    async fn finish(mut self, status: ExperimentStatus, reason: Option<String>) -> ExperimentStatus {
        // later pause/cancel requests fail with InvalidState instead of being dropped
        self.control.close();
        self.drain_control();
        let (status, reason) = if status == ExperimentStatus::Paused && self.state.cancelled {
            (ExperimentStatus::Failed, Some(CANCELLED_REASON.to_string()))
        } else {
            (status, reason)
        };
        let experiment_id = self.ctx.experiment_id;
        if let Err(e) = self
            .inner
            .store
            .save_experiment_status(experiment_id, status, reason.clone())
            .await
        {
            obs::emit_finalize_error(experiment_id, &e);
        }

        let snapshot = self.state.snapshot();
        let (message_type, payload) = match status {
            ExperimentStatus::Completed => {
                (MessageType::ExperimentCompleted, progress_payload(&snapshot))
            }
            ExperimentStatus::Paused => (MessageType::ExperimentPaused, progress_payload(&snapshot)),
            _ => (
                MessageType::Error,
                json!({
                    "status": status,
                    "reason": reason,
                    "completedRuns": snapshot.completed_runs,
                    "totalRuns": snapshot.total_runs,
                }),
            ),
        };
        self.publish(message_type, payload).await;

        obs::emit_experiment_finished(
            experiment_id,
            status,
            snapshot.completed_runs,
            snapshot.total_runs,
            self.failed_runs,
        );
        METRICS.flush();
        lock(&self.inner.live).remove(&experiment_id);
        status
    }

    async fn publish(&self, message_type: MessageType, payload: serde_json::Value) {
        self.inner
            .broadcaster
            .publish(self.ctx.experiment_id, message_type, payload)
            .await;
    }
}

fn progress_payload(snapshot: &ProgressSnapshot) -> serde_json::Value {
    json!({
        "completedRuns": snapshot.completed_runs,
        "totalRuns": snapshot.total_runs,
        "percentComplete": snapshot.percent_complete,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_percent() {
        assert_eq!(ProgressSnapshot::new(1, 4).percent_complete, 25.0);
        assert_eq!(ProgressSnapshot::new(0, 0).percent_complete, 100.0);
    }

    #[test]
    fn test_state_applies_control_messages() {
        let mut state = ExecutionState::new(1, 3, 0);
        state.apply(ControlMessage::Pause);
        assert!(state.paused && !state.cancelled);
        state.apply(ControlMessage::Cancel);
        assert!(state.cancelled);
    }

    #[test]
    fn test_completed_runs_capped_at_total() {
        let mut state = ExecutionState::new(1, 2, 5);
        assert_eq!(state.completed_runs, 2);
        state.record_completed();
        assert_eq!(state.completed_runs, 2);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let v = serde_json::to_value(ProgressSnapshot::new(2, 8)).unwrap();
        assert_eq!(v["completedRuns"], 2);
        assert_eq!(v["percentComplete"], 25.0);
    }
}
