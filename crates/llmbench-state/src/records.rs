//! Persisted entities: experiments, runs and the catalog records the
//! orchestrator reads (documents, embedding models, system prompts).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Numeric identifier of an experiment.
pub type ExperimentId = i64;

/// Numeric identifier of an uploaded document.
pub type DocumentId = i64;

/// Numeric identifier of a stored system prompt.
pub type SystemPromptId = i64;

// ---------------------------------------------------------------------------
// Experiments
// ---------------------------------------------------------------------------

/// Lifecycle status of an experiment.
///
/// `Draft`, `Completed` and `Failed` are terminal as far as the execution
/// controller is concerned; only `Paused` can be resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExperimentStatus {
    Draft,
    Running,
    Paused,
    Completed,
    Failed,
}

impl ExperimentStatus {
    /// Stable string form used by storage backends.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentStatus::Draft => "DRAFT",
            ExperimentStatus::Running => "RUNNING",
            ExperimentStatus::Paused => "PAUSED",
            ExperimentStatus::Completed => "COMPLETED",
            ExperimentStatus::Failed => "FAILED",
        }
    }

    /// Parse the stable string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(ExperimentStatus::Draft),
            "RUNNING" => Some(ExperimentStatus::Running),
            "PAUSED" => Some(ExperimentStatus::Paused),
            "COMPLETED" => Some(ExperimentStatus::Completed),
            "FAILED" => Some(ExperimentStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether runs are augmented with retrieved document context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContextMode {
    #[default]
    None,
    Rag,
}

/// Sampling parameters forwarded to the generation backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Context window size in tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_iterations() -> u32 {
    1
}

/// Configuration describing the run matrix of an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Generation models, in execution order. Must be non-empty.
    pub models: Vec<String>,
    /// Embedding models to cross with every generation model.
    #[serde(default)]
    pub embedding_models: Option<Vec<String>>,
    /// Repetitions of each (model, embedding model) pair. At least 1.
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default)]
    pub context_mode: ContextMode,
    /// Document used for retrieval when `context_mode` is `Rag`.
    #[serde(default)]
    pub document_id: Option<DocumentId>,
    #[serde(default)]
    pub hyperparameters: Option<Hyperparameters>,
    /// Values for `{{name}}` placeholders in the task template.
    #[serde(default)]
    pub variables: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub system_prompt_id: Option<SystemPromptId>,
}

impl ExperimentConfig {
    /// Create a config for the given models with every optional part unset.
    pub fn new<I, S>(models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            models: models.into_iter().map(Into::into).collect(),
            embedding_models: None,
            iterations: 1,
            context_mode: ContextMode::None,
            document_id: None,
            hyperparameters: None,
            variables: None,
            system_prompt_id: None,
        }
    }

    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_embedding_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.embedding_models = Some(models.into_iter().map(Into::into).collect());
        self
    }

    /// Switch to RAG mode against the given document.
    pub fn with_rag(mut self, document_id: DocumentId) -> Self {
        self.context_mode = ContextMode::Rag;
        self.document_id = Some(document_id);
        self
    }

    pub fn with_hyperparameters(mut self, hyperparameters: Hyperparameters) -> Self {
        self.hyperparameters = Some(hyperparameters);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn with_system_prompt(mut self, id: SystemPromptId) -> Self {
        self.system_prompt_id = Some(id);
        self
    }

    /// Embedding models as a slice, empty when none are configured.
    pub fn embedding_models(&self) -> &[String] {
        self.embedding_models.as_deref().unwrap_or(&[])
    }
}

/// Fields supplied when registering a new experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewExperiment {
    pub name: String,
    pub config: ExperimentConfig,
    /// Prompt template with `{{name}}` placeholders. `None` passes the
    /// `prompt` variable through unchanged.
    pub task_template: Option<String>,
}

/// A stored experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub id: ExperimentId,
    pub name: String,
    pub status: ExperimentStatus,
    pub config: ExperimentConfig,
    pub task_template: Option<String>,
    /// Why the experiment reached its current status (e.g. cancellation).
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

/// Status of a single generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "PENDING",
            RunStatus::Running => "RUNNING",
            RunStatus::Success => "SUCCESS",
            RunStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(RunStatus::Pending),
            "RUNNING" => Some(RunStatus::Running),
            "SUCCESS" => Some(RunStatus::Success),
            "FAILED" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    /// Whether the run has reached `Success` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Failed)
    }
}

/// Metrics reported by the generation backend for a successful run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub duration_ms: u64,
    pub tokens_per_second: f64,
    pub time_to_first_token_ms: u64,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Outcome of one generation run.
///
/// Transitions `Pending → Running → {Success, Failed}`. After the terminal
/// write the record is never modified again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub experiment_id: ExperimentId,
    pub model: String,
    pub embedding_model: Option<String>,
    pub iteration: u32,
    pub status: RunStatus,
    /// Fully resolved prompt sent to the backend
    pub prompt: Option<String>,
    pub output: Option<String>,
    pub duration_ms: Option<u64>,
    pub tokens_per_second: Option<f64>,
    pub time_to_first_token_ms: Option<u64>,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunResult {
    /// Create a `Pending` run for one matrix entry.
    pub fn pending(
        experiment_id: ExperimentId,
        model: impl Into<String>,
        embedding_model: Option<String>,
        iteration: u32,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            experiment_id,
            model: model.into(),
            embedding_model,
            iteration,
            status: RunStatus::Pending,
            prompt: None,
            output: None,
            duration_ms: None,
            tokens_per_second: None,
            time_to_first_token_ms: None,
            prompt_tokens: None,
            completion_tokens: None,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Move a pending run into `Running`.
    pub fn start(mut self) -> Self {
        self.status = RunStatus::Running;
        self
    }

    /// Finalize as `Success` with the backend's output and metrics.
    pub fn succeed(mut self, output: String, metrics: RunMetrics) -> Self {
        self.status = RunStatus::Success;
        self.output = Some(output);
        self.duration_ms = Some(metrics.duration_ms);
        self.tokens_per_second = Some(metrics.tokens_per_second);
        self.time_to_first_token_ms = Some(metrics.time_to_first_token_ms);
        self.prompt_tokens = Some(metrics.prompt_tokens);
        self.completion_tokens = Some(metrics.completion_tokens);
        self.completed_at = Some(Utc::now());
        self
    }

    /// Finalize as `Failed` with an error message.
    pub fn fail(mut self, error_message: impl Into<String>, duration_ms: u64) -> Self {
        self.status = RunStatus::Failed;
        self.error_message = Some(error_message.into());
        self.duration_ms = Some(duration_ms);
        self.completed_at = Some(Utc::now());
        self
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// An uploaded document with its extracted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub filename: String,
    pub content: String,
    /// Number of chunks stored by the last ingest
    pub chunk_count: u64,
}

/// A registered embedding model and the vector size it produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingModelRecord {
    pub name: String,
    pub dimensions: usize,
}

/// A reusable system prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemPromptRecord {
    pub id: SystemPromptId,
    pub name: String,
    pub content: String,
}
