//! Error types for llmbench-core

use llmbench_rag::RagError;
use llmbench_state::{ExperimentId, StorageError};
use thiserror::Error;

use crate::prompt::PromptError;

/// Errors surfaced by the orchestrator
#[derive(Error, Debug)]
pub enum BenchError {
    /// Experiment configuration rejected before any run started
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Requested transition is not allowed from the current state
    #[error("Invalid state for experiment {experiment_id}: {message}")]
    InvalidState {
        experiment_id: ExperimentId,
        message: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error("RAG error: {0}")]
    Rag(#[from] RagError),

    /// The background execution task panicked or was aborted
    #[error("Execution task failed: {0}")]
    Execution(String),
}

impl BenchError {
    pub(crate) fn invalid_state(experiment_id: ExperimentId, message: impl Into<String>) -> Self {
        BenchError::InvalidState {
            experiment_id,
            message: message.into(),
        }
    }
}

impl From<PromptError> for BenchError {
    fn from(err: PromptError) -> Self {
        BenchError::Configuration(err.to_string())
    }
}

impl From<StorageError> for BenchError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ExperimentNotFound { .. }
            | StorageError::DocumentNotFound { .. }
            | StorageError::SystemPromptNotFound { .. } => BenchError::NotFound(err.to_string()),
            other => BenchError::Storage(other),
        }
    }
}
