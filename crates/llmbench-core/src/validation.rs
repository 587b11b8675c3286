//! Up-front checks on an experiment configuration.
//!
//! Everything here runs before the experiment leaves `DRAFT`, so a rejected
//! config never produces a partially executed experiment.

use llmbench_state::{ContextMode, ExperimentConfig};

use crate::error::BenchError;
use crate::Result;

/// Largest run matrix a single experiment may expand to.
pub const MAX_RUNS: usize = 100_000;

/// Number of runs `config` expands to, or `None` on overflow.
pub fn matrix_size(config: &ExperimentConfig) -> Option<usize> {
    let embeddings = config.embedding_models().len().max(1);
    config
        .models
        .len()
        .checked_mul(embeddings)?
        .checked_mul(usize::try_from(config.iterations).ok()?)
}

/// Reject configurations the run matrix cannot be built from.
///
/// All problems are reported together, separated by `"; "`.
pub fn validate_config(config: &ExperimentConfig) -> Result<()> {
    let mut problems = Vec::new();

    if config.models.is_empty() {
        problems.push("at least one model is required".to_string());
    }
    if config.models.iter().any(|m| m.trim().is_empty()) {
        problems.push("model identifiers must not be blank".to_string());
    }
    if config.iterations < 1 {
        problems.push("iterations must be at least 1".to_string());
    }
    if config.embedding_models().iter().any(|m| m.trim().is_empty()) {
        problems.push("embedding model identifiers must not be blank".to_string());
    }
    match matrix_size(config) {
        Some(runs) if runs <= MAX_RUNS => {}
        Some(runs) => problems.push(format!(
            "experiment expands to {runs} runs, at most {MAX_RUNS} are allowed"
        )),
        None => problems.push(format!(
            "experiment expands to more than {MAX_RUNS} runs"
        )),
    }
    if config.context_mode == ContextMode::Rag {
        if config.embedding_models().is_empty() {
            problems.push("RAG mode requires at least one embedding model".to_string());
        }
        if config.document_id.is_none() {
            problems.push("RAG mode requires a document".to_string());
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(BenchError::Configuration(problems.join("; ")))
    }
}
