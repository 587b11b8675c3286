//! Expansion of an experiment config into its ordered run matrix.

use llmbench_state::ExperimentConfig;
use serde::{Deserialize, Serialize};

/// One entry of the run matrix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunSpec {
    pub model: String,
    pub embedding_model: Option<String>,
    /// 1-based
    pub iteration: u32,
}

/// Expand `config` into runs ordered models-outer, embedding-models-middle,
/// iterations-inner. Without embedding models the middle loop runs once
/// with `None`.
pub fn generate_run_matrix(config: &ExperimentConfig) -> Vec<RunSpec> {
    let embeddings: Vec<Option<&String>> = if config.embedding_models().is_empty() {
        vec![None]
    } else {
        config.embedding_models().iter().map(Some).collect()
    };

    let mut matrix = Vec::new();
    for model in &config.models {
        for &embedding in &embeddings {
            for iteration in 1..=config.iterations {
                matrix.push(RunSpec {
                    model: model.clone(),
                    embedding_model: embedding.cloned(),
                    iteration,
                });
            }
        }
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(model: &str, embedding: Option<&str>, iteration: u32) -> RunSpec {
        RunSpec {
            model: model.into(),
            embedding_model: embedding.map(Into::into),
            iteration,
        }
    }

    #[test]
    fn test_without_embeddings() {
        let config = ExperimentConfig::new(["a", "b"]).with_iterations(2);
        assert_eq!(
            generate_run_matrix(&config),
            vec![
                spec("a", None, 1),
                spec("a", None, 2),
                spec("b", None, 1),
                spec("b", None, 2),
            ]
        );
    }

    #[test]
    fn test_embeddings_are_middle_loop() {
        let config = ExperimentConfig::new(["a", "b"])
            .with_embedding_models(["e1", "e2"])
            .with_iterations(2);
        let matrix = generate_run_matrix(&config);
        assert_eq!(matrix.len(), 8);
        assert_eq!(
            &matrix[..4],
            &[
                spec("a", Some("e1"), 1),
                spec("a", Some("e1"), 2),
                spec("a", Some("e2"), 1),
                spec("a", Some("e2"), 2),
            ]
        );
        assert_eq!(matrix[4], spec("b", Some("e1"), 1));
    }

    #[test]
    fn test_empty_embedding_list_uses_single_none() {
        let config = ExperimentConfig::new(["a"]).with_embedding_models(Vec::<String>::new());
        assert_eq!(generate_run_matrix(&config), vec![spec("a", None, 1)]);
    }

    #[test]
    fn test_deterministic() {
        let config = ExperimentConfig::new(["x", "y", "z"])
            .with_embedding_models(["e"])
            .with_iterations(3);
        assert_eq!(generate_run_matrix(&config), generate_run_matrix(&config));
    }
}
