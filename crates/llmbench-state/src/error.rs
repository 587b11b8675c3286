//! Error types for llmbench-state

use thiserror::Error;

/// Errors that can occur in the persistence layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Query or write rejected by the backend
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),

    #[error("Experiment not found: {id}")]
    ExperimentNotFound { id: i64 },

    #[error("Document not found: {id}")]
    DocumentNotFound { id: i64 },

    #[error("System prompt not found: {id}")]
    SystemPromptNotFound { id: i64 },

    #[error("Collection not found: {name}")]
    CollectionNotFound { name: String },

    /// Vector length does not match the collection's declared dimensionality
    #[error("Collection {collection} expects {expected}-dimensional vectors, got {actual}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_mismatch_display() {
        let err = StorageError::DimensionMismatch {
            collection: "doc-1-nomic".to_string(),
            expected: 768,
            actual: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("doc-1-nomic"));
        assert!(msg.contains("768"));
        assert!(msg.contains('3'));
    }

    #[test]
    fn test_not_found_display() {
        let err = StorageError::ExperimentNotFound { id: 42 };
        assert_eq!(err.to_string(), "Experiment not found: 42");
    }
}
