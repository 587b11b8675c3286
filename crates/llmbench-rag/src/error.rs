//! Error types for llmbench-rag

use llmbench_gateway::GatewayError;
use llmbench_state::StorageError;
use thiserror::Error;

/// Errors raised by the RAG pipeline
#[derive(Error, Debug)]
pub enum RagError {
    /// Chunking parameters out of range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Document or embedding model is not known
    #[error("Not found: {0}")]
    NotFound(String),

    /// Vector or catalog storage failed
    #[error("Storage error: {0}")]
    Storage(StorageError),

    /// Embedding backend failed
    #[error("Embedding failed: {0}")]
    Gateway(#[from] GatewayError),
}

impl From<StorageError> for RagError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DocumentNotFound { .. } | StorageError::CollectionNotFound { .. } => {
                RagError::NotFound(err.to_string())
            }
            other => RagError::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_document_becomes_not_found() {
        let err = RagError::from(StorageError::DocumentNotFound { id: 3 });
        assert!(matches!(err, RagError::NotFound(_)));
    }

    #[test]
    fn test_backend_failure_stays_storage() {
        let err = RagError::from(StorageError::Backend("disk full".into()));
        assert!(matches!(err, RagError::Storage(_)));
    }
}
