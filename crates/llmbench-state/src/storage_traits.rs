//! Storage trait definitions for LLM Bench
//!
//! These traits define the persistence seams the orchestrator depends on:
//! - `ExperimentStore`: experiments and their run results
//! - `CatalogStore`: read access to documents, embedding models, system prompts
//! - `VectorStore`: named collections of embedded chunks with similarity search
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::records::{
    DocumentId, DocumentRecord, EmbeddingModelRecord, ExperimentId, ExperimentRecord,
    ExperimentStatus, NewExperiment, RunResult, SystemPromptId, SystemPromptRecord,
};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ExperimentStore
// ---------------------------------------------------------------------------

/// Experiment and run persistence.
///
/// Guarantees:
/// - `save_run` is an upsert keyed by `RunResult::run_id`; each write
///   replaces the previous version of that run.
/// - `load_runs_by_experiment` returns runs ordered by iteration, ties
///   broken by creation time.
/// - `count_runs_by_experiment` counts every stored run regardless of status.
#[async_trait]
pub trait ExperimentStore: Send + Sync {
    /// Register a new experiment in `Draft` status.
    async fn create_experiment(&self, new: NewExperiment) -> StorageResult<ExperimentRecord>;

    /// Load an experiment. Returns `StorageError::ExperimentNotFound` if absent.
    async fn load_experiment(&self, id: ExperimentId) -> StorageResult<ExperimentRecord>;

    /// Persist a status change, with an optional human-readable reason.
    async fn save_experiment_status(
        &self,
        id: ExperimentId,
        status: ExperimentStatus,
        reason: Option<String>,
    ) -> StorageResult<()>;

    /// Insert or replace a run result.
    async fn save_run(&self, run: &RunResult) -> StorageResult<()>;

    /// All runs of an experiment, ordered by iteration.
    async fn load_runs_by_experiment(&self, id: ExperimentId) -> StorageResult<Vec<RunResult>>;

    /// Number of stored runs for an experiment.
    async fn count_runs_by_experiment(&self, id: ExperimentId) -> StorageResult<u64>;
}

// ---------------------------------------------------------------------------
// CatalogStore
// ---------------------------------------------------------------------------

/// Read access to the entities managed outside the orchestrator.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Load a document with its extracted text.
    async fn load_document(&self, id: DocumentId) -> StorageResult<DocumentRecord>;

    /// Record how many chunks the last ingest stored for a document.
    async fn update_document_chunk_count(&self, id: DocumentId, count: u64) -> StorageResult<()>;

    /// Look up a registered embedding model by name.
    async fn get_embedding_model(&self, name: &str) -> StorageResult<Option<EmbeddingModelRecord>>;

    /// Load a system prompt.
    async fn get_system_prompt(&self, id: SystemPromptId) -> StorageResult<SystemPromptRecord>;
}

// ---------------------------------------------------------------------------
// VectorStore
// ---------------------------------------------------------------------------

/// An embedded chunk to be stored in a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorDocument {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: serde_json::Value,
}

/// A similarity search hit. Smaller `distance` means more relevant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub content: String,
    pub distance: f32,
    pub metadata: serde_json::Value,
}

/// Named vector collections with nearest-neighbour search.
///
/// Guarantees:
/// - `query` returns at most `top_k` matches ordered by ascending distance.
/// - `add_documents` rejects vectors whose length differs from the
///   collection's declared dimensionality.
/// - Adding a document never removes previously stored ones.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn collection_exists(&self, name: &str) -> StorageResult<bool>;

    /// Create an empty collection holding `dimensions`-sized vectors.
    /// No-op if the collection already exists.
    async fn create_collection(&self, name: &str, dimensions: usize) -> StorageResult<()>;

    /// Append documents to an existing collection.
    async fn add_documents(
        &self,
        collection: &str,
        documents: Vec<VectorDocument>,
    ) -> StorageResult<()>;

    /// Nearest neighbours of `embedding` in `collection`.
    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> StorageResult<Vec<VectorMatch>>;
}
