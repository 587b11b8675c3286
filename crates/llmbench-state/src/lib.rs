//! LLM Bench State: persistence for experiments, runs, catalog and vectors
//!
//! This crate provides the storage layer of LLM Bench. The orchestrator and
//! the RAG pipeline only see the traits in `storage_traits`; concrete
//! backends are the in-memory fakes and SurrealDB.
//!
//! ## Layer 0 - Data/Persistence
//!
//! ## Key Components
//!
//! - `ExperimentStore`: experiments, status transitions and run results
//! - `CatalogStore`: documents, embedding-model registrations, system prompts
//! - `VectorStore`: named collections of embedded chunks
//! - `SurrealStore` / `SurrealVectorStore`: SurrealDB implementations

mod error;
pub mod fakes;
mod handle;
mod migrations;
pub mod records;
mod schema;
pub mod storage_traits;
mod surreal_store;
mod surreal_vectors;

pub use error::StorageError;
pub use handle::{connect, DbConfig, DEFAULT_ENDPOINT};
pub use records::{
    ContextMode, DocumentId, DocumentRecord, EmbeddingModelRecord, ExperimentConfig,
    ExperimentId, ExperimentRecord, ExperimentStatus, Hyperparameters, NewExperiment, RunMetrics,
    RunResult, RunStatus, SystemPromptId, SystemPromptRecord,
};
pub use storage_traits::{
    CatalogStore, ExperimentStore, StorageResult, VectorDocument, VectorMatch, VectorStore,
};
pub use surreal_store::SurrealStore;
pub use surreal_vectors::SurrealVectorStore;
