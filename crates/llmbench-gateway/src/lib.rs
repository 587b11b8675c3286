//! llmbench-gateway: model backends for LLM Bench
//!
//! Defines the [`GenerationBackend`] and [`EmbeddingBackend`] contracts the
//! orchestrator and RAG pipeline depend on, plus an [`OllamaClient`] that
//! implements both against a local Ollama server.
//!
//! ## Layer 1 - Model backends

pub mod backend;
pub mod error;
pub mod ollama;

pub use backend::{
    EmbeddingBackend, EmbeddingRequest, GenerationBackend, GenerationRequest, GenerationResponse,
};
pub use error::GatewayError;
pub use ollama::{OllamaClient, OllamaConfig, DEFAULT_OLLAMA_URL};

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
