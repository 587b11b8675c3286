//! llmbench-rag: retrieval-augmented context for LLM Bench
//!
//! Splits documents into overlapping windows, embeds them through an
//! [`llmbench_gateway::EmbeddingBackend`] and stores the vectors in an
//! [`llmbench_state::VectorStore`]. At run time the orchestrator queries the
//! nearest chunks and prepends them to the prompt with [`build_context`].
//!
//! ## Layer 2 - Retrieval

pub mod chunker;
pub mod error;
pub mod pipeline;

pub use chunker::{chunk, chunks, Chunk};
pub use error::RagError;
pub use pipeline::{
    build_context, collection_name, IngestReport, RagConfig, RagPipeline, RetrievedChunk,
};

/// Result type for RAG operations
pub type Result<T> = std::result::Result<T, RagError>;
