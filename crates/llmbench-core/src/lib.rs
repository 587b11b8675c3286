//! LLM Bench Core Library
//!
//! Orchestrates experiments: expands a config into its run matrix, executes
//! runs against a generation backend, optionally with retrieved context, and
//! publishes progress to subscribers.
//!
//! ## Layer 3 - Orchestration
//!
//! ## Key Components
//!
//! - `ExecutionController`: start / pause / cancel / resume / progress
//! - `RunExecutor`: one run, from prompt resolution to persisted result
//! - `ProgressBroadcaster`: best-effort lifecycle events per experiment
//! - `generate_run_matrix`, `render_template`: pure helpers

pub mod broadcaster;
pub mod config;
pub mod controller;
pub mod error;
pub mod executor;
pub mod ingest;
pub mod matrix;
pub mod metrics;
pub mod obs;
pub mod prompt;
pub mod telemetry;
pub mod validation;

pub use broadcaster::{
    progress_topic, BroadcastTransport, ChannelTransport, Envelope, MessageType,
    ProgressBroadcaster, TopicSubscription, TransportError,
};
pub use config::BenchConfig;
pub use controller::{
    ControlMessage, ExecutionController, ExecutionHandle, ExecutionState, ProgressSnapshot,
    CANCELLED_REASON,
};
pub use error::BenchError;
pub use executor::{ExperimentContext, RunExecutor};
pub use ingest::ingest_document;
pub use matrix::{generate_run_matrix, RunSpec};
pub use metrics::METRICS;
pub use obs::{
    emit_broadcast_failed, emit_document_ingested, emit_experiment_finished,
    emit_experiment_started, emit_finalize_error, emit_run_finished, experiment_span,
};
pub use prompt::{render_template, resolve_prompt, PromptError, PASS_THROUGH_TEMPLATE};
pub use telemetry::init_tracing;
pub use validation::{matrix_size, validate_config, MAX_RUNS};

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, BenchError>;
