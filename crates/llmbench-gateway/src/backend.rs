//! Backend contracts for text generation and embeddings.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A single generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model identifier, e.g. "llama3:8b".
    pub model: String,
    /// Fully assembled user prompt.
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    /// Create a request with no sampling overrides.
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            system_prompt: None,
            temperature: None,
            top_p: None,
            top_k: None,
            context_window: None,
            max_tokens: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

/// Outcome of a successful generation, with timing metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub text: String,
    /// Wall-clock time of the request.
    pub duration_ms: u64,
    pub tokens_per_second: f64,
    pub time_to_first_token_ms: u64,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A single embedding request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: String,
}

impl EmbeddingRequest {
    pub fn new(model: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            input: input.into(),
        }
    }
}

/// Anything that can turn a prompt into generated text.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Run one generation to completion.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse>;
}

/// Anything that can turn text into a vector.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a single input string.
    async fn embed(&self, request: EmbeddingRequest) -> Result<Vec<f32>>;
}
