//! Ollama HTTP client
//!
//! Talks to a local Ollama server over its REST API:
//! `POST /api/generate` (non-streaming) for completions and
//! `POST /api/embed` for embeddings.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::{
    EmbeddingBackend, EmbeddingRequest, GenerationBackend, GenerationRequest, GenerationResponse,
};
use crate::error::GatewayError;
use crate::Result;

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Ollama connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Server base URL
    pub base_url: String,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        OllamaConfig {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            request_timeout: Duration::from_secs(900),
        }
    }
}

impl OllamaConfig {
    /// Create a config for a specific server
    pub fn new(base_url: &str) -> Self {
        OllamaConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            ..Default::default()
        }
    }

    /// Create from environment variables
    ///
    /// Reads `OLLAMA_HOST` (default: "http://localhost:11434").
    pub fn from_env() -> Self {
        match std::env::var("OLLAMA_HOST") {
            Ok(url) if !url.trim().is_empty() => Self::new(url.trim()),
            _ => Self::default(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Client for a single Ollama server
#[derive(Clone)]
pub struct OllamaClient {
    config: OllamaConfig,
    http_client: Client,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent(concat!("llmbench/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::ClientSetup(e.to_string()))?;

        Ok(OllamaClient {
            config,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(OllamaConfig::from_env())
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        model: &str,
        body: &B,
    ) -> Result<R> {
        let url = format!("{}{}", self.config.base_url, path);
        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(classify_error(status, model, &text));
        }

        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(&url, e))?;
        Ok(serde_json::from_str(&text)?)
    }

    fn transport_error(&self, url: &str, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout(self.config.request_timeout.as_millis() as u64)
        } else {
            GatewayError::Connection {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    #[serde(skip_serializing_if = "GenerateOptions::is_empty")]
    options: GenerateOptions,
}

#[derive(Debug, Default, Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_ctx: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

impl GenerateOptions {
    fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.top_p.is_none()
            && self.top_k.is_none()
            && self.num_ctx.is_none()
            && self.num_predict.is_none()
    }
}

impl<'a> GenerateBody<'a> {
    fn from_request(req: &'a GenerationRequest) -> Self {
        GenerateBody {
            model: &req.model,
            prompt: &req.prompt,
            system: req.system_prompt.as_deref(),
            stream: false,
            options: GenerateOptions {
                temperature: req.temperature,
                top_p: req.top_p,
                top_k: req.top_k,
                num_ctx: req.context_window,
                num_predict: req.max_tokens,
            },
        }
    }
}

/// Durations are reported in nanoseconds.
#[derive(Debug, Default, Deserialize)]
struct GenerateReply {
    #[serde(default)]
    response: String,
    #[serde(default)]
    load_duration: u64,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    prompt_eval_duration: u64,
    #[serde(default)]
    eval_count: u32,
    #[serde(default)]
    eval_duration: u64,
}

impl GenerateReply {
    fn into_response(self, wall_ms: u64) -> GenerationResponse {
        let tokens_per_second = if self.eval_duration > 0 {
            self.eval_count as f64 / (self.eval_duration as f64 / 1e9)
        } else {
            0.0
        };
        GenerationResponse {
            text: self.response,
            duration_ms: wall_ms,
            tokens_per_second,
            time_to_first_token_ms: (self.load_duration + self.prompt_eval_duration) / 1_000_000,
            prompt_tokens: self.prompt_eval_count,
            completion_tokens: self.eval_count,
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbedBody<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedReply {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct ErrorReply {
    error: String,
}

fn classify_error(status: StatusCode, model: &str, body: &str) -> GatewayError {
    let message = serde_json::from_str::<ErrorReply>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.to_string());

    if status == StatusCode::NOT_FOUND || message.contains("not found") {
        GatewayError::ModelNotFound(model.to_string())
    } else {
        GatewayError::Http {
            status: status.as_u16(),
            message,
        }
    }
}

// ---------------------------------------------------------------------------
// Backend impls
// ---------------------------------------------------------------------------

#[async_trait]
impl GenerationBackend for OllamaClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse> {
        debug!(model = %request.model, prompt_len = request.prompt.len(), "ollama generate");
        let started = Instant::now();
        let reply: GenerateReply = self
            .post("/api/generate", &request.model, &GenerateBody::from_request(&request))
            .await?;
        Ok(reply.into_response(started.elapsed().as_millis() as u64))
    }
}

#[async_trait]
impl EmbeddingBackend for OllamaClient {
    async fn embed(&self, request: EmbeddingRequest) -> Result<Vec<f32>> {
        let body = EmbedBody {
            model: &request.model,
            input: &request.input,
        };
        let reply: EmbedReply = self.post("/api/embed", &request.model, &body).await?;
        reply.embeddings.into_iter().next().ok_or_else(|| {
            warn!(model = %request.model, "ollama returned no embeddings");
            GatewayError::InvalidResponse("empty embeddings array".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_trims_trailing_slash() {
        let config = OllamaConfig::new("http://gpu-box:11434/");
        assert_eq!(config.base_url, "http://gpu-box:11434");
    }

    #[test]
    fn test_generate_body_maps_hyperparameters() {
        let mut req = GenerationRequest::new("llama3:8b", "hello").with_system_prompt("terse");
        req.temperature = Some(0.2);
        req.context_window = Some(4096);
        req.max_tokens = Some(128);

        let json = serde_json::to_value(GenerateBody::from_request(&req)).unwrap();
        assert_eq!(json["model"], "llama3:8b");
        assert_eq!(json["system"], "terse");
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_ctx"], 4096);
        assert_eq!(json["options"]["num_predict"], 128);
        assert!(json["options"].get("top_k").is_none());
    }

    #[test]
    fn test_generate_body_skips_empty_options() {
        let req = GenerationRequest::new("m", "p");
        let json = serde_json::to_value(GenerateBody::from_request(&req)).unwrap();
        assert!(json.get("options").is_none());
        assert!(json.get("system").is_none());
    }

    #[test]
    fn test_reply_metrics() {
        let reply: GenerateReply = serde_json::from_str(
            r#"{
                "model": "llama3:8b",
                "response": "Ownership means...",
                "done": true,
                "total_duration": 5000000000,
                "load_duration": 200000000,
                "prompt_eval_count": 12,
                "prompt_eval_duration": 50000000,
                "eval_count": 100,
                "eval_duration": 4000000000
            }"#,
        )
        .unwrap();

        let resp = reply.into_response(5100);
        assert_eq!(resp.text, "Ownership means...");
        assert_eq!(resp.duration_ms, 5100);
        assert_eq!(resp.time_to_first_token_ms, 250);
        assert_eq!(resp.prompt_tokens, 12);
        assert_eq!(resp.completion_tokens, 100);
        assert!((resp.tokens_per_second - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_reply_without_eval_duration_has_zero_tps() {
        let reply: GenerateReply = serde_json::from_str(r#"{"response": "x"}"#).unwrap();
        let resp = reply.into_response(3);
        assert_eq!(resp.tokens_per_second, 0.0);
        assert_eq!(resp.time_to_first_token_ms, 0);
    }

    #[test]
    fn test_classify_model_not_found() {
        let err = classify_error(
            StatusCode::NOT_FOUND,
            "ghost:1b",
            r#"{"error":"model 'ghost:1b' not found, try pulling it first"}"#,
        );
        assert!(matches!(err, GatewayError::ModelNotFound(m) if m == "ghost:1b"));
    }

    #[test]
    fn test_classify_other_http_error() {
        let err = classify_error(StatusCode::INTERNAL_SERVER_ERROR, "m", "boom");
        match err {
            GatewayError::Http { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_embed_reply_parses() {
        let reply: EmbedReply =
            serde_json::from_str(r#"{"model":"nomic","embeddings":[[0.1,0.2,0.3]]}"#).unwrap();
        assert_eq!(reply.embeddings[0], vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connection_error() {
        // Port 9 (discard) is essentially never bound locally
        let client = OllamaClient::new(
            OllamaConfig::new("http://127.0.0.1:9").with_request_timeout(Duration::from_secs(2)),
        )
        .unwrap();
        let err = client
            .generate(GenerationRequest::new("m", "p"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Connection { .. } | GatewayError::Timeout(_)
        ));
    }
}
