//! Error types for llmbench-gateway

use thiserror::Error;

/// Errors that can occur while talking to a model backend
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Backend could not be reached
    #[error("Backend unreachable at {url}: {message}")]
    Connection { url: String, message: String },

    /// Requested model is not installed on the backend
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Backend answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Backend answered but the body could not be understood
    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),

    /// Request did not complete in time
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// HTTP client could not be constructed
    #[error("HTTP client setup failed: {0}")]
    ClientSetup(String),
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::InvalidResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = GatewayError::Connection {
            url: "http://localhost:11434".into(),
            message: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "Backend unreachable at http://localhost:11434: connection refused"
        );
        assert_eq!(
            GatewayError::ModelNotFound("llama3:8b".into()).to_string(),
            "Model not found: llama3:8b"
        );
    }

    #[test]
    fn test_json_error_maps_to_invalid_response() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(
            GatewayError::from(json_err),
            GatewayError::InvalidResponse(_)
        ));
    }
}
