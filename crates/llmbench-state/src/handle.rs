//! SurrealDB connection setup
//!
//! Supports in-memory (`mem://`), embedded file (`surrealkv://path`) and
//! remote (`ws://` / `wss://`) endpoints through the `any` engine.

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;
use tracing::info;

use crate::error::StorageError;
use crate::migrations;
use crate::storage_traits::StorageResult;

/// Default endpoint when nothing is configured.
pub const DEFAULT_ENDPOINT: &str = "mem://";

/// Configuration for a SurrealDB connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Endpoint URL (e.g. "mem://", "surrealkv://.llmbench/db", "ws://localhost:8000")
    pub endpoint: String,
    /// Namespace (default: "llmbench")
    pub namespace: String,
    /// Database name (default: "main")
    pub database: String,
    /// Root credentials for remote servers
    pub credentials: Option<(String, String)>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

impl DbConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            namespace: "llmbench".to_string(),
            database: "main".to_string(),
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - LLMBENCH_DB_URL (optional, default: "mem://")
    /// - LLMBENCH_DB_NAMESPACE (optional, default: "llmbench")
    /// - LLMBENCH_DB_DATABASE (optional, default: "main")
    /// - LLMBENCH_DB_USERNAME / LLMBENCH_DB_PASSWORD (optional, root signin)
    pub fn from_env() -> Self {
        let mut config =
            Self::new(std::env::var("LLMBENCH_DB_URL").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()));
        if let Ok(ns) = std::env::var("LLMBENCH_DB_NAMESPACE") {
            config.namespace = ns;
        }
        if let Ok(db) = std::env::var("LLMBENCH_DB_DATABASE") {
            config.database = db;
        }
        if let (Ok(user), Ok(pass)) = (
            std::env::var("LLMBENCH_DB_USERNAME"),
            std::env::var("LLMBENCH_DB_PASSWORD"),
        ) {
            config.credentials = Some((user, pass));
        }
        config
    }
}

/// Connect, authenticate if credentials are set, select namespace/database
/// and run schema initialization.
pub async fn connect(config: &DbConfig) -> StorageResult<Surreal<Any>> {
    let db = surrealdb::engine::any::connect(config.endpoint.as_str())
        .await
        .map_err(|e| StorageError::Connection(format!("{}: {e}", config.endpoint)))?;

    if let Some((username, password)) = &config.credentials {
        db.signin(Root {
            username: username.as_str(),
            password: password.as_str(),
        })
        .await
        .map_err(|e| StorageError::Connection(format!("Root auth failed: {e}")))?;
    }

    db.use_ns(config.namespace.as_str())
        .use_db(config.database.as_str())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

    migrations::init_schema(&db).await?;
    info!(endpoint = %config.endpoint, "SurrealDB connected");
    Ok(db)
}
