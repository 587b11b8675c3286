//! Orchestrator settings.

use std::time::Duration;

use tracing::warn;

pub const DEFAULT_MAX_CONCURRENT_EXPERIMENTS: usize = 4;
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_RAG_TOP_K: usize = 5;

/// Settings shared by every experiment the controller executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    /// Experiments allowed to execute at the same time. Runs within one
    /// experiment are always sequential.
    pub max_concurrent_experiments: usize,
    /// Upper bound on a single generation call.
    pub run_timeout: Duration,
    /// Chunks retrieved per run in RAG mode.
    pub rag_top_k: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_experiments: DEFAULT_MAX_CONCURRENT_EXPERIMENTS,
            run_timeout: DEFAULT_RUN_TIMEOUT,
            rag_top_k: DEFAULT_RAG_TOP_K,
        }
    }
}

impl BenchConfig {
    /// Create from environment variables
    ///
    /// Reads:
    /// - LLMBENCH_MAX_CONCURRENT (optional, default: 4)
    /// - LLMBENCH_RUN_TIMEOUT_SECS (optional, default: 600)
    /// - LLMBENCH_RAG_TOP_K (optional, default: 5)
    ///
    /// Unparseable or zero values are logged and replaced by the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_experiments: env_positive("LLMBENCH_MAX_CONCURRENT")
                .unwrap_or(defaults.max_concurrent_experiments),
            run_timeout: env_positive("LLMBENCH_RUN_TIMEOUT_SECS")
                .map(|secs| Duration::from_secs(secs as u64))
                .unwrap_or(defaults.run_timeout),
            rag_top_k: env_positive("LLMBENCH_RAG_TOP_K").unwrap_or(defaults.rag_top_k),
        }
    }

    pub fn with_max_concurrent_experiments(mut self, n: usize) -> Self {
        self.max_concurrent_experiments = n.max(1);
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn with_rag_top_k(mut self, top_k: usize) -> Self {
        self.rag_top_k = top_k.max(1);
        self
    }
}

fn env_positive(key: &str) -> Option<usize> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(0) | Err(_) => {
            warn!(key, value = %raw, "ignoring invalid setting");
            None
        }
        Ok(n) => Some(n),
    }
}
