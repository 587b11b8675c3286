//! Execution of a single run.
//!
//! A run's own failures (backend error, timeout, retrieval error) end up in
//! its `RunResult` as `Failed`. Only persistence errors are returned, since
//! without storage the experiment cannot make progress.

use std::sync::Arc;
use std::time::{Duration, Instant};

use llmbench_gateway::{GenerationBackend, GenerationRequest};
use llmbench_rag::{build_context, collection_name, RagPipeline};
use llmbench_state::{
    CatalogStore, ContextMode, ExperimentConfig, ExperimentId, ExperimentRecord, ExperimentStore,
    RunMetrics, RunResult,
};
use tracing::{debug, warn};

use crate::config::BenchConfig;
use crate::matrix::RunSpec;
use crate::metrics::METRICS;
use crate::obs;
use crate::prompt::{resolve_prompt, PromptError};
use crate::Result;

/// Everything a run needs to know about its experiment, resolved once
/// before the loop starts.
#[derive(Debug, Clone)]
pub struct ExperimentContext {
    pub experiment_id: ExperimentId,
    pub config: ExperimentConfig,
    pub task_template: Option<String>,
    /// Content of the configured system prompt
    pub system_prompt: Option<String>,
}

impl ExperimentContext {
    /// Build the context for `record`, loading its system prompt if one is
    /// configured.
    pub async fn load(record: &ExperimentRecord, catalog: &dyn CatalogStore) -> Result<Self> {
        let system_prompt = match record.config.system_prompt_id {
            Some(id) => Some(catalog.get_system_prompt(id).await?.content),
            None => None,
        };
        Ok(Self {
            experiment_id: record.id,
            config: record.config.clone(),
            task_template: record.task_template.clone(),
            system_prompt,
        })
    }

    /// Render the task template with the experiment's variables.
    ///
    /// Every run of an experiment renders the same prompt, so callers can
    /// check this once before any run starts.
    pub fn render_prompt(&self) -> std::result::Result<String, PromptError> {
        resolve_prompt(self.task_template.as_deref(), self.config.variables.as_ref())
    }
}

/// Executes one matrix entry against the generation backend.
#[derive(Clone)]
pub struct RunExecutor {
    store: Arc<dyn ExperimentStore>,
    backend: Arc<dyn GenerationBackend>,
    rag: Option<RagPipeline>,
    run_timeout: Duration,
    rag_top_k: usize,
}

impl RunExecutor {
    pub fn new(
        store: Arc<dyn ExperimentStore>,
        backend: Arc<dyn GenerationBackend>,
        config: &BenchConfig,
    ) -> Self {
        Self {
            store,
            backend,
            rag: None,
            run_timeout: config.run_timeout,
            rag_top_k: config.rag_top_k,
        }
    }

    /// Enable retrieval for experiments in RAG mode.
    pub fn with_rag(mut self, rag: RagPipeline) -> Self {
        self.rag = Some(rag);
        self
    }

    /// Run `spec`, persisting a `Running` record first and the terminal
    /// record last.
    ///
    /// Returns `Err` only when one of those two writes fails.
    pub async fn execute_single_run(
        &self,
        spec: &RunSpec,
        ctx: &ExperimentContext,
    ) -> Result<RunResult> {
        let run = RunResult::pending(
            ctx.experiment_id,
            spec.model.clone(),
            spec.embedding_model.clone(),
            spec.iteration,
        )
        .start();
        self.store.save_run(&run).await?;

        let started = Instant::now();
        let finished = match self.generate(spec, ctx).await {
            Ok((prompt, response)) => {
                let mut run = run.succeed(
                    response.text,
                    RunMetrics {
                        duration_ms: response.duration_ms,
                        tokens_per_second: response.tokens_per_second,
                        time_to_first_token_ms: response.time_to_first_token_ms,
                        prompt_tokens: response.prompt_tokens,
                        completion_tokens: response.completion_tokens,
                    },
                );
                run.prompt = Some(prompt);
                run
            }
            Err(failure) => {
                warn!(
                    model = %spec.model,
                    iteration = spec.iteration,
                    error = %failure.message,
                    "run failed"
                );
                METRICS.inc_runs_failed();
                let mut run = run.fail(failure.message, started.elapsed().as_millis() as u64);
                run.prompt = failure.prompt;
                run
            }
        };

        METRICS.inc_runs_executed();
        obs::emit_run_finished(
            ctx.experiment_id,
            &spec.model,
            spec.iteration,
            finished.status,
            finished.duration_ms.unwrap_or_default(),
        );

        self.store.save_run(&finished).await?;
        Ok(finished)
    }

    async fn generate(
        &self,
        spec: &RunSpec,
        ctx: &ExperimentContext,
    ) -> std::result::Result<(String, llmbench_gateway::GenerationResponse), RunFailure> {
        let mut prompt = ctx.render_prompt().map_err(|e| RunFailure {
            message: e.to_string(),
            prompt: None,
        })?;

        if ctx.config.context_mode == ContextMode::Rag {
            if let Some(embedding_model) = spec.embedding_model.as_deref() {
                let context = self
                    .retrieve_context(ctx, embedding_model, &prompt)
                    .await
                    .map_err(|message| RunFailure {
                        message,
                        prompt: Some(prompt.clone()),
                    })?;
                prompt = format!("{context}{prompt}");
            }
        }

        let mut request = GenerationRequest::new(spec.model.clone(), prompt.clone());
        request.system_prompt = ctx.system_prompt.clone();
        if let Some(hp) = &ctx.config.hyperparameters {
            request.temperature = hp.temperature;
            request.top_p = hp.top_p;
            request.top_k = hp.top_k;
            request.context_window = hp.context_window;
            request.max_tokens = hp.max_tokens;
        }

        debug!(model = %spec.model, iteration = spec.iteration, "invoking backend");
        let outcome = tokio::time::timeout(self.run_timeout, self.backend.generate(request)).await;
        match outcome {
            Ok(Ok(response)) => Ok((prompt, response)),
            Ok(Err(e)) => Err(RunFailure {
                message: e.to_string(),
                prompt: Some(prompt),
            }),
            Err(_) => Err(RunFailure {
                message: format!(
                    "generation timed out after {} ms",
                    self.run_timeout.as_millis()
                ),
                prompt: Some(prompt),
            }),
        }
    }

    async fn retrieve_context(
        &self,
        ctx: &ExperimentContext,
        embedding_model: &str,
        query: &str,
    ) -> std::result::Result<String, String> {
        let rag = self
            .rag
            .as_ref()
            .ok_or_else(|| "retrieval is not configured".to_string())?;
        let document_id = ctx
            .config
            .document_id
            .ok_or_else(|| "no document configured for retrieval".to_string())?;

        let collection = collection_name(document_id, embedding_model);
        let chunks = rag
            .query(&collection, query, embedding_model, self.rag_top_k)
            .await
            .map_err(|e| format!("retrieval failed: {e}"))?;
        Ok(build_context(&chunks))
    }
}

struct RunFailure {
    message: String,
    prompt: Option<String>,
}
