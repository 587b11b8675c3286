//! LLM Bench daemon
//!
//! Runs benchmark experiments against an Ollama server and stores
//! everything in SurrealDB.
//!
//! ## Commands
//!
//! - `create`: register an experiment from a JSON file
//! - `start` / `resume`: execute an experiment to a terminal state
//! - `add-document`, `register-embedding`, `ingest`: prepare RAG context
//! - `show`: print an experiment and its runs as JSON
//!
//! Ctrl-C during `start` or `resume` pauses the experiment after the run in
//! flight; `resume` picks it up again.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use llmbench_core::{
    ingest_document, init_tracing, progress_topic, BenchConfig, ChannelTransport,
    ExecutionController, MessageType, ProgressBroadcaster, RunExecutor,
};
use llmbench_gateway::{EmbeddingBackend, EmbeddingRequest, OllamaClient, OllamaConfig};
use llmbench_rag::{RagConfig, RagPipeline};
use llmbench_state::{
    DbConfig, DocumentId, ExperimentId, ExperimentStore, NewExperiment, SurrealStore,
    SurrealVectorStore,
};
use tracing::{info, warn, Level};

const DEFAULT_DB: &str = "surrealkv://.llmbench/db";

#[derive(Parser, Debug)]
#[command(name = "llmbenchd")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run LLM benchmark experiments against Ollama", long_about = None)]
struct Cli {
    /// Ollama server URL
    #[arg(long, env = "OLLAMA_HOST", default_value = llmbench_gateway::DEFAULT_OLLAMA_URL, global = true)]
    ollama_url: String,

    /// SurrealDB endpoint (mem://, surrealkv://path, ws://host:port)
    #[arg(long, env = "LLMBENCH_DB_URL", default_value = DEFAULT_DB, global = true)]
    db: String,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "LLMBENCH_LOG_LEVEL", default_value = "info", global = true)]
    log_level: Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register a new experiment from a JSON file and print its id
    Create {
        /// File holding `{ "name", "config", "task_template" }`
        file: PathBuf,
    },

    /// Start a DRAFT experiment and wait until it finishes
    Start { id: ExperimentId },

    /// Resume a PAUSED experiment and wait until it finishes
    Resume { id: ExperimentId },

    /// Store a text file as a document for RAG
    AddDocument {
        id: DocumentId,
        path: PathBuf,
    },

    /// Register an embedding model, probing its dimensions if not given
    RegisterEmbedding {
        name: String,
        #[arg(long)]
        dimensions: Option<usize>,
    },

    /// Chunk and embed a stored document
    Ingest {
        document: DocumentId,
        model: String,

        #[arg(long, default_value_t = RagConfig::default().chunk_size)]
        chunk_size: usize,

        #[arg(long, default_value_t = RagConfig::default().overlap)]
        overlap: usize,
    },

    /// Print an experiment and its runs
    Show { id: ExperimentId },
}

struct App {
    store: Arc<SurrealStore>,
    ollama: Arc<OllamaClient>,
    pipeline: RagPipeline,
    transport: ChannelTransport,
    controller: ExecutionController,
}

impl App {
    async fn connect(cli: &Cli) -> Result<Self> {
        let mut db_config = DbConfig::from_env();
        db_config.endpoint = cli.db.clone();
        let store = Arc::new(
            SurrealStore::connect(&db_config)
                .await
                .with_context(|| format!("failed to open database at {}", cli.db))?,
        );
        let vectors = Arc::new(SurrealVectorStore::new(store.db().clone()));
        let ollama = Arc::new(
            OllamaClient::new(OllamaConfig::new(&cli.ollama_url))
                .context("failed to build Ollama client")?,
        );
        let pipeline = RagPipeline::new(store.clone(), vectors, ollama.clone());

        let config = BenchConfig::from_env();
        let executor =
            RunExecutor::new(store.clone(), ollama.clone(), &config).with_rag(pipeline.clone());
        let transport = ChannelTransport::default();
        let controller = ExecutionController::new(
            store.clone(),
            store.clone(),
            executor,
            ProgressBroadcaster::new(Arc::new(transport.clone())),
            &config,
        );

        Ok(Self {
            store,
            ollama,
            pipeline,
            transport,
            controller,
        })
    }

    async fn execute(&self, id: ExperimentId, resume: bool) -> Result<()> {
        let mut subscription = self.transport.subscribe(progress_topic(id));
        let progress = tokio::spawn(async move {
            while let Some(envelope) = subscription.recv().await {
                info!(
                    experiment_id = envelope.experiment_id,
                    message_type = ?envelope.message_type,
                    payload = %envelope.payload,
                    "progress"
                );
                if matches!(
                    envelope.message_type,
                    MessageType::ExperimentCompleted
                        | MessageType::ExperimentPaused
                        | MessageType::Error
                ) {
                    break;
                }
            }
        });

        let handle = if resume {
            self.controller.resume(id).await
        } else {
            self.controller.start(id).await
        }
        .with_context(|| format!("failed to launch experiment {id}"))?;

        let wait = handle.wait();
        tokio::pin!(wait);
        let status = tokio::select! {
            status = &mut wait => status?,
            _ = tokio::signal::ctrl_c() => {
                info!(experiment_id = id, "interrupt received, pausing after the current run");
                if let Err(e) = self.controller.pause(id) {
                    warn!(experiment_id = id, error = %e, "pause request not delivered");
                }
                wait.await?
            }
        };

        if let Err(e) = progress.await {
            warn!(error = %e, "progress listener stopped");
        }
        println!("experiment {id} finished: {status}");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json, cli.log_level);

    let app = App::connect(&cli).await?;
    match cli.command {
        Commands::Create { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let new: NewExperiment = serde_json::from_str(&raw)
                .with_context(|| format!("invalid experiment definition in {}", file.display()))?;
            let record = app.store.create_experiment(new).await?;
            println!("{}", record.id);
        }

        Commands::Start { id } => app.execute(id, false).await?,

        Commands::Resume { id } => app.execute(id, true).await?,

        Commands::AddDocument { id, path } => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let filename = path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            app.store.put_document(id, &filename, &content).await?;
            println!("document {id} stored ({} chars)", content.chars().count());
        }

        Commands::RegisterEmbedding { name, dimensions } => {
            let dimensions = match dimensions {
                Some(d) => d,
                None => app
                    .ollama
                    .embed(EmbeddingRequest::new(name.as_str(), "dimension probe"))
                    .await
                    .with_context(|| format!("failed to probe embedding model {name}"))?
                    .len(),
            };
            app.store.register_embedding_model(&name, dimensions).await?;
            println!("embedding model {name} registered ({dimensions} dimensions)");
        }

        Commands::Ingest {
            document,
            model,
            chunk_size,
            overlap,
        } => {
            let report = ingest_document(
                &app.pipeline,
                document,
                &model,
                RagConfig {
                    chunk_size,
                    overlap,
                },
            )
            .await
            .with_context(|| format!("failed to ingest document {document}"))?;
            println!(
                "{} chunks stored in {}",
                report.chunk_count, report.collection
            );
        }

        Commands::Show { id } => {
            let record = app.store.load_experiment(id).await?;
            let runs = app.store.load_runs_by_experiment(id).await?;
            let out = serde_json::json!({ "experiment": record, "runs": runs });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start_with_globals() {
        let cli = Cli::try_parse_from([
            "llmbenchd",
            "--db",
            "mem://",
            "--log-level",
            "debug",
            "start",
            "12",
        ])
        .unwrap();
        assert_eq!(cli.db, "mem://");
        assert_eq!(cli.log_level, Level::DEBUG);
        assert!(matches!(cli.command, Commands::Start { id: 12 }));
    }

    #[test]
    fn test_ingest_defaults() {
        let cli = Cli::try_parse_from(["llmbenchd", "ingest", "3", "nomic-embed-text"]).unwrap();
        match cli.command {
            Commands::Ingest {
                document,
                model,
                chunk_size,
                overlap,
            } => {
                assert_eq!(document, 3);
                assert_eq!(model, "nomic-embed-text");
                assert_eq!(chunk_size, 500);
                assert_eq!(overlap, 50);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_rejects_non_numeric_id() {
        assert!(Cli::try_parse_from(["llmbenchd", "resume", "abc"]).is_err());
    }
}
