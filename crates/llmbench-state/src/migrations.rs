//! SurrealDB schema migrations and initialization
//!
//! Sets up every table with its indexes. Safe to call on every connection.

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::storage_traits::StorageResult;

/// Initialize all LLM Bench tables in SurrealDB
///
/// Idempotent: `DEFINE ... IF NOT EXISTS` leaves existing definitions alone.
pub async fn init_schema(db: &Surreal<Any>) -> StorageResult<()> {
    info!("Initializing LLM Bench SurrealDB schema");

    init_experiments_table(db).await?;
    init_runs_table(db).await?;
    init_catalog_tables(db).await?;
    init_vector_tables(db).await?;

    info!("LLM Bench schema initialization complete");
    Ok(())
}

async fn run_definitions(db: &Surreal<Any>, table: &str, sql: &str) -> StorageResult<()> {
    debug!(table, "Initializing table");
    db.query(sql)
        .await
        .and_then(|res| res.check())
        .map_err(|e| StorageError::SchemaSetup(format!("{table}: {e}")))?;
    Ok(())
}

/// Initialize `experiments` table
///
/// Schema:
/// ```text
/// TABLE experiments {
///   experiment_id:  INT (unique)
///   name:           STRING
///   status:         STRING (DRAFT | RUNNING | PAUSED | COMPLETED | FAILED)
///   config:         STRING (JSON-encoded ExperimentConfig)
///   task_template:  STRING?
///   status_reason:  STRING?
///   created_at:     DATETIME
///   updated_at:     DATETIME
/// }
/// ```
async fn init_experiments_table(db: &Surreal<Any>) -> StorageResult<()> {
    let sql = r#"
        DEFINE TABLE IF NOT EXISTS experiments SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_experiment_id ON TABLE experiments COLUMNS experiment_id UNIQUE;
    "#;
    run_definitions(db, "experiments", sql).await
}

/// Initialize `runs` table
///
/// Schema:
/// ```text
/// TABLE runs {
///   run_id:         STRING (unique, UUID)
///   experiment_id:  INT (indexed)
///   model:          STRING
///   embedding_model STRING?
///   iteration:      INT
///   status:         STRING (PENDING | RUNNING | SUCCESS | FAILED)
///   ...metrics, output, error_message
///   created_at:     DATETIME
///   completed_at:   DATETIME?
/// }
/// ```
async fn init_runs_table(db: &Surreal<Any>) -> StorageResult<()> {
    let sql = r#"
        DEFINE TABLE IF NOT EXISTS runs SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_run_id ON TABLE runs COLUMNS run_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_run_experiment ON TABLE runs COLUMNS experiment_id;
    "#;
    run_definitions(db, "runs", sql).await
}

/// Initialize `documents`, `embedding_models` and `system_prompts`
async fn init_catalog_tables(db: &Surreal<Any>) -> StorageResult<()> {
    let sql = r#"
        DEFINE TABLE IF NOT EXISTS documents SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_document_id ON TABLE documents COLUMNS document_id UNIQUE;

        DEFINE TABLE IF NOT EXISTS embedding_models SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_embedding_model_name ON TABLE embedding_models COLUMNS name UNIQUE;

        DEFINE TABLE IF NOT EXISTS system_prompts SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_prompt_id ON TABLE system_prompts COLUMNS prompt_id UNIQUE;
    "#;
    run_definitions(db, "catalog", sql).await
}

/// Initialize `collections` and `chunk_vectors`
///
/// Schema:
/// ```text
/// TABLE collections   { name: STRING (unique), dimensions: INT }
/// TABLE chunk_vectors { collection: STRING (indexed), doc_id: STRING,
///                       content: STRING, embedding: ARRAY<FLOAT>,
///                       metadata: OBJECT }
/// ```
async fn init_vector_tables(db: &Surreal<Any>) -> StorageResult<()> {
    let sql = r#"
        DEFINE TABLE IF NOT EXISTS collections SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_collection_name ON TABLE collections COLUMNS name UNIQUE;

        DEFINE TABLE IF NOT EXISTS chunk_vectors SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_chunk_collection ON TABLE chunk_vectors COLUMNS collection;
    "#;
    run_definitions(db, "vectors", sql).await
}
