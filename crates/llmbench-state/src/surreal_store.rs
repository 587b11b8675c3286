//! SurrealDB-backed `ExperimentStore` and `CatalogStore`
//!
//! Uses the row types in `schema`, converting to/from `records` types at
//! the boundary.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::debug;

use crate::error::StorageError;
use crate::handle::{self, DbConfig};
use crate::records::*;
use crate::schema::{
    DocumentRow, EmbeddingModelRow, ExperimentRow, RunRow, SystemPromptRow,
};
use crate::storage_traits::{CatalogStore, ExperimentStore, StorageResult};

#[derive(Debug, Deserialize)]
struct CountRow {
    total: u64,
}

#[derive(Debug, Deserialize)]
struct MaxIdRow {
    experiment_id: i64,
}

/// SurrealDB-backed implementation of [`ExperimentStore`] and [`CatalogStore`].
#[derive(Clone)]
pub struct SurrealStore {
    db: Surreal<Any>,
}

impl SurrealStore {
    /// Wrap an already connected and migrated database.
    pub fn new(db: Surreal<Any>) -> Self {
        Self { db }
    }

    /// Connect using the given configuration.
    pub async fn connect(config: &DbConfig) -> StorageResult<Self> {
        Ok(Self::new(handle::connect(config).await?))
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> StorageResult<Self> {
        Self::connect(&DbConfig::default()).await
    }

    /// Underlying connection, for sharing with [`crate::SurrealVectorStore`].
    pub fn db(&self) -> &Surreal<Any> {
        &self.db
    }

    // -- catalog registration (owned by the outer CRUD layer) ---------------

    pub async fn put_document(&self, id: DocumentId, filename: &str, content: &str) -> StorageResult<()> {
        let row = DocumentRow {
            document_id: id,
            filename: filename.to_string(),
            content: content.to_string(),
            chunk_count: 0,
        };
        self.db
            .query("DELETE documents WHERE document_id = $id; CREATE documents CONTENT $row;")
            .bind(("id", id))
            .bind(("row", row))
            .await
            .and_then(|res| res.check())?;
        Ok(())
    }

    pub async fn register_embedding_model(&self, name: &str, dimensions: usize) -> StorageResult<()> {
        let row = EmbeddingModelRow {
            name: name.to_string(),
            dimensions: dimensions as u64,
        };
        self.db
            .query("DELETE embedding_models WHERE name = $name; CREATE embedding_models CONTENT $row;")
            .bind(("name", name.to_string()))
            .bind(("row", row))
            .await
            .and_then(|res| res.check())?;
        Ok(())
    }

    pub async fn put_system_prompt(&self, id: SystemPromptId, name: &str, content: &str) -> StorageResult<()> {
        let row = SystemPromptRow {
            prompt_id: id,
            name: name.to_string(),
            content: content.to_string(),
        };
        self.db
            .query("DELETE system_prompts WHERE prompt_id = $id; CREATE system_prompts CONTENT $row;")
            .bind(("id", id))
            .bind(("row", row))
            .await
            .and_then(|res| res.check())?;
        Ok(())
    }

    // -- private helpers -----------------------------------------------------

    async fn fetch_experiment(&self, id: ExperimentId) -> StorageResult<ExperimentRow> {
        let mut res = self
            .db
            .query("SELECT * OMIT id FROM experiments WHERE experiment_id = $id")
            .bind(("id", id))
            .await?;
        let rows: Vec<ExperimentRow> = res.take(0)?;
        rows.into_iter()
            .next()
            .ok_or(StorageError::ExperimentNotFound { id })
    }

    async fn run_exists(&self, run_id: &str) -> StorageResult<bool> {
        let mut res = self
            .db
            .query("SELECT count() AS total FROM runs WHERE run_id = $rid GROUP ALL")
            .bind(("rid", run_id.to_string()))
            .await?;
        let rows: Vec<CountRow> = res.take(0)?;
        Ok(rows.first().map(|r| r.total > 0).unwrap_or(false))
    }
}

#[async_trait]
impl ExperimentStore for SurrealStore {
    async fn create_experiment(&self, new: NewExperiment) -> StorageResult<ExperimentRecord> {
        let mut res = self
            .db
            .query("SELECT experiment_id FROM experiments ORDER BY experiment_id DESC LIMIT 1")
            .await?;
        let last: Vec<MaxIdRow> = res.take(0)?;
        let id = last.first().map(|r| r.experiment_id).unwrap_or(0) + 1;

        let now = Utc::now();
        let record = ExperimentRecord {
            id,
            name: new.name,
            status: ExperimentStatus::Draft,
            config: new.config,
            task_template: new.task_template,
            status_reason: None,
            created_at: now,
            updated_at: now,
        };
        let row = ExperimentRow::from_record(&record)?;

        debug!(experiment_id = id, "creating experiment");
        self.db
            .query("CREATE experiments CONTENT $row")
            .bind(("row", row))
            .await
            .and_then(|res| res.check())?;
        Ok(record)
    }

    async fn load_experiment(&self, id: ExperimentId) -> StorageResult<ExperimentRecord> {
        self.fetch_experiment(id).await?.into_record()
    }

    async fn save_experiment_status(
        &self,
        id: ExperimentId,
        status: ExperimentStatus,
        reason: Option<String>,
    ) -> StorageResult<()> {
        // Surfaces ExperimentNotFound before attempting the update
        let mut row = self.fetch_experiment(id).await?;
        row.status = status.as_str().to_string();
        row.status_reason = reason;
        row.updated_at = Utc::now();

        self.db
            .query("UPDATE experiments CONTENT $row WHERE experiment_id = $id")
            .bind(("row", row))
            .bind(("id", id))
            .await
            .and_then(|res| res.check())?;
        Ok(())
    }

    async fn save_run(&self, run: &RunResult) -> StorageResult<()> {
        let row = RunRow::from(run);
        let rid = row.run_id.clone();

        let sql = if self.run_exists(&rid).await? {
            "UPDATE runs CONTENT $row WHERE run_id = $rid"
        } else {
            "CREATE runs CONTENT $row"
        };
        self.db
            .query(sql)
            .bind(("row", row))
            .bind(("rid", rid))
            .await
            .and_then(|res| res.check())?;
        Ok(())
    }

    async fn load_runs_by_experiment(&self, id: ExperimentId) -> StorageResult<Vec<RunResult>> {
        let mut res = self
            .db
            .query(
                "SELECT * OMIT id FROM runs WHERE experiment_id = $id \
                 ORDER BY iteration ASC, created_at ASC",
            )
            .bind(("id", id))
            .await?;
        let rows: Vec<RunRow> = res.take(0)?;
        rows.into_iter().map(RunRow::into_result).collect()
    }

    async fn count_runs_by_experiment(&self, id: ExperimentId) -> StorageResult<u64> {
        let mut res = self
            .db
            .query("SELECT count() AS total FROM runs WHERE experiment_id = $id GROUP ALL")
            .bind(("id", id))
            .await?;
        let rows: Vec<CountRow> = res.take(0)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }
}

#[async_trait]
impl CatalogStore for SurrealStore {
    async fn load_document(&self, id: DocumentId) -> StorageResult<DocumentRecord> {
        let mut res = self
            .db
            .query("SELECT * OMIT id FROM documents WHERE document_id = $id")
            .bind(("id", id))
            .await?;
        let rows: Vec<DocumentRow> = res.take(0)?;
        rows.into_iter()
            .next()
            .map(DocumentRecord::from)
            .ok_or(StorageError::DocumentNotFound { id })
    }

    async fn update_document_chunk_count(&self, id: DocumentId, count: u64) -> StorageResult<()> {
        // Surfaces DocumentNotFound before attempting the update
        self.load_document(id).await?;
        self.db
            .query("UPDATE documents SET chunk_count = $count WHERE document_id = $id")
            .bind(("count", count))
            .bind(("id", id))
            .await
            .and_then(|res| res.check())?;
        Ok(())
    }

    async fn get_embedding_model(&self, name: &str) -> StorageResult<Option<EmbeddingModelRecord>> {
        let mut res = self
            .db
            .query("SELECT * OMIT id FROM embedding_models WHERE name = $name")
            .bind(("name", name.to_string()))
            .await?;
        let rows: Vec<EmbeddingModelRow> = res.take(0)?;
        Ok(rows.into_iter().next().map(EmbeddingModelRecord::from))
    }

    async fn get_system_prompt(&self, id: SystemPromptId) -> StorageResult<SystemPromptRecord> {
        let mut res = self
            .db
            .query("SELECT * OMIT id FROM system_prompts WHERE prompt_id = $id")
            .bind(("id", id))
            .await?;
        let rows: Vec<SystemPromptRow> = res.take(0)?;
        rows.into_iter()
            .next()
            .map(SystemPromptRecord::from)
            .ok_or(StorageError::SystemPromptNotFound { id })
    }
}
