//! SurrealDB row types
//!
//! Rows mirror the `records` types with primitive field types so they
//! round-trip through SurrealDB unchanged. Conversions live here so the
//! store implementations only deal with whole rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageError;
use crate::records::{
    DocumentRecord, EmbeddingModelRecord, ExperimentConfig, ExperimentRecord, ExperimentStatus,
    RunResult, RunStatus, SystemPromptRecord,
};
use crate::storage_traits::StorageResult;

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Module for serializing optional chrono DateTime to SurrealDB datetime format
mod surreal_datetime_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => {
                let sd = SurrealDatetime::from(*d);
                serde::Serialize::serialize(&Some(sd), serializer)
            }
            None => serde::Serialize::serialize(&None::<SurrealDatetime>, serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = Option::<SurrealDatetime>::deserialize(deserializer)?;
        Ok(sd.map(DateTime::from))
    }
}

// ---------------------------------------------------------------------------
// experiments
// ---------------------------------------------------------------------------

/// Row in the `experiments` table.
///
/// The config is stored as a JSON string so optional fields survive the
/// round trip exactly as the caller wrote them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentRow {
    pub experiment_id: i64,
    pub name: String,
    pub status: String,
    pub config: String,
    #[serde(default)]
    pub task_template: Option<String>,
    #[serde(default)]
    pub status_reason: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl ExperimentRow {
    pub fn from_record(record: &ExperimentRecord) -> StorageResult<Self> {
        Ok(Self {
            experiment_id: record.id,
            name: record.name.clone(),
            status: record.status.as_str().to_string(),
            config: serde_json::to_string(&record.config)?,
            task_template: record.task_template.clone(),
            status_reason: record.status_reason.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    pub fn into_record(self) -> StorageResult<ExperimentRecord> {
        let status = ExperimentStatus::parse(&self.status).ok_or_else(|| {
            StorageError::Backend(format!("unknown experiment status: {}", self.status))
        })?;
        let config: ExperimentConfig = serde_json::from_str(&self.config)?;
        Ok(ExperimentRecord {
            id: self.experiment_id,
            name: self.name,
            status,
            config,
            task_template: self.task_template,
            status_reason: self.status_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// ---------------------------------------------------------------------------
// runs
// ---------------------------------------------------------------------------

/// Row in the `runs` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRow {
    pub run_id: String,
    pub experiment_id: i64,
    pub model: String,
    #[serde(default)]
    pub embedding_model: Option<String>,
    pub iteration: u32,
    /// "PENDING" | "RUNNING" | "SUCCESS" | "FAILED"
    pub status: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub tokens_per_second: Option<f64>,
    #[serde(default)]
    pub time_to_first_token_ms: Option<u64>,
    #[serde(default)]
    pub prompt_tokens: Option<u32>,
    #[serde(default)]
    pub completion_tokens: Option<u32>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "surreal_datetime_opt")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&RunResult> for RunRow {
    fn from(run: &RunResult) -> Self {
        Self {
            run_id: run.run_id.to_string(),
            experiment_id: run.experiment_id,
            model: run.model.clone(),
            embedding_model: run.embedding_model.clone(),
            iteration: run.iteration,
            status: run.status.as_str().to_string(),
            prompt: run.prompt.clone(),
            output: run.output.clone(),
            duration_ms: run.duration_ms,
            tokens_per_second: run.tokens_per_second,
            time_to_first_token_ms: run.time_to_first_token_ms,
            prompt_tokens: run.prompt_tokens,
            completion_tokens: run.completion_tokens,
            error_message: run.error_message.clone(),
            created_at: run.created_at,
            completed_at: run.completed_at,
        }
    }
}

impl RunRow {
    pub fn into_result(self) -> StorageResult<RunResult> {
        let status = RunStatus::parse(&self.status)
            .ok_or_else(|| StorageError::Backend(format!("unknown run status: {}", self.status)))?;
        let run_id = Uuid::parse_str(&self.run_id)
            .map_err(|e| StorageError::Backend(format!("invalid run id {}: {e}", self.run_id)))?;
        Ok(RunResult {
            run_id,
            experiment_id: self.experiment_id,
            model: self.model,
            embedding_model: self.embedding_model,
            iteration: self.iteration,
            status,
            prompt: self.prompt,
            output: self.output,
            duration_ms: self.duration_ms,
            tokens_per_second: self.tokens_per_second,
            time_to_first_token_ms: self.time_to_first_token_ms,
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            error_message: self.error_message,
            created_at: self.created_at,
            completed_at: self.completed_at,
        })
    }
}

// ---------------------------------------------------------------------------
// catalog
// ---------------------------------------------------------------------------

/// Row in the `documents` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRow {
    pub document_id: i64,
    pub filename: String,
    pub content: String,
    #[serde(default)]
    pub chunk_count: u64,
}

impl From<DocumentRow> for DocumentRecord {
    fn from(row: DocumentRow) -> Self {
        DocumentRecord {
            id: row.document_id,
            filename: row.filename,
            content: row.content,
            chunk_count: row.chunk_count,
        }
    }
}

/// Row in the `embedding_models` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingModelRow {
    pub name: String,
    pub dimensions: u64,
}

impl From<EmbeddingModelRow> for EmbeddingModelRecord {
    fn from(row: EmbeddingModelRow) -> Self {
        EmbeddingModelRecord {
            name: row.name,
            dimensions: row.dimensions as usize,
        }
    }
}

/// Row in the `system_prompts` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemPromptRow {
    pub prompt_id: i64,
    pub name: String,
    pub content: String,
}

impl From<SystemPromptRow> for SystemPromptRecord {
    fn from(row: SystemPromptRow) -> Self {
        SystemPromptRecord {
            id: row.prompt_id,
            name: row.name,
            content: row.content,
        }
    }
}

// ---------------------------------------------------------------------------
// vectors
// ---------------------------------------------------------------------------

/// Row in the `collections` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionRow {
    pub name: String,
    pub dimensions: u64,
}

/// Row in the `chunk_vectors` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkVectorRow {
    pub collection: String,
    pub doc_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: serde_json::Value,
}

/// Projection returned by similarity queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMatchRow {
    pub content: String,
    pub distance: f64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}
