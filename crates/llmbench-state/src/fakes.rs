//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryExperimentStore`, `MemoryCatalog`, and `MemoryVectorStore`
//! that satisfy the trait contracts without any external dependencies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::records::*;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryExperimentStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ExperimentTables {
    next_id: ExperimentId,
    experiments: HashMap<ExperimentId, ExperimentRecord>,
    status_history: HashMap<ExperimentId, Vec<ExperimentStatus>>,
    /// Runs in insertion order
    runs: Vec<RunResult>,
}

/// In-memory experiment store.
///
/// Also records every status write per experiment so tests can assert on
/// the full transition sequence, and can be told to reject run writes to
/// simulate a storage outage.
#[derive(Debug, Default)]
pub struct MemoryExperimentStore {
    tables: Mutex<ExperimentTables>,
    fail_run_writes: AtomicBool,
}

impl MemoryExperimentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every status persisted for `id`, oldest first.
    pub fn status_history(&self, id: ExperimentId) -> Vec<ExperimentStatus> {
        let tables = self.tables.lock().unwrap();
        tables.status_history.get(&id).cloned().unwrap_or_default()
    }

    /// Make subsequent `save_run` calls fail with a backend error.
    pub fn set_fail_run_writes(&self, fail: bool) {
        self.fail_run_writes.store(fail, Ordering::SeqCst);
    }

    /// Insert an already-materialized run, bypassing failure injection.
    pub fn seed_run(&self, run: RunResult) {
        let mut tables = self.tables.lock().unwrap();
        tables.runs.push(run);
    }
}

#[async_trait]
impl ExperimentStore for MemoryExperimentStore {
    async fn create_experiment(&self, new: NewExperiment) -> StorageResult<ExperimentRecord> {
        let mut tables = self.tables.lock().unwrap();
        tables.next_id += 1;
        let now = Utc::now();
        let record = ExperimentRecord {
            id: tables.next_id,
            name: new.name,
            status: ExperimentStatus::Draft,
            config: new.config,
            task_template: new.task_template,
            status_reason: None,
            created_at: now,
            updated_at: now,
        };
        tables.experiments.insert(record.id, record.clone());
        Ok(record)
    }

    async fn load_experiment(&self, id: ExperimentId) -> StorageResult<ExperimentRecord> {
        let tables = self.tables.lock().unwrap();
        tables
            .experiments
            .get(&id)
            .cloned()
            .ok_or(StorageError::ExperimentNotFound { id })
    }

    async fn save_experiment_status(
        &self,
        id: ExperimentId,
        status: ExperimentStatus,
        reason: Option<String>,
    ) -> StorageResult<()> {
        let mut tables = self.tables.lock().unwrap();
        let record = tables
            .experiments
            .get_mut(&id)
            .ok_or(StorageError::ExperimentNotFound { id })?;
        record.status = status;
        record.status_reason = reason;
        record.updated_at = Utc::now();
        tables.status_history.entry(id).or_default().push(status);
        Ok(())
    }

    async fn save_run(&self, run: &RunResult) -> StorageResult<()> {
        if self.fail_run_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("run writes disabled".to_string()));
        }
        let mut tables = self.tables.lock().unwrap();
        match tables.runs.iter_mut().find(|r| r.run_id == run.run_id) {
            Some(existing) => *existing = run.clone(),
            None => tables.runs.push(run.clone()),
        }
        Ok(())
    }

    async fn load_runs_by_experiment(&self, id: ExperimentId) -> StorageResult<Vec<RunResult>> {
        let tables = self.tables.lock().unwrap();
        let mut runs: Vec<RunResult> = tables
            .runs
            .iter()
            .filter(|r| r.experiment_id == id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order within one iteration
        runs.sort_by_key(|r| r.iteration);
        Ok(runs)
    }

    async fn count_runs_by_experiment(&self, id: ExperimentId) -> StorageResult<u64> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.runs.iter().filter(|r| r.experiment_id == id).count() as u64)
    }
}

// ---------------------------------------------------------------------------
// MemoryCatalog
// ---------------------------------------------------------------------------

/// In-memory catalog of documents, embedding models and system prompts.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    documents: Mutex<HashMap<DocumentId, DocumentRecord>>,
    embedding_models: Mutex<HashMap<String, EmbeddingModelRecord>>,
    system_prompts: Mutex<HashMap<SystemPromptId, SystemPromptRecord>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_document(&self, id: DocumentId, filename: &str, content: &str) {
        self.documents.lock().unwrap().insert(
            id,
            DocumentRecord {
                id,
                filename: filename.to_string(),
                content: content.to_string(),
                chunk_count: 0,
            },
        );
    }

    pub fn register_embedding_model(&self, name: &str, dimensions: usize) {
        self.embedding_models.lock().unwrap().insert(
            name.to_string(),
            EmbeddingModelRecord {
                name: name.to_string(),
                dimensions,
            },
        );
    }

    pub fn put_system_prompt(&self, id: SystemPromptId, name: &str, content: &str) {
        self.system_prompts.lock().unwrap().insert(
            id,
            SystemPromptRecord {
                id,
                name: name.to_string(),
                content: content.to_string(),
            },
        );
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn load_document(&self, id: DocumentId) -> StorageResult<DocumentRecord> {
        self.documents
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(StorageError::DocumentNotFound { id })
    }

    async fn update_document_chunk_count(&self, id: DocumentId, count: u64) -> StorageResult<()> {
        let mut documents = self.documents.lock().unwrap();
        let doc = documents
            .get_mut(&id)
            .ok_or(StorageError::DocumentNotFound { id })?;
        doc.chunk_count = count;
        Ok(())
    }

    async fn get_embedding_model(&self, name: &str) -> StorageResult<Option<EmbeddingModelRecord>> {
        Ok(self.embedding_models.lock().unwrap().get(name).cloned())
    }

    async fn get_system_prompt(&self, id: SystemPromptId) -> StorageResult<SystemPromptRecord> {
        self.system_prompts
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(StorageError::SystemPromptNotFound { id })
    }
}

// ---------------------------------------------------------------------------
// MemoryVectorStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Collection {
    dimensions: usize,
    documents: Vec<VectorDocument>,
}

/// In-memory vector store using brute-force Euclidean distance.
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    collections: Mutex<HashMap<String, Collection>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection (0 if absent).
    pub fn document_count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .map(|c| c.documents.len())
            .unwrap_or(0)
    }

    /// Stored documents of a collection, in insertion order.
    pub fn documents(&self, collection: &str) -> Vec<VectorDocument> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .map(|c| c.documents.clone())
            .unwrap_or_default()
    }
}

/// Euclidean distance between two equally sized vectors.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn collection_exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self.collections.lock().unwrap().contains_key(name))
    }

    async fn create_collection(&self, name: &str, dimensions: usize) -> StorageResult<()> {
        self.collections
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_insert_with(|| Collection {
                dimensions,
                documents: Vec::new(),
            });
        Ok(())
    }

    async fn add_documents(
        &self,
        collection: &str,
        documents: Vec<VectorDocument>,
    ) -> StorageResult<()> {
        let mut collections = self.collections.lock().unwrap();
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| StorageError::CollectionNotFound {
                name: collection.to_string(),
            })?;
        if let Some(bad) = documents
            .iter()
            .find(|d| d.embedding.len() != target.dimensions)
        {
            return Err(StorageError::DimensionMismatch {
                collection: collection.to_string(),
                expected: target.dimensions,
                actual: bad.embedding.len(),
            });
        }
        target.documents.extend(documents);
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> StorageResult<Vec<VectorMatch>> {
        let collections = self.collections.lock().unwrap();
        let target = collections
            .get(collection)
            .ok_or_else(|| StorageError::CollectionNotFound {
                name: collection.to_string(),
            })?;
        let mut matches: Vec<VectorMatch> = target
            .documents
            .iter()
            .map(|d| VectorMatch {
                content: d.content.clone(),
                distance: euclidean_distance(&d.embedding, embedding),
                metadata: d.metadata.clone(),
            })
            .collect();
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        matches.truncate(top_k);
        Ok(matches)
    }
}
