//! SurrealDB-backed `VectorStore`
//!
//! Collections are rows in `collections`; chunks live in `chunk_vectors`
//! tagged with their collection name. Similarity is brute-force Euclidean
//! distance computed by `vector::distance::euclidean`, matching the
//! in-memory fake.

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::debug;

use crate::error::StorageError;
use crate::schema::{ChunkMatchRow, ChunkVectorRow, CollectionRow};
use crate::storage_traits::{StorageResult, VectorDocument, VectorMatch, VectorStore};

/// SurrealDB-backed implementation of [`VectorStore`].
#[derive(Clone)]
pub struct SurrealVectorStore {
    db: Surreal<Any>,
}

impl SurrealVectorStore {
    /// Wrap an already connected and migrated database.
    pub fn new(db: Surreal<Any>) -> Self {
        Self { db }
    }

    async fn fetch_collection(&self, name: &str) -> StorageResult<Option<CollectionRow>> {
        let mut res = self
            .db
            .query("SELECT * OMIT id FROM collections WHERE name = $name")
            .bind(("name", name.to_string()))
            .await?;
        let rows: Vec<CollectionRow> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    async fn require_collection(&self, name: &str) -> StorageResult<CollectionRow> {
        self.fetch_collection(name)
            .await?
            .ok_or_else(|| StorageError::CollectionNotFound {
                name: name.to_string(),
            })
    }
}

#[async_trait]
impl VectorStore for SurrealVectorStore {
    async fn collection_exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self.fetch_collection(name).await?.is_some())
    }

    async fn create_collection(&self, name: &str, dimensions: usize) -> StorageResult<()> {
        if self.collection_exists(name).await? {
            return Ok(());
        }
        let row = CollectionRow {
            name: name.to_string(),
            dimensions: dimensions as u64,
        };
        debug!(collection = %name, dimensions, "creating collection");
        self.db
            .query("CREATE collections CONTENT $row")
            .bind(("row", row))
            .await
            .and_then(|res| res.check())?;
        Ok(())
    }

    async fn add_documents(
        &self,
        collection: &str,
        documents: Vec<VectorDocument>,
    ) -> StorageResult<()> {
        let target = self.require_collection(collection).await?;
        let expected = target.dimensions as usize;
        if let Some(bad) = documents.iter().find(|d| d.embedding.len() != expected) {
            return Err(StorageError::DimensionMismatch {
                collection: collection.to_string(),
                expected,
                actual: bad.embedding.len(),
            });
        }

        let rows: Vec<ChunkVectorRow> = documents
            .into_iter()
            .map(|d| ChunkVectorRow {
                collection: collection.to_string(),
                doc_id: d.id,
                content: d.content,
                embedding: d.embedding,
                metadata: d.metadata,
            })
            .collect();
        if rows.is_empty() {
            return Ok(());
        }

        debug!(collection = %collection, count = rows.len(), "adding vectors");
        self.db
            .query("INSERT INTO chunk_vectors $rows")
            .bind(("rows", rows))
            .await
            .and_then(|res| res.check())?;
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> StorageResult<Vec<VectorMatch>> {
        self.require_collection(collection).await?;

        let mut res = self
            .db
            .query(
                "SELECT content, metadata, vector::distance::euclidean(embedding, $query) AS distance \
                 FROM chunk_vectors WHERE collection = $collection \
                 ORDER BY distance ASC LIMIT $top_k",
            )
            .bind(("query", embedding.to_vec()))
            .bind(("collection", collection.to_string()))
            .bind(("top_k", top_k as u64))
            .await?;
        let rows: Vec<ChunkMatchRow> = res.take(0)?;

        Ok(rows
            .into_iter()
            .map(|r| VectorMatch {
                content: r.content,
                distance: r.distance as f32,
                metadata: r.metadata,
            })
            .collect())
    }
}
