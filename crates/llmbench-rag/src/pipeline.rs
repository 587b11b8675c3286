//! Ingest and retrieval over a vector store.

use std::sync::Arc;

use llmbench_gateway::{EmbeddingBackend, EmbeddingRequest};
use llmbench_state::{CatalogStore, DocumentId, VectorDocument, VectorMatch, VectorStore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::chunker;
use crate::error::RagError;
use crate::Result;

/// Chunking settings used when ingesting documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RagConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            overlap: 50,
        }
    }
}

/// A chunk returned by similarity search. Smaller distance is more relevant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub content: String,
    pub distance: f32,
    pub chunk_index: Option<u64>,
}

impl From<VectorMatch> for RetrievedChunk {
    fn from(m: VectorMatch) -> Self {
        RetrievedChunk {
            chunk_index: m.metadata.get("chunkIndex").and_then(|v| v.as_u64()),
            content: m.content,
            distance: m.distance,
        }
    }
}

/// Summary of one `embed_and_store` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub collection: String,
    pub chunk_count: usize,
}

/// Collection holding one document's chunks for one embedding model.
///
/// Colons are not allowed in collection names, so `nomic-embed:latest`
/// becomes `nomic-embed-latest`.
pub fn collection_name(document_id: DocumentId, embedding_model: &str) -> String {
    format!("doc-{}-{}", document_id, embedding_model.replace(':', "-"))
}

/// Format retrieved chunks as a numbered context block.
///
/// Returns an empty string when there is nothing to add.
pub fn build_context(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return String::new();
    }
    let mut out = String::from("Context:\n\n");
    for (i, chunk) in chunks.iter().enumerate() {
        out.push_str(&format!("[{}] {}\n\n", i + 1, chunk.content));
    }
    out
}

/// Chunker + embedding backend + vector store.
#[derive(Clone)]
pub struct RagPipeline {
    catalog: Arc<dyn CatalogStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingBackend>,
}

impl RagPipeline {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingBackend>,
    ) -> Self {
        Self {
            catalog,
            vectors,
            embedder,
        }
    }

    /// Chunk a stored document, embed every chunk and append the vectors to
    /// the document's collection for `embedding_model`.
    ///
    /// Calling this twice for the same pair appends a second copy of every
    /// chunk; clear the collection first if that is not wanted.
    #[instrument(skip(self), fields(collection = tracing::field::Empty))]
    pub async fn embed_and_store(
        &self,
        document_id: DocumentId,
        embedding_model: &str,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<IngestReport> {
        chunker::validate(chunk_size, overlap)?;

        let document = self.catalog.load_document(document_id).await?;
        let pieces = chunker::chunks(&document.content, chunk_size, overlap)?;
        let collection = collection_name(document_id, embedding_model);
        tracing::Span::current().record("collection", collection.as_str());

        self.ensure_collection(&collection, embedding_model).await?;

        let mut batch = Vec::with_capacity(pieces.len());
        for piece in &pieces {
            let embedding = self
                .embedder
                .embed(EmbeddingRequest::new(embedding_model, piece.text.as_str()))
                .await?;
            batch.push(VectorDocument {
                id: Uuid::new_v4().to_string(),
                content: piece.text.clone(),
                embedding,
                metadata: json!({
                    "documentId": document_id,
                    "chunkIndex": piece.index,
                    "embeddingModel": embedding_model,
                }),
            });
        }

        self.vectors.add_documents(&collection, batch).await?;
        self.catalog
            .update_document_chunk_count(document_id, pieces.len() as u64)
            .await?;

        info!(
            document_id,
            chunks = pieces.len(),
            "document embedded and stored"
        );
        Ok(IngestReport {
            collection,
            chunk_count: pieces.len(),
        })
    }

    async fn ensure_collection(&self, collection: &str, embedding_model: &str) -> Result<()> {
        if self.vectors.collection_exists(collection).await? {
            return Ok(());
        }
        let model = self
            .catalog
            .get_embedding_model(embedding_model)
            .await?
            .ok_or_else(|| {
                RagError::NotFound(format!("embedding model not registered: {embedding_model}"))
            })?;
        debug!(collection, dimensions = model.dimensions, "creating collection");
        self.vectors
            .create_collection(collection, model.dimensions)
            .await?;
        Ok(())
    }

    /// Embed `query_text` and return the `top_k` nearest chunks, nearest
    /// first.
    pub async fn query(
        &self,
        collection: &str,
        query_text: &str,
        embedding_model: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let embedding = self
            .embedder
            .embed(EmbeddingRequest::new(embedding_model, query_text))
            .await?;
        let matches = self.vectors.query(collection, &embedding, top_k).await?;
        debug!(collection, hits = matches.len(), "similarity search");
        Ok(matches.into_iter().map(RetrievedChunk::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retrieved(content: &str) -> RetrievedChunk {
        RetrievedChunk {
            content: content.to_string(),
            distance: 0.0,
            chunk_index: None,
        }
    }

    #[test]
    fn test_collection_name_replaces_colons() {
        assert_eq!(
            collection_name(7, "nomic-embed:latest"),
            "doc-7-nomic-embed-latest"
        );
        assert_eq!(collection_name(1, "a:b:c"), "doc-1-a-b-c");
    }

    #[test]
    fn test_build_context_empty() {
        assert_eq!(build_context(&[]), "");
    }

    #[test]
    fn test_build_context_numbers_chunks() {
        assert_eq!(
            build_context(&[retrieved("a"), retrieved("b")]),
            "Context:\n\n[1] a\n\n[2] b\n\n"
        );
    }

    #[test]
    fn test_retrieved_chunk_reads_index_from_metadata() {
        let chunk = RetrievedChunk::from(VectorMatch {
            content: "x".into(),
            distance: 0.5,
            metadata: json!({ "chunkIndex": 4 }),
        });
        assert_eq!(chunk.chunk_index, Some(4));

        let chunk = RetrievedChunk::from(VectorMatch {
            content: "x".into(),
            distance: 0.5,
            metadata: json!({}),
        });
        assert_eq!(chunk.chunk_index, None);
    }

    #[test]
    fn test_default_config() {
        let config = RagConfig::default();
        assert_eq!((config.chunk_size, config.overlap), (500, 50));
    }
}
