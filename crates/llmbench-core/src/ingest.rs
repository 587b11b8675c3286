//! Document ingestion entry point used by the daemon and the HTTP layer.

use llmbench_rag::{IngestReport, RagConfig, RagPipeline};
use llmbench_state::DocumentId;

use crate::metrics::METRICS;
use crate::obs;
use crate::Result;

/// Chunk and embed `document_id` with `embedding_model`, recording the
/// result in metrics and the event log.
pub async fn ingest_document(
    pipeline: &RagPipeline,
    document_id: DocumentId,
    embedding_model: &str,
    config: RagConfig,
) -> Result<IngestReport> {
    let report = pipeline
        .embed_and_store(document_id, embedding_model, config.chunk_size, config.overlap)
        .await?;
    METRICS.add_chunks_embedded(report.chunk_count as u64);
    obs::emit_document_ingested(document_id, &report.collection, report.chunk_count);
    Ok(report)
}
