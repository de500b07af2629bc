//! Ingestion pipeline
//!
//! Validate, chunk, embed, and write each chunk to both indices.
//! Writes of one chunk are all-or-nothing: a failed keyword upsert
//! rolls back that chunk's vector write. Ingest and delete of the same
//! document id are serialized through the store's per-document lock;
//! unrelated documents proceed concurrently.

use crate::chunker::chunk_document;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use veridoc_common::capabilities::Embedder;
use veridoc_common::config::ChunkingConfig;
use veridoc_common::errors::{EngineError, Result};
use veridoc_common::index::{KeywordIndex, VectorIndex};
use veridoc_common::store::{DocumentStore, ParentDocument};

/// Attempts per index write before the failure surfaces
const INDEX_WRITE_ATTEMPTS: u32 = 3;

/// Retry transient index failures with exponential delay.
///
/// Permanent failures surface immediately; transient ones get
/// `INDEX_WRITE_ATTEMPTS` tries total.
async fn with_index_retries<T, F, Fut>(what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..INDEX_WRITE_ATTEMPTS {
        if attempt > 0 {
            let delay = Duration::from_millis(100 * (1 << attempt));
            tokio::time::sleep(delay).await;
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                warn!(
                    what,
                    attempt = attempt + 1,
                    max_attempts = INDEX_WRITE_ATTEMPTS,
                    error = %e,
                    "Index write failed, retrying"
                );
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| EngineError::Internal {
        message: format!("{} failed with no recorded error", what),
    }))
}

/// Outcome of a successful ingest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub parent_id: Uuid,
    pub chunk_ids: Vec<Uuid>,
}

/// Ingestion pipeline
pub struct IngestionPipeline {
    store: Arc<DocumentStore>,
    vector: Arc<dyn VectorIndex>,
    keyword: Arc<dyn KeywordIndex>,
    embedder: Arc<dyn Embedder>,
    config: ChunkingConfig,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<DocumentStore>,
        vector: Arc<dyn VectorIndex>,
        keyword: Arc<dyn KeywordIndex>,
        embedder: Arc<dyn Embedder>,
        config: ChunkingConfig,
    ) -> Self {
        Self {
            store,
            vector,
            keyword,
            embedder,
            config,
        }
    }

    /// Chunk a document and write it to the store and both indices.
    ///
    /// Re-ingesting the same document id replaces the prior generation:
    /// chunk ids are deterministic, so unchanged chunks are upserts and
    /// stale ids from a previous chunking are removed from the indices.
    #[instrument(skip(self, document), fields(parent_id = %document.id, source = %document.source_name))]
    pub async fn ingest(&self, document: ParentDocument) -> Result<IngestReceipt> {
        let chunks = chunk_document(&document, self.config.chunk_size, self.config.chunk_overlap)?;

        let lock = self.store.document_lock(document.id);
        let _guard = lock.lock().await;

        let stale_ids: Vec<Uuid> = {
            let new_ids: HashSet<Uuid> = chunks.iter().map(|c| c.id).collect();
            self.store
                .chunk_ids_of(document.id)
                .into_iter()
                .filter(|id| !new_ids.contains(id))
                .collect()
        };

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            with_index_retries("vector upsert", || {
                self.vector.upsert(chunk.id, embedding.clone())
            })
            .await?;
            if let Err(e) =
                with_index_retries("keyword upsert", || self.keyword.upsert(chunk.id, &chunk.text))
                    .await
            {
                // Keep the chunk all-or-nothing across both indices
                let _ = self.vector.delete(chunk.id).await;
                return Err(e);
            }
        }

        for stale in &stale_ids {
            with_index_retries("vector delete", || self.vector.delete(*stale)).await?;
            with_index_retries("keyword delete", || self.keyword.delete(*stale)).await?;
        }

        let receipt = IngestReceipt {
            parent_id: document.id,
            chunk_ids: chunks.iter().map(|c| c.id).collect(),
        };
        self.store.insert_document(document, chunks);

        counter!("veridoc_ingest_documents_total").increment(1);
        counter!("veridoc_ingest_chunks_total").increment(receipt.chunk_ids.len() as u64);
        info!(chunk_count = receipt.chunk_ids.len(), "Document ingested");

        Ok(receipt)
    }

    /// Remove a document and all its chunks from the store and indices.
    ///
    /// The store entry goes first, so queries stop surfacing the chunks
    /// even while index deletes are still in flight.
    #[instrument(skip(self))]
    pub async fn delete(&self, parent_id: Uuid) -> Result<()> {
        let lock = self.store.document_lock(parent_id);
        let _guard = lock.lock().await;

        let chunk_ids =
            self.store
                .remove_document(parent_id)
                .ok_or_else(|| EngineError::DocumentNotFound {
                    id: parent_id.to_string(),
                })?;

        for chunk_id in &chunk_ids {
            with_index_retries("vector delete", || self.vector.delete(*chunk_id)).await?;
            with_index_retries("keyword delete", || self.keyword.delete(*chunk_id)).await?;
        }

        info!(chunk_count = chunk_ids.len(), "Document deleted");
        Ok(())
    }
}
