//! Index adapter seams
//!
//! The vector and keyword indices are owned externally; the engine only
//! calls query/upsert/delete. Reference in-memory implementations live
//! in `veridoc-retrieval::memory`.

use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single index match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexHit {
    pub chunk_id: Uuid,
    pub score: f32,
}

/// Embedding similarity store
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Top-k chunks by embedding similarity
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<IndexHit>>;

    /// Insert or replace a chunk embedding
    async fn upsert(&self, chunk_id: Uuid, embedding: Vec<f32>) -> Result<()>;

    /// Remove a chunk embedding
    async fn delete(&self, chunk_id: Uuid) -> Result<()>;
}

/// Term-relevance index
#[async_trait]
pub trait KeywordIndex: Send + Sync {
    /// Top-k chunks by term relevance
    async fn query(&self, text: &str, k: usize) -> Result<Vec<IndexHit>>;

    /// Insert or replace a chunk's indexed text
    async fn upsert(&self, chunk_id: Uuid, text: &str) -> Result<()>;

    /// Remove a chunk from the index
    async fn delete(&self, chunk_id: Uuid) -> Result<()>;
}
