//! Veridoc retrieval
//!
//! The retrieval pipeline behind the reasoning agent:
//! - Score fusion across the vector and keyword branches
//! - Hybrid retrieval with parent-context expansion
//! - Cross-encoder reranking with graceful degradation
//! - In-memory reference indices for tests and local use

mod fusion;
mod hybrid;
pub mod memory;
mod rerank;

pub use fusion::{fuse_scores, FusedScore};
pub use hybrid::HybridRetriever;
pub use rerank::{Reranker, RerankOutcome};

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// A retrieval candidate carrying branch, fused, and rerank scores.
///
/// At least one of `vector_score` / `keyword_score` is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCandidate {
    /// Chunk ID
    pub chunk_id: Uuid,

    /// Parent document this chunk belongs to
    pub parent_id: Uuid,

    /// Source document name
    pub source_name: String,

    /// Page the chunk starts on
    pub page_number: u32,

    /// Chunk text (the retrieval unit)
    pub text: String,

    /// Expanded parent excerpt (the generation unit)
    pub context: String,

    /// Normalized vector-branch score, if the chunk was found there
    pub vector_score: Option<f32>,

    /// Normalized keyword-branch score, if the chunk was found there
    pub keyword_score: Option<f32>,

    /// Weighted fusion of the branch scores
    pub fused_score: f32,

    /// Cross-encoder score, set by the rerank stage
    pub rerank_score: Option<f32>,
}

/// Parameters for one retrieval pass
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub query: String,
    pub top_k_vector: usize,
    pub top_k_keyword: usize,

    /// Weight of the vector branch in fusion (0.0 - 1.0)
    pub fusion_weight: f32,

    /// Size of the fused candidate set
    pub top_k_fused: usize,

    /// Cap on expanded parent context, in characters
    pub max_parent_chars: usize,

    /// Deadline for each retrieval branch
    pub branch_timeout: Duration,
}

/// Result of a retrieval pass, with partial-degradation flags
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    /// Fused, expanded candidates, most relevant first
    pub candidates: Vec<SearchCandidate>,

    /// The vector branch timed out or failed
    pub vector_degraded: bool,

    /// The keyword branch timed out or failed
    pub keyword_degraded: bool,
}
