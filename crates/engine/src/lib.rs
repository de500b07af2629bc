//! Veridoc engine
//!
//! The reasoning layer over ingestion and retrieval:
//! - PLAN / SEARCH / GENERATE / AUDIT agent state machine
//! - Citation extraction from generated answers
//! - The `Engine` facade exposing ingest / delete / query

pub mod agent;
pub mod cancel;
pub mod citation;
mod engine;

pub use agent::{AgentState, AgentStatus, ReasoningAgent};
pub use cancel::CancellationToken;
pub use citation::Citation;
pub use engine::{Capabilities, Engine};

use serde::{Deserialize, Serialize};
use validator::Validate;
use veridoc_common::config::EngineConfig;

/// Fixed answer returned when retrieval finds nothing
pub const INSUFFICIENT_ANSWER: &str = "No relevant material was found for this question.";

/// Per-query tuning knobs.
///
/// `fusion_weight` and `confidence_threshold` have no default anywhere:
/// construct via `new` (explicit values) or `from_config`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QueryOptions {
    /// Maximum re-search iterations before giving up
    pub max_iterations: u32,

    /// Confidence required to finalize an answer
    #[validate(range(min = 0.0, max = 1.0))]
    pub confidence_threshold: f32,

    /// Candidates requested from the vector branch
    #[validate(range(min = 1))]
    pub top_k_vector: usize,

    /// Candidates requested from the keyword branch
    #[validate(range(min = 1))]
    pub top_k_keyword: usize,

    /// Weight of the vector branch in score fusion
    #[validate(range(min = 0.0, max = 1.0))]
    pub fusion_weight: f32,

    /// Candidates surviving the rerank stage
    #[validate(range(min = 1))]
    pub rerank_top_k: usize,

    /// Cap on expanded parent context, in characters
    #[validate(range(min = 1))]
    pub max_parent_chars: usize,
}

impl QueryOptions {
    /// Options with the two required knobs explicit and the rest at
    /// their documented defaults.
    pub fn new(fusion_weight: f32, confidence_threshold: f32) -> Self {
        Self {
            max_iterations: 5,
            confidence_threshold,
            top_k_vector: 5,
            top_k_keyword: 5,
            fusion_weight,
            rerank_top_k: 5,
            max_parent_chars: 2000,
        }
    }

    /// Options seeded from the deployment configuration
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_iterations: config.agent.max_iterations,
            confidence_threshold: config.agent.confidence_threshold,
            top_k_vector: config.retrieval.top_k_vector,
            top_k_keyword: config.retrieval.top_k_keyword,
            fusion_weight: config.retrieval.fusion_weight,
            rerank_top_k: config.retrieval.rerank_top_k,
            max_parent_chars: config.retrieval.max_parent_chars,
        }
    }
}

/// Terminal status of a query, as seen by the caller
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    /// Answer met the confidence threshold
    Done,
    /// Retrieval found nothing to answer from
    Insufficient,
    /// Iteration budget spent below the threshold
    Exhausted,
    /// Caller cancelled between agent states
    Cancelled,
}

/// Which parts of retrieval ran degraded during the query
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DegradeFlags {
    pub vector: bool,
    pub keyword: bool,
    pub rerank: bool,
}

impl DegradeFlags {
    pub fn any(&self) -> bool {
        self.vector || self.keyword || self.rerank
    }
}

/// Structured result of a query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub confidence: f32,
    pub citations: Vec<Citation>,
    pub status: QueryStatus,
    pub iterations_used: u32,

    /// Set when the iteration budget ran out below the threshold
    pub low_confidence: bool,

    /// Partial-result degradation observed during retrieval
    pub degraded: DegradeFlags,

    /// PII entities masked from the query text before processing
    pub pii_entities_masked: usize,
}
