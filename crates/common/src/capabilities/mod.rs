//! External capability seams
//!
//! Everything the engine consumes but does not implement lives behind
//! these traits: embedding, generation, intent classification, answer
//! auditing, cross-encoder scoring, and PII masking. Implementations:
//! - `ollama`: HTTP-backed client for a local Ollama server
//! - `mock`: deterministic in-process doubles for tests

pub mod mock;
pub mod ollama;

use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of the planning classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    /// The query needs document retrieval
    NeedsSearch,
    /// The query can be answered without retrieval
    DirectAnswer,
}

/// Verdict produced by the audit capability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditVerdict {
    /// How well the draft is supported by the context (0.0 - 1.0)
    pub confidence: f32,

    /// Optional reformulation to try on the next search pass
    pub refined_query: Option<String>,
}

/// One unit of generation context, numbered for citation markers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBlock {
    /// 1-based ordinal, referenced by `[n]` markers in the answer
    pub ordinal: usize,

    /// Source document name
    pub source_name: String,

    /// Expanded parent excerpt handed to the model
    pub text: String,
}

/// Result of masking PII in a text
#[derive(Debug, Clone)]
pub struct MaskedText {
    pub text: String,
    pub entities_masked: usize,
}

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// Decides whether a query needs retrieval or a direct answer
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, query: &str) -> Result<QueryIntent>;
}

/// Generates an answer from a query and numbered context blocks
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, query: &str, context: &[ContextBlock]) -> Result<String>;
}

/// Fact-checks a draft answer against the context it was generated from
#[async_trait]
pub trait AnswerAuditor: Send + Sync {
    async fn audit(&self, draft_answer: &str, context: &[ContextBlock]) -> Result<AuditVerdict>;
}

/// Scores a (query, candidate text) pair jointly
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    async fn score(&self, query: &str, text: &str) -> Result<f32>;
}

/// Masks personally identifiable information in a text.
///
/// The engine treats text as opaque; masking happens at the boundary
/// and the counts are recorded on the session context.
pub trait PiiMasker: Send + Sync {
    fn mask(&self, text: &str) -> MaskedText;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_serde_shape() {
        let json = serde_json::to_string(&QueryIntent::NeedsSearch).unwrap();
        assert_eq!(json, "\"needs_search\"");
    }

    #[test]
    fn test_audit_verdict_roundtrip() {
        let verdict = AuditVerdict {
            confidence: 0.75,
            refined_query: Some("refined".into()),
        };
        let json = serde_json::to_string(&verdict).unwrap();
        let back: AuditVerdict = serde_json::from_str(&json).unwrap();
        assert!((back.confidence - 0.75).abs() < f32::EPSILON);
        assert_eq!(back.refined_query.as_deref(), Some("refined"));
    }
}
