//! Mock capability implementations for tests and local development

use super::{
    AnswerAuditor, AuditVerdict, ContextBlock, CrossEncoder, Embedder, IntentClassifier,
    LanguageModel, MaskedText, PiiMasker, QueryIntent,
};
use crate::errors::{EngineError, Result};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

/// Deterministic embedder hashing tokens into buckets.
///
/// Texts sharing vocabulary get high cosine similarity, which makes
/// vector-search behavior observable in tests without a model.
pub struct BagOfWordsEmbedder {
    dimension: usize,
}

impl BagOfWordsEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for BagOfWordsEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text.to_lowercase().split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % self.dimension;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        "bag-of-words"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Random embedder for shape and plumbing tests
pub struct RandomEmbedder {
    dimension: usize,
}

impl RandomEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for RandomEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        Ok((0..self.dimension).map(|_| rng.gen::<f32>()).collect())
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for _ in texts {
            embeddings.push(self.embed("").await?);
        }
        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        "random-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Classifier returning a fixed intent
pub struct StaticIntent(pub QueryIntent);

#[async_trait]
impl IntentClassifier for StaticIntent {
    async fn classify(&self, _query: &str) -> Result<QueryIntent> {
        Ok(self.0)
    }
}

/// Generator that cites every context block it receives.
///
/// Answers carry `[n]` markers for each block, so citation extraction
/// is exercised end to end.
pub struct TemplateGenerator;

#[async_trait]
impl LanguageModel for TemplateGenerator {
    async fn generate(&self, query: &str, context: &[ContextBlock]) -> Result<String> {
        if context.is_empty() {
            return Ok(format!("Direct answer: {}", query));
        }

        let parts: Vec<String> = context
            .iter()
            .map(|block| {
                let snippet: String = block.text.chars().take(60).collect();
                format!("{} [{}].", snippet.trim_end(), block.ordinal)
            })
            .collect();
        Ok(parts.join(" "))
    }
}

/// Auditor replaying a scripted sequence of verdicts.
///
/// Once the script is exhausted it returns the fallback confidence
/// with no refinement.
pub struct ScriptedAuditor {
    verdicts: Mutex<VecDeque<AuditVerdict>>,
    fallback_confidence: f32,
}

impl ScriptedAuditor {
    pub fn new(verdicts: Vec<AuditVerdict>) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.into()),
            fallback_confidence: 0.5,
        }
    }

    pub fn with_fallback(mut self, confidence: f32) -> Self {
        self.fallback_confidence = confidence;
        self
    }
}

#[async_trait]
impl AnswerAuditor for ScriptedAuditor {
    async fn audit(&self, _draft_answer: &str, _context: &[ContextBlock]) -> Result<AuditVerdict> {
        let mut verdicts = self.verdicts.lock().expect("auditor script lock");
        Ok(verdicts.pop_front().unwrap_or(AuditVerdict {
            confidence: self.fallback_confidence,
            refined_query: None,
        }))
    }
}

/// Cross-encoder scoring by query-token overlap
pub struct KeywordOverlapCrossEncoder;

#[async_trait]
impl CrossEncoder for KeywordOverlapCrossEncoder {
    async fn score(&self, query: &str, text: &str) -> Result<f32> {
        let query_tokens: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(|t| t.to_string())
            .collect();
        if query_tokens.is_empty() {
            return Ok(0.0);
        }

        let text_lower = text.to_lowercase();
        let hits = query_tokens
            .iter()
            .filter(|t| text_lower.contains(t.as_str()))
            .count();
        Ok(hits as f32 / query_tokens.len() as f32)
    }
}

/// Cross-encoder that always fails, for degraded-mode tests
pub struct FailingCrossEncoder;

#[async_trait]
impl CrossEncoder for FailingCrossEncoder {
    async fn score(&self, _query: &str, _text: &str) -> Result<f32> {
        Err(EngineError::Internal {
            message: "cross-encoder offline".into(),
        })
    }
}

/// Masker that passes text through untouched
pub struct NoopPiiMasker;

impl PiiMasker for NoopPiiMasker {
    fn mask(&self, text: &str) -> MaskedText {
        MaskedText {
            text: text.to_string(),
            entities_masked: 0,
        }
    }
}

/// Masker replacing email addresses with a placeholder
pub struct PatternPiiMasker;

impl PiiMasker for PatternPiiMasker {
    fn mask(&self, text: &str) -> MaskedText {
        let email = regex_lite::Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
            .expect("email pattern");
        let entities_masked = email.find_iter(text).count();
        MaskedText {
            text: email.replace_all(text, "[MASKED]").into_owned(),
            entities_masked,
        }
    }
}
