//! Cross-encoder reranking of the fused candidate set
//!
//! Scores every (query, candidate text) pair jointly. When the scorer
//! is absent or fails, the fused order is kept and a degraded flag is
//! set; reranking is never fatal.

use crate::SearchCandidate;
use std::sync::Arc;
use tracing::warn;
use veridoc_common::capabilities::CrossEncoder;

/// Rerank result with degradation flag
#[derive(Debug)]
pub struct RerankOutcome {
    /// Candidates ordered by rerank score (or fused order when degraded)
    pub candidates: Vec<SearchCandidate>,

    /// The scorer was unavailable; fused order was kept
    pub degraded: bool,
}

/// Cross-encoder reranker
pub struct Reranker {
    encoder: Option<Arc<dyn CrossEncoder>>,
}

impl Reranker {
    pub fn new(encoder: Option<Arc<dyn CrossEncoder>>) -> Self {
        Self { encoder }
    }

    /// Rerank candidates, keeping at most `rerank_top_k`
    pub async fn rerank(
        &self,
        query: &str,
        mut candidates: Vec<SearchCandidate>,
        rerank_top_k: usize,
    ) -> RerankOutcome {
        let Some(encoder) = &self.encoder else {
            candidates.truncate(rerank_top_k);
            return RerankOutcome {
                candidates,
                degraded: true,
            };
        };

        let mut scores = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            match encoder.score(query, &candidate.text).await {
                Ok(score) => scores.push(score),
                Err(e) => {
                    warn!(error = %e, "Cross-encoder failed, keeping fused order");
                    candidates.truncate(rerank_top_k);
                    return RerankOutcome {
                        candidates,
                        degraded: true,
                    };
                }
            }
        }

        for (candidate, score) in candidates.iter_mut().zip(scores) {
            candidate.rerank_score = Some(score);
        }

        // Stable sort: ties keep fused order
        candidates.sort_by(|a, b| {
            b.rerank_score
                .partial_cmp(&a.rerank_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(rerank_top_k);

        RerankOutcome {
            candidates,
            degraded: false,
        }
    }
}
