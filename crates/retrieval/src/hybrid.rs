//! Hybrid retrieval combining the vector and keyword branches
//!
//! Both branches run in parallel under a deadline. A branch that times
//! out or fails degrades the outcome instead of failing the call, so a
//! query survives on keyword-only or vector-only results.

use crate::fusion::fuse_scores;
use crate::{RetrievalOutcome, RetrievalRequest, SearchCandidate};
use std::ops::Range;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, warn};
use veridoc_common::capabilities::Embedder;
use veridoc_common::errors::Result;
use veridoc_common::index::{IndexHit, KeywordIndex, VectorIndex};
use veridoc_common::store::{DocumentStore, ParentDocument};

/// Hybrid retriever with parent-context expansion
pub struct HybridRetriever {
    vector: Arc<dyn VectorIndex>,
    keyword: Arc<dyn KeywordIndex>,
    embedder: Arc<dyn Embedder>,
    store: Arc<DocumentStore>,
}

impl HybridRetriever {
    pub fn new(
        vector: Arc<dyn VectorIndex>,
        keyword: Arc<dyn KeywordIndex>,
        embedder: Arc<dyn Embedder>,
        store: Arc<DocumentStore>,
    ) -> Self {
        Self {
            vector,
            keyword,
            embedder,
            store,
        }
    }

    /// Run both branches, fuse, and expand survivors to parent context
    pub async fn retrieve(&self, request: &RetrievalRequest) -> Result<RetrievalOutcome> {
        let vector_branch = async {
            let embedding = self.embedder.embed(&request.query).await?;
            self.vector.query(&embedding, request.top_k_vector).await
        };
        let keyword_branch = self.keyword.query(&request.query, request.top_k_keyword);

        // Execute both searches in parallel, each under its own deadline
        let (vector_result, keyword_result) = tokio::join!(
            timeout(request.branch_timeout, vector_branch),
            timeout(request.branch_timeout, keyword_branch)
        );

        let (vector_hits, vector_degraded) = settle_branch("vector", vector_result);
        let (keyword_hits, keyword_degraded) = settle_branch("keyword", keyword_result);

        let fused = fuse_scores(
            &vector_hits,
            &keyword_hits,
            request.fusion_weight,
            request.top_k_fused,
        );

        debug!(
            vector_hits = vector_hits.len(),
            keyword_hits = keyword_hits.len(),
            fused = fused.len(),
            "Retrieval branches fused"
        );

        let mut candidates = Vec::with_capacity(fused.len());
        for entry in fused {
            // A chunk deleted between index read and store lookup is skipped
            let Some(chunk) = self.store.chunk(entry.chunk_id) else {
                continue;
            };
            let Some(parent) = self.store.parent(chunk.parent_id) else {
                continue;
            };

            let context = expand_parent(&parent, &chunk.char_range, request.max_parent_chars);

            candidates.push(SearchCandidate {
                chunk_id: chunk.id,
                parent_id: chunk.parent_id,
                source_name: chunk.source_name.clone(),
                page_number: chunk.page_number,
                text: chunk.text.clone(),
                context,
                vector_score: entry.vector_score,
                keyword_score: entry.keyword_score,
                fused_score: entry.fused_score,
                rerank_score: None,
            });
        }

        Ok(RetrievalOutcome {
            candidates,
            vector_degraded,
            keyword_degraded,
        })
    }
}

/// Collapse a branch result into (hits, degraded)
fn settle_branch(
    branch: &str,
    result: std::result::Result<Result<Vec<IndexHit>>, tokio::time::error::Elapsed>,
) -> (Vec<IndexHit>, bool) {
    match result {
        Ok(Ok(hits)) => (hits, false),
        Ok(Err(e)) => {
            warn!(branch, error = %e, "Retrieval branch failed, continuing without it");
            (Vec::new(), true)
        }
        Err(_) => {
            warn!(branch, "Retrieval branch timed out, continuing without it");
            (Vec::new(), true)
        }
    }
}

/// Parent excerpt of at most `max_chars` chars centered on the chunk.
/// Parents shorter than the cap come back whole.
fn expand_parent(parent: &ParentDocument, chunk_range: &Range<usize>, max_chars: usize) -> String {
    let len = parent.char_len();
    if len <= max_chars {
        return parent.full_text.clone();
    }

    let center = (chunk_range.start + chunk_range.end) / 2;
    let start = center
        .saturating_sub(max_chars / 2)
        .min(len - max_chars);
    parent.slice_chars(start..start + max_chars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryKeywordIndex, InMemoryVectorIndex};
    use std::time::Duration;
    use uuid::Uuid;
    use veridoc_common::capabilities::mock::BagOfWordsEmbedder;
    use veridoc_common::errors::EngineError;
    use veridoc_common::store::Chunk;

    fn request(query: &str) -> RetrievalRequest {
        RetrievalRequest {
            query: query.to_string(),
            top_k_vector: 5,
            top_k_keyword: 5,
            fusion_weight: 0.5,
            top_k_fused: 10,
            max_parent_chars: 200,
            branch_timeout: Duration::from_millis(500),
        }
    }

    fn store_with_chunks(texts: &[&str]) -> (Arc<DocumentStore>, Vec<Uuid>) {
        let store = Arc::new(DocumentStore::new());
        let full_text = texts.join(" ");
        let parent = ParentDocument::new("corpus.txt", full_text.clone());
        let parent_id = parent.id;

        let mut offset = 0;
        let mut ids = Vec::new();
        let chunks: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let id = Uuid::new_v5(&parent_id, &(i as u64).to_be_bytes());
                ids.push(id);
                let start = offset;
                offset += text.chars().count() + 1;
                Chunk {
                    id,
                    parent_id,
                    text: text.to_string(),
                    char_range: start..start + text.chars().count(),
                    page_number: 1,
                    source_name: "corpus.txt".into(),
                }
            })
            .collect();

        store.insert_document(parent, chunks);
        (store, ids)
    }

    async fn index_chunks(
        store: &DocumentStore,
        embedder: &BagOfWordsEmbedder,
        vector: &InMemoryVectorIndex,
        keyword: &InMemoryKeywordIndex,
        ids: &[Uuid],
    ) {
        for id in ids {
            let chunk = store.chunk(*id).unwrap();
            let embedding = embedder.embed(&chunk.text).await.unwrap();
            vector.upsert(*id, embedding).await.unwrap();
            keyword.upsert(*id, &chunk.text).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_rare_term_surfaces_via_keyword_branch() {
        let (store, ids) = store_with_chunks(&[
            "solar panels convert sunlight into electricity",
            "wind turbines harvest kinetic energy",
            "the zygomaticus muscle controls smiling",
        ]);
        let embedder = Arc::new(BagOfWordsEmbedder::new(64));
        let vector = Arc::new(InMemoryVectorIndex::new());
        let keyword = Arc::new(InMemoryKeywordIndex::new());
        index_chunks(&store, &embedder, &vector, &keyword, &ids).await;

        let retriever = HybridRetriever::new(vector, keyword, embedder, store);
        let outcome = retriever.retrieve(&request("zygomaticus")).await.unwrap();

        assert!(!outcome.vector_degraded);
        assert!(!outcome.keyword_degraded);
        assert!(outcome
            .candidates
            .iter()
            .any(|c| c.chunk_id == ids[2]), "rare term chunk must appear in fused set");
    }

    #[tokio::test]
    async fn test_expansion_respects_cap() {
        let long_text = "word ".repeat(500);
        let (store, ids) = store_with_chunks(&[long_text.trim()]);
        let embedder = Arc::new(BagOfWordsEmbedder::new(64));
        let vector = Arc::new(InMemoryVectorIndex::new());
        let keyword = Arc::new(InMemoryKeywordIndex::new());
        index_chunks(&store, &embedder, &vector, &keyword, &ids).await;

        let retriever = HybridRetriever::new(vector, keyword, embedder, store);
        let outcome = retriever.retrieve(&request("word")).await.unwrap();

        for candidate in &outcome.candidates {
            assert!(candidate.context.chars().count() <= 200);
        }
    }

    #[tokio::test]
    async fn test_short_parent_returned_whole() {
        let (store, ids) = store_with_chunks(&["tiny document"]);
        let embedder = Arc::new(BagOfWordsEmbedder::new(64));
        let vector = Arc::new(InMemoryVectorIndex::new());
        let keyword = Arc::new(InMemoryKeywordIndex::new());
        index_chunks(&store, &embedder, &vector, &keyword, &ids).await;

        let retriever = HybridRetriever::new(vector, keyword, embedder, store);
        let outcome = retriever.retrieve(&request("tiny")).await.unwrap();

        assert_eq!(outcome.candidates[0].context, "tiny document");
    }

    struct FailingVectorIndex;

    #[async_trait::async_trait]
    impl VectorIndex for FailingVectorIndex {
        async fn query(&self, _embedding: &[f32], _k: usize) -> Result<Vec<IndexHit>> {
            Err(EngineError::IndexUnavailable {
                index: "vector".into(),
                message: "down".into(),
            })
        }
        async fn upsert(&self, _chunk_id: Uuid, _embedding: Vec<f32>) -> Result<()> {
            Ok(())
        }
        async fn delete(&self, _chunk_id: Uuid) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_branch_degrades_not_fails() {
        let (store, ids) = store_with_chunks(&["solar panels convert sunlight"]);
        let embedder = Arc::new(BagOfWordsEmbedder::new(64));
        let keyword = Arc::new(InMemoryKeywordIndex::new());
        for id in &ids {
            let chunk = store.chunk(*id).unwrap();
            keyword.upsert(*id, &chunk.text).await.unwrap();
        }

        let retriever =
            HybridRetriever::new(Arc::new(FailingVectorIndex), keyword, embedder, store);
        let outcome = retriever.retrieve(&request("solar")).await.unwrap();

        assert!(outcome.vector_degraded);
        assert!(!outcome.keyword_degraded);
        assert!(!outcome.candidates.is_empty(), "keyword branch alone still answers");
        assert!(outcome.candidates[0].vector_score.is_none());
        assert!(outcome.candidates[0].keyword_score.is_some());
    }

    #[test]
    fn test_expand_parent_window_math() {
        let parent = ParentDocument::new("t", "0123456789".repeat(10)); // 100 chars
        // Chunk centered at char 50, cap 20 -> window [40, 60)
        let excerpt = expand_parent(&parent, &(45..55), 20);
        assert_eq!(excerpt.chars().count(), 20);
        assert_eq!(excerpt, parent.slice_chars(40..60));

        // Chunk at the very end: window clamps to the tail
        let excerpt = expand_parent(&parent, &(95..100), 20);
        assert_eq!(excerpt, parent.slice_chars(80..100));
    }
}
