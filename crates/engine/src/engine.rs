//! Engine facade
//!
//! Wires ingestion, retrieval, and the reasoning agent behind three
//! operations: `ingest`, `delete`, and `query`. Each query runs one
//! independent agent; concurrent queries share only read access to the
//! indices and the document store.

use crate::agent::{AgentRequest, ReasoningAgent};
use crate::cancel::CancellationToken;
use crate::{AgentStatus, DegradeFlags, QueryOptions, QueryResponse, QueryStatus};
use metrics::{counter, histogram};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;
use veridoc_common::capabilities::{
    AnswerAuditor, CrossEncoder, Embedder, IntentClassifier, LanguageModel, PiiMasker,
};
use veridoc_common::config::EngineConfig;
use veridoc_common::errors::{EngineError, Result};
use veridoc_common::index::{KeywordIndex, VectorIndex};
use veridoc_common::metrics::Timer;
use veridoc_common::session::SessionContext;
use veridoc_common::store::{DocumentStore, ParentDocument};
use veridoc_ingestion::{IngestReceipt, IngestionPipeline};
use veridoc_retrieval::{HybridRetriever, Reranker};

/// External collaborators the engine consumes
pub struct Capabilities {
    pub embedder: Arc<dyn Embedder>,
    pub classifier: Arc<dyn IntentClassifier>,
    pub generator: Arc<dyn LanguageModel>,
    pub auditor: Arc<dyn AnswerAuditor>,

    /// Absent scorer means reranking runs degraded (fused order kept)
    pub cross_encoder: Option<Arc<dyn CrossEncoder>>,

    /// Applied to query text before planning when present
    pub pii_masker: Option<Arc<dyn PiiMasker>>,
}

/// The hybrid retrieval-augmented reasoning engine
pub struct Engine {
    store: Arc<DocumentStore>,
    pipeline: IngestionPipeline,
    agent: ReasoningAgent,
    pii_masker: Option<Arc<dyn PiiMasker>>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        capabilities: Capabilities,
        vector: Arc<dyn VectorIndex>,
        keyword: Arc<dyn KeywordIndex>,
    ) -> Self {
        let store = Arc::new(DocumentStore::new());

        let pipeline = IngestionPipeline::new(
            store.clone(),
            vector.clone(),
            keyword.clone(),
            capabilities.embedder.clone(),
            config.chunking.clone(),
        );

        let retriever = Arc::new(HybridRetriever::new(
            vector,
            keyword,
            capabilities.embedder,
            store.clone(),
        ));
        let reranker = Arc::new(Reranker::new(capabilities.cross_encoder));

        let agent = ReasoningAgent::new(
            capabilities.classifier,
            capabilities.generator,
            capabilities.auditor,
            retriever,
            reranker,
            config.agent.capability_retries,
        );

        Self {
            store,
            pipeline,
            agent,
            pii_masker: capabilities.pii_masker,
            config,
        }
    }

    /// Access to the document store (read-only use expected)
    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    /// Chunk and index a parent document
    pub async fn ingest(&self, document: ParentDocument) -> Result<IngestReceipt> {
        self.pipeline.ingest(document).await
    }

    /// Remove a document and all its chunks from both indices
    pub async fn delete(&self, parent_id: Uuid) -> Result<()> {
        self.pipeline.delete(parent_id).await
    }

    /// Answer a natural-language query with citations and a confidence
    /// score. Cancellation is honored between agent states.
    #[instrument(skip(self, options, session, cancel), fields(session_id = %session.id))]
    pub async fn query(
        &self,
        text: &str,
        options: QueryOptions,
        session: &SessionContext,
        cancel: &CancellationToken,
    ) -> Result<QueryResponse> {
        let timer = Timer::start();

        if text.trim().is_empty() {
            return Err(EngineError::Validation {
                message: "query text is empty".to_string(),
                field: Some("text".to_string()),
            });
        }
        options.validate().map_err(|e| EngineError::Validation {
            message: e.to_string(),
            field: None,
        })?;

        let mut query_text = text.to_string();
        let mut pii_entities_masked = 0;
        if let Some(masker) = &self.pii_masker {
            let masked = masker.mask(&query_text);
            session.record_masking(masked.entities_masked);
            pii_entities_masked = masked.entities_masked;
            query_text = masked.text;
        }

        let request = AgentRequest {
            query: query_text,
            options,
            top_k_fused: self.config.retrieval.top_k_fused,
            branch_timeout: self.config.branch_timeout(),
        };

        let response = match self.agent.run(request, cancel).await {
            Ok(run) => {
                let status = match run.state.status {
                    AgentStatus::Done => QueryStatus::Done,
                    AgentStatus::Insufficient => QueryStatus::Insufficient,
                    AgentStatus::Exhausted => QueryStatus::Exhausted,
                    other => {
                        return Err(EngineError::Internal {
                            message: format!("agent stopped in non-terminal state {:?}", other),
                        })
                    }
                };

                QueryResponse {
                    answer: run.state.draft_answer,
                    confidence: run.state.confidence,
                    citations: run.state.citations,
                    status,
                    iterations_used: run.state.iteration,
                    low_confidence: status == QueryStatus::Exhausted,
                    degraded: run.degraded,
                    pii_entities_masked,
                }
            }
            // Cancellation is a structured outcome, not an error
            Err(EngineError::Cancelled) => QueryResponse {
                answer: String::new(),
                confidence: 0.0,
                citations: Vec::new(),
                status: QueryStatus::Cancelled,
                iterations_used: 0,
                low_confidence: false,
                degraded: DegradeFlags::default(),
                pii_entities_masked,
            },
            Err(e) => return Err(e),
        };

        let status_label = format!("{:?}", response.status).to_lowercase();
        counter!("veridoc_queries_total", "status" => status_label).increment(1);
        histogram!("veridoc_query_duration_seconds").record(timer.elapsed_seconds());
        histogram!("veridoc_agent_iterations").record(response.iterations_used as f64);
        if response.degraded.any() {
            counter!("veridoc_retrieval_degraded_total").increment(1);
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veridoc_common::capabilities::mock::{
        BagOfWordsEmbedder, KeywordOverlapCrossEncoder, PatternPiiMasker, ScriptedAuditor,
        StaticIntent, TemplateGenerator,
    };
    use veridoc_common::capabilities::{AuditVerdict, QueryIntent};
    use veridoc_common::config::{AgentConfig, ChunkingConfig, OllamaConfig, RetrievalConfig};
    use veridoc_retrieval::memory::{InMemoryKeywordIndex, InMemoryVectorIndex};

    fn test_config(fusion_weight: f32, confidence_threshold: f32) -> EngineConfig {
        EngineConfig {
            chunking: ChunkingConfig {
                chunk_size: 500,
                chunk_overlap: 50,
            },
            retrieval: RetrievalConfig {
                fusion_weight,
                top_k_vector: 5,
                top_k_keyword: 5,
                top_k_fused: 10,
                rerank_top_k: 5,
                max_parent_chars: 2000,
                branch_timeout_ms: 500,
            },
            agent: AgentConfig {
                confidence_threshold,
                max_iterations: 2,
                capability_retries: 3,
            },
            ollama: OllamaConfig::default(),
        }
    }

    fn engine_with_audits(
        fusion_weight: f32,
        confidence_threshold: f32,
        audits: Vec<AuditVerdict>,
        fallback: f32,
    ) -> Engine {
        let config = test_config(fusion_weight, confidence_threshold);
        Engine::new(
            config,
            Capabilities {
                embedder: Arc::new(BagOfWordsEmbedder::new(64)),
                classifier: Arc::new(StaticIntent(QueryIntent::NeedsSearch)),
                generator: Arc::new(TemplateGenerator),
                auditor: Arc::new(ScriptedAuditor::new(audits).with_fallback(fallback)),
                cross_encoder: Some(Arc::new(KeywordOverlapCrossEncoder)),
                pii_masker: None,
            },
            Arc::new(InMemoryVectorIndex::new()),
            Arc::new(InMemoryKeywordIndex::new()),
        )
    }

    fn verdict(confidence: f32, refined: Option<&str>) -> AuditVerdict {
        AuditVerdict {
            confidence,
            refined_query: refined.map(|s| s.to_string()),
        }
    }

    #[tokio::test]
    async fn test_ingest_window_ranges() {
        // 1000 chars at size 500 / overlap 50 -> [0,500), [450,950), [900,1000)
        let engine = engine_with_audits(0.5, 0.7, vec![], 0.9);
        let receipt = engine
            .ingest(ParentDocument::new("doc.txt", "a".repeat(1000)))
            .await
            .unwrap();

        assert_eq!(receipt.chunk_ids.len(), 3);
        let ranges: Vec<_> = receipt
            .chunk_ids
            .iter()
            .map(|id| engine.store().chunk(*id).unwrap().char_range.clone())
            .collect();
        assert_eq!(ranges, vec![0..500, 450..950, 900..1000]);
    }

    #[tokio::test]
    async fn test_rare_term_reaches_fused_result() {
        let engine = engine_with_audits(0.5, 0.5, vec![], 0.9);
        engine
            .ingest(ParentDocument::new(
                "common.txt",
                "ordinary words about weather and seasons ".repeat(20),
            ))
            .await
            .unwrap();
        let rare = engine
            .ingest(ParentDocument::new(
                "rare.txt",
                "the zygomaticus muscle contracts when smiling".to_string(),
            ))
            .await
            .unwrap();

        let response = engine
            .query(
                "zygomaticus",
                QueryOptions::new(0.5, 0.5),
                &SessionContext::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(response.status, QueryStatus::Done);
        assert!(response
            .citations
            .iter()
            .any(|c| c.source_name == "rare.txt"));
        assert!(engine.store().contains_parent(rare.parent_id));
    }

    #[tokio::test]
    async fn test_low_confidence_then_pass() {
        // threshold 0.7, max_iterations 2: audit 0.4 then 0.75 -> Done after 1 iteration
        let engine = engine_with_audits(
            0.5,
            0.7,
            vec![verdict(0.4, Some("solar panel efficiency")), verdict(0.75, None)],
            0.5,
        );
        engine
            .ingest(ParentDocument::new(
                "solar.txt",
                "solar panel efficiency depends on cell temperature".to_string(),
            ))
            .await
            .unwrap();

        let mut options = QueryOptions::new(0.5, 0.7);
        options.max_iterations = 2;
        let response = engine
            .query(
                "solar energy",
                options,
                &SessionContext::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(response.status, QueryStatus::Done);
        assert_eq!(response.iterations_used, 1);
        assert!(!response.low_confidence);
        assert!((response.confidence - 0.75).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_low_confidence_answer() {
        // Audit never exceeds 0.5 -> Exhausted after iteration 2
        let engine = engine_with_audits(0.5, 0.7, vec![], 0.45);
        engine
            .ingest(ParentDocument::new(
                "solar.txt",
                "solar panel efficiency data".to_string(),
            ))
            .await
            .unwrap();

        let mut options = QueryOptions::new(0.5, 0.7);
        options.max_iterations = 2;
        let response = engine
            .query(
                "solar",
                options,
                &SessionContext::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(response.status, QueryStatus::Exhausted);
        assert_eq!(response.iterations_used, 2);
        assert!(response.low_confidence);
        assert!(!response.answer.is_empty());
        assert!((response.confidence - 0.45).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_empty_corpus_is_insufficient() {
        let engine = engine_with_audits(0.5, 0.7, vec![], 0.9);

        let response = engine
            .query(
                "anything at all",
                QueryOptions::new(0.5, 0.7),
                &SessionContext::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(response.status, QueryStatus::Insufficient);
        assert_eq!(response.confidence, 0.0);
        assert!(response.citations.is_empty());
        assert_eq!(response.answer, crate::INSUFFICIENT_ANSWER);
    }

    #[tokio::test]
    async fn test_citations_reference_only_retrieved_chunks() {
        let engine = engine_with_audits(0.5, 0.5, vec![], 0.9);
        let receipt = engine
            .ingest(ParentDocument::new(
                "facts.txt",
                "penguins huddle for warmth in antarctic winters".to_string(),
            ))
            .await
            .unwrap();

        let response = engine
            .query(
                "penguins antarctic",
                QueryOptions::new(0.5, 0.5),
                &SessionContext::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(response.status, QueryStatus::Done);
        assert!(!response.citations.is_empty());
        for citation in &response.citations {
            assert!(receipt.chunk_ids.contains(&citation.chunk_id));
        }
    }

    #[tokio::test]
    async fn test_delete_prevents_future_citations() {
        let engine = engine_with_audits(0.5, 0.5, vec![], 0.9);
        engine
            .ingest(ParentDocument::new(
                "keep.txt",
                "glaciers calve icebergs into the sea".to_string(),
            ))
            .await
            .unwrap();
        let doomed = engine
            .ingest(ParentDocument::new(
                "doomed.txt",
                "glaciers retreat as temperatures rise".to_string(),
            ))
            .await
            .unwrap();

        engine.delete(doomed.parent_id).await.unwrap();

        let response = engine
            .query(
                "glaciers",
                QueryOptions::new(0.5, 0.5),
                &SessionContext::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        for citation in &response.citations {
            assert_ne!(citation.source_name, "doomed.txt");
            assert!(!doomed.chunk_ids.contains(&citation.chunk_id));
        }
    }

    #[tokio::test]
    async fn test_cancelled_token_yields_cancelled_status() {
        let engine = engine_with_audits(0.5, 0.7, vec![], 0.9);
        let token = CancellationToken::new();
        token.cancel();

        let response = engine
            .query(
                "anything",
                QueryOptions::new(0.5, 0.7),
                &SessionContext::new(),
                &token,
            )
            .await
            .unwrap();

        assert_eq!(response.status, QueryStatus::Cancelled);
        assert!(response.answer.is_empty());
        assert!(response.citations.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_options_rejected() {
        let engine = engine_with_audits(0.5, 0.7, vec![], 0.9);

        let err = engine
            .query(
                "query",
                QueryOptions::new(1.5, 0.7),
                &SessionContext::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));

        let err = engine
            .query(
                "   ",
                QueryOptions::new(0.5, 0.7),
                &SessionContext::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_fusion_weight_extremes_both_answer() {
        // Exercise multiple weights rather than assuming one default
        for weight in [0.3f32, 0.7f32] {
            let engine = engine_with_audits(weight, 0.5, vec![], 0.9);
            engine
                .ingest(ParentDocument::new(
                    "facts.txt",
                    "volcanic eruptions emit sulfur dioxide".to_string(),
                ))
                .await
                .unwrap();

            let response = engine
                .query(
                    "volcanic sulfur",
                    QueryOptions::new(weight, 0.5),
                    &SessionContext::new(),
                    &CancellationToken::new(),
                )
                .await
                .unwrap();

            assert_eq!(response.status, QueryStatus::Done, "weight {}", weight);
            assert!(!response.citations.is_empty());
        }
    }

    #[tokio::test]
    async fn test_pii_masking_counts_on_session() {
        let config = test_config(0.5, 0.5);
        let engine = Engine::new(
            config,
            Capabilities {
                embedder: Arc::new(BagOfWordsEmbedder::new(64)),
                classifier: Arc::new(StaticIntent(QueryIntent::DirectAnswer)),
                generator: Arc::new(TemplateGenerator),
                auditor: Arc::new(ScriptedAuditor::new(vec![]).with_fallback(0.9)),
                cross_encoder: None,
                pii_masker: Some(Arc::new(PatternPiiMasker)),
            },
            Arc::new(InMemoryVectorIndex::new()),
            Arc::new(InMemoryKeywordIndex::new()),
        );

        let session = SessionContext::new();
        let response = engine
            .query(
                "who is alice@example.com",
                QueryOptions::new(0.5, 0.5),
                &session,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(response.pii_entities_masked, 1);
        assert_eq!(session.stats().entities_masked, 1);
        // The masked text is what the agent saw
        assert!(!response.answer.contains("alice@example.com"));
    }

    #[tokio::test]
    async fn test_reingest_then_query_uses_latest_generation() {
        let engine = engine_with_audits(0.5, 0.5, vec![], 0.9);
        let doc = ParentDocument::new("report.txt", "quarterly revenue grew strongly".to_string());
        let parent_id = doc.id;

        engine.ingest(doc.clone()).await.unwrap();
        let second = engine.ingest(doc).await.unwrap();

        assert_eq!(second.parent_id, parent_id);
        let response = engine
            .query(
                "quarterly revenue",
                QueryOptions::new(0.5, 0.5),
                &SessionContext::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(response.status, QueryStatus::Done);
        for citation in &response.citations {
            assert!(second.chunk_ids.contains(&citation.chunk_id));
        }
    }
}
