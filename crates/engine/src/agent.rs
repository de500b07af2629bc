//! Reasoning agent state machine
//!
//! PLAN -> SEARCH -> GENERATE -> AUDIT as an explicit FSM driven by an
//! orchestrator loop. The iteration counter lives in `AgentState` and
//! strictly increases on every re-entry into SEARCHING, so a query
//! makes at most `max_iterations + 1` generation calls. Cancellation is
//! honored between states only.

use crate::cancel::CancellationToken;
use crate::citation::{self, Citation};
use crate::{DegradeFlags, QueryOptions, INSUFFICIENT_ANSWER};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use veridoc_common::capabilities::{
    AnswerAuditor, ContextBlock, IntentClassifier, LanguageModel, QueryIntent,
};
use veridoc_common::errors::{EngineError, Result};
use veridoc_retrieval::{HybridRetriever, Reranker, RetrievalRequest, SearchCandidate};

/// Agent lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStatus {
    Planning,
    Searching,
    Generating,
    Auditing,
    /// Terminal: answer met the confidence threshold
    Done,
    /// Terminal: retrieval found nothing
    Insufficient,
    /// Terminal: iteration budget spent below the threshold
    Exhausted,
}

impl AgentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentStatus::Done | AgentStatus::Insufficient | AgentStatus::Exhausted
        )
    }
}

/// Per-query agent state. Created for one query, mutated only by the
/// transition methods below, discarded after the response is built.
#[derive(Debug, Clone)]
pub struct AgentState {
    pub query: String,
    pub iteration: u32,
    pub max_iterations: u32,
    pub retrieved: Vec<SearchCandidate>,
    pub draft_answer: String,
    pub confidence: f32,
    pub citations: Vec<Citation>,
    pub status: AgentStatus,
}

impl AgentState {
    fn new(query: String, max_iterations: u32) -> Self {
        Self {
            query,
            iteration: 0,
            max_iterations,
            retrieved: Vec::new(),
            draft_answer: String::new(),
            confidence: 0.0,
            citations: Vec::new(),
            status: AgentStatus::Planning,
        }
    }
}

/// Everything one agent run needs
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub query: String,
    pub options: QueryOptions,

    /// Size of the fused candidate set before reranking
    pub top_k_fused: usize,

    /// Deadline for each retrieval branch
    pub branch_timeout: Duration,
}

/// Finished run: terminal state plus observed degradation
#[derive(Debug)]
pub struct AgentRun {
    pub state: AgentState,
    pub degraded: DegradeFlags,
}

/// Orchestrates one query through the reasoning loop
pub struct ReasoningAgent {
    classifier: Arc<dyn IntentClassifier>,
    generator: Arc<dyn LanguageModel>,
    auditor: Arc<dyn AnswerAuditor>,
    retriever: Arc<HybridRetriever>,
    reranker: Arc<Reranker>,

    /// Attempts per generate/audit call before GenerationError
    capability_retries: u32,
}

impl ReasoningAgent {
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        generator: Arc<dyn LanguageModel>,
        auditor: Arc<dyn AnswerAuditor>,
        retriever: Arc<HybridRetriever>,
        reranker: Arc<Reranker>,
        capability_retries: u32,
    ) -> Self {
        Self {
            classifier,
            generator,
            auditor,
            retriever,
            reranker,
            capability_retries: capability_retries.max(1),
        }
    }

    /// Run the state machine to a terminal state
    pub async fn run(&self, request: AgentRequest, cancel: &CancellationToken) -> Result<AgentRun> {
        let mut state = AgentState::new(request.query.clone(), request.options.max_iterations);
        let mut degraded = DegradeFlags::default();

        while !state.status.is_terminal() {
            // State-transition checkpoint: the only place cancellation
            // is observed
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            match state.status {
                AgentStatus::Planning => self.plan(&mut state).await,
                AgentStatus::Searching => self.search(&mut state, &request, &mut degraded).await?,
                AgentStatus::Generating => self.generate(&mut state).await?,
                AgentStatus::Auditing => self.audit(&mut state, &request.options).await?,
                _ => unreachable!("terminal states exit the loop"),
            }
        }

        info!(
            status = ?state.status,
            iterations = state.iteration,
            confidence = state.confidence,
            "Agent run finished"
        );

        Ok(AgentRun { state, degraded })
    }

    async fn plan(&self, state: &mut AgentState) {
        let intent = match self.classifier.classify(&state.query).await {
            Ok(intent) => intent,
            Err(e) => {
                // Planning failure falls back to the safe choice
                warn!(error = %e, "Intent classification failed, defaulting to search");
                QueryIntent::NeedsSearch
            }
        };

        debug!(?intent, "Plan complete");
        state.status = match intent {
            QueryIntent::DirectAnswer => AgentStatus::Generating,
            QueryIntent::NeedsSearch => AgentStatus::Searching,
        };
    }

    async fn search(
        &self,
        state: &mut AgentState,
        request: &AgentRequest,
        degraded: &mut DegradeFlags,
    ) -> Result<()> {
        let retrieval = RetrievalRequest {
            query: state.query.clone(),
            top_k_vector: request.options.top_k_vector,
            top_k_keyword: request.options.top_k_keyword,
            fusion_weight: request.options.fusion_weight,
            top_k_fused: request.top_k_fused,
            max_parent_chars: request.options.max_parent_chars,
            branch_timeout: request.branch_timeout,
        };

        let outcome = self.retriever.retrieve(&retrieval).await?;
        degraded.vector |= outcome.vector_degraded;
        degraded.keyword |= outcome.keyword_degraded;

        let reranked = self
            .reranker
            .rerank(&state.query, outcome.candidates, request.options.rerank_top_k)
            .await;
        degraded.rerank |= reranked.degraded;

        if reranked.candidates.is_empty() {
            state.retrieved.clear();
            state.confidence = 0.0;
            state.draft_answer = INSUFFICIENT_ANSWER.to_string();
            state.status = AgentStatus::Insufficient;
            return Ok(());
        }

        debug!(candidates = reranked.candidates.len(), "Search complete");
        state.retrieved = reranked.candidates;
        state.status = AgentStatus::Generating;
        Ok(())
    }

    async fn generate(&self, state: &mut AgentState) -> Result<()> {
        let context = context_blocks(&state.retrieved);
        state.draft_answer = self
            .with_retries("generate", || self.generator.generate(&state.query, &context))
            .await?;
        state.status = AgentStatus::Auditing;
        Ok(())
    }

    async fn audit(&self, state: &mut AgentState, options: &QueryOptions) -> Result<()> {
        let context = context_blocks(&state.retrieved);
        let verdict = self
            .with_retries("audit", || self.auditor.audit(&state.draft_answer, &context))
            .await?;

        state.confidence = verdict.confidence.clamp(0.0, 1.0);
        debug!(
            confidence = state.confidence,
            iteration = state.iteration,
            "Audit complete"
        );

        if state.confidence >= options.confidence_threshold {
            state.citations = citation::extract(&state.draft_answer, &state.retrieved);
            state.status = AgentStatus::Done;
        } else if state.iteration < state.max_iterations {
            state.iteration += 1;
            if let Some(refined) = verdict.refined_query {
                debug!(refined = %refined, "Adopting refined query");
                state.query = refined;
            }
            state.status = AgentStatus::Searching;
        } else {
            // Budget spent: keep the draft and its computed confidence
            state.citations = citation::extract(&state.draft_answer, &state.retrieved);
            state.status = AgentStatus::Exhausted;
        }
        Ok(())
    }

    /// Bounded retry with exponential delay for generate/audit calls
    async fn with_retries<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 0..self.capability_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(100 * (1 << attempt.min(6)));
                tokio::time::sleep(delay).await;
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(
                        what,
                        attempt = attempt + 1,
                        max_attempts = self.capability_retries,
                        error = %e,
                        "Capability call failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(EngineError::Generation {
            message: format!(
                "{} failed after {} attempts: {}",
                what,
                self.capability_retries,
                last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown error".to_string())
            ),
        })
    }
}

/// Number the retrieved candidates for generation and auditing.
///
/// The block text is the expanded parent excerpt: retrieval is
/// chunk-granular, generation context is parent-level.
fn context_blocks(retrieved: &[SearchCandidate]) -> Vec<ContextBlock> {
    retrieved
        .iter()
        .enumerate()
        .map(|(idx, candidate)| ContextBlock {
            ordinal: idx + 1,
            source_name: candidate.source_name.clone(),
            text: candidate.context.clone(),
        })
        .collect()
}
