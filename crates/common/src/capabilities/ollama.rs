//! Ollama-backed capability client
//!
//! Implements the embedding, generation, planning, and audit seams
//! against a local Ollama server. Transport failures are retried with
//! bounded exponential backoff; unparseable model output degrades to
//! conservative defaults (search on plan, 0.5 on audit) instead of
//! failing the query.

use super::{
    AnswerAuditor, AuditVerdict, ContextBlock, Embedder, IntentClassifier, LanguageModel,
    QueryIntent,
};
use crate::config::OllamaConfig;
use crate::errors::{EngineError, Result};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Capability client for a local Ollama server
pub struct OllamaClient {
    client: reqwest::Client,
    config: OllamaConfig,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    options: ChatOptions,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    prompt: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaClient {
    /// Create a new client from configuration
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    fn retry_policy(&self) -> backoff::ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(250))
            .with_max_elapsed_time(Some(Duration::from_secs(self.config.retry_budget_secs)))
            .build()
    }

    /// Chat completion with bounded retries on transport failures
    async fn chat(&self, system: &str, user: &str, temperature: f32) -> Result<String> {
        let op = || async {
            self.chat_once(system, user, temperature).await.map_err(|e| {
                if e.is_transient() {
                    tracing::warn!(error = %e, "Ollama chat failed, retrying");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        };

        backoff::future::retry(self.retry_policy(), op).await
    }

    async fn chat_once(&self, system: &str, user: &str, temperature: f32) -> Result<String> {
        let url = format!("{}/api/chat", self.config.base_url);

        let request = ChatRequest {
            model: self.config.chat_model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            options: ChatOptions { temperature },
            stream: false,
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Generation {
                message: format!("Ollama API error {}: {}", status, body),
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Generation {
                message: format!("Failed to parse Ollama response: {}", e),
            })?;

        Ok(chat.message.content)
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.config.base_url);

        let request = EmbeddingRequest {
            model: self.config.embedding_model.clone(),
            prompt: text.to_string(),
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Embedding {
                message: format!("Ollama API error {}: {}", status, body),
            });
        }

        let parsed: EmbeddingResponse =
            response.json().await.map_err(|e| EngineError::Embedding {
                message: format!("Failed to parse embedding response: {}", e),
            })?;

        Ok(parsed.embedding)
    }
}

/// Render numbered context blocks for a prompt
fn render_context(context: &[ContextBlock]) -> String {
    let mut out = String::new();
    for block in context {
        out.push_str(&format!(
            "[{}] ({})\n{}\n\n",
            block.ordinal, block.source_name, block.text
        ));
    }
    out
}

/// Pull the first float off a `LABEL: value` line, clamped to [0, 1]
fn parse_score_line(text: &str, label: &str) -> Option<f32> {
    let number = regex_lite::Regex::new(r"\d*\.?\d+").unwrap();
    let line = text
        .lines()
        .find(|l| l.trim_start().to_uppercase().starts_with(label))?;
    let m = number.find(line)?;
    m.as_str().parse::<f32>().ok().map(|v| v.clamp(0.0, 1.0))
}

fn parse_refined_line(text: &str) -> Option<String> {
    let line = text
        .lines()
        .find(|l| l.trim_start().to_uppercase().starts_with("REFINED:"))?;
    let value = line.splitn(2, ':').nth(1)?.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(value.to_string())
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let op = || async {
            self.embed_once(text).await.map_err(|e| {
                if e.is_transient() {
                    tracing::warn!(error = %e, "Embedding request failed, retrying");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        };

        backoff::future::retry(self.retry_policy(), op).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // The embeddings endpoint takes one prompt per call
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        &self.config.embedding_model
    }

    fn dimension(&self) -> usize {
        self.config.embedding_dimension
    }
}

#[async_trait]
impl IntentClassifier for OllamaClient {
    async fn classify(&self, query: &str) -> Result<QueryIntent> {
        let user = format!(
            "Decide whether answering the question requires searching the indexed documents, \
            or whether it can be answered directly from general knowledge.\n\n\
            Question: {}\n\n\
            Reply in the format:\nSEARCH: YES or NO",
            query
        );

        let reply = self
            .chat(
                "You are a precise planning assistant for document search.",
                &user,
                self.config.temperature,
            )
            .await?;

        let upper = reply.to_uppercase();
        if upper.contains("SEARCH: NO") {
            Ok(QueryIntent::DirectAnswer)
        } else {
            // Unparseable output defaults to the safe choice
            Ok(QueryIntent::NeedsSearch)
        }
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn generate(&self, query: &str, context: &[ContextBlock]) -> Result<String> {
        let user = if context.is_empty() {
            format!("Answer the following question precisely:\n\nQuestion: {}\n\nAnswer:", query)
        } else {
            format!(
                "Based on the following documents, answer the question precisely. \
                Cite the relevant passages with [1], [2], etc.\n\n\
                Documents:\n{}\nQuestion: {}\n\nAnswer:",
                render_context(context),
                query
            )
        };

        self.chat(
            "You are a precise, fact-based assistant. Answer only with verified information.",
            &user,
            self.config.temperature,
        )
        .await
    }
}

#[async_trait]
impl AnswerAuditor for OllamaClient {
    async fn audit(&self, draft_answer: &str, context: &[ContextBlock]) -> Result<AuditVerdict> {
        let user = format!(
            "Check whether the following answer is supported by the provided documents. \
            Rate the support on a scale from 0.0 to 1.0.\n\n\
            Documents:\n{}\nAnswer:\n{}\n\n\
            Reply in the format:\nSCORE: <number between 0.0 and 1.0>\n\
            REFINED: <a better search query if the answer is poorly supported, or NONE>",
            render_context(context),
            draft_answer
        );

        // Deterministic temperature for auditing
        let reply = self
            .chat("You are a strict fact checker.", &user, 0.0)
            .await?;

        let confidence = parse_score_line(&reply, "SCORE").unwrap_or(0.5);
        let refined_query = parse_refined_line(&reply);

        Ok(AuditVerdict {
            confidence,
            refined_query,
        })
    }
}
