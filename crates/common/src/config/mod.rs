//! Configuration management for the Veridoc engine
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with VERIDOC__)
//! - Configuration files (config/default, config/{env}, config/local)
//!
//! `fusion_weight` and `confidence_threshold` deliberately carry no
//! default: they must be supplied by the deployment or per query.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Chunking configuration
    pub chunking: ChunkingConfig,

    /// Retrieval configuration
    pub retrieval: RetrievalConfig,

    /// Reasoning agent configuration
    pub agent: AgentConfig,

    /// Ollama capability client configuration
    pub ollama: OllamaConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between successive chunks in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Weight of the vector branch in score fusion (0.0 - 1.0).
    /// Required: no default is assumed.
    pub fusion_weight: f32,

    /// Candidates requested from the vector branch
    #[serde(default = "default_top_k")]
    pub top_k_vector: usize,

    /// Candidates requested from the keyword branch
    #[serde(default = "default_top_k")]
    pub top_k_keyword: usize,

    /// Size of the fused candidate set before reranking
    #[serde(default = "default_top_k_fused")]
    pub top_k_fused: usize,

    /// Candidates surviving the rerank stage
    #[serde(default = "default_rerank_top_k")]
    pub rerank_top_k: usize,

    /// Cap on expanded parent context, in characters
    #[serde(default = "default_max_parent_chars")]
    pub max_parent_chars: usize,

    /// Deadline for each retrieval branch in milliseconds
    #[serde(default = "default_branch_timeout")]
    pub branch_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    /// Confidence required to finalize an answer (0.0 - 1.0).
    /// Required: no default is assumed.
    pub confidence_threshold: f32,

    /// Maximum re-search iterations before giving up
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Maximum retries for LLM and audit calls
    #[serde(default = "default_capability_retries")]
    pub capability_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OllamaConfig {
    /// Base URL of the Ollama server
    #[serde(default = "default_ollama_url")]
    pub base_url: String,

    /// Chat model used for generation, planning, and auditing
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Embedding model
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    /// Sampling temperature for generation
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds
    #[serde(default = "default_ollama_timeout")]
    pub timeout_secs: u64,

    /// Maximum elapsed retry time in seconds
    #[serde(default = "default_retry_budget")]
    pub retry_budget_secs: u64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            embedding_dimension: default_embedding_dimension(),
            temperature: default_temperature(),
            timeout_secs: default_ollama_timeout(),
            retry_budget_secs: default_retry_budget(),
        }
    }
}

// Default value functions
fn default_chunk_size() -> usize { 512 }
fn default_chunk_overlap() -> usize { 50 }
fn default_top_k() -> usize { 5 }
fn default_top_k_fused() -> usize { 10 }
fn default_rerank_top_k() -> usize { 5 }
fn default_max_parent_chars() -> usize { 2000 }
fn default_branch_timeout() -> u64 { 5000 }
fn default_max_iterations() -> u32 { 5 }
fn default_capability_retries() -> u32 { 3 }
fn default_ollama_url() -> String { "http://localhost:11434".to_string() }
fn default_chat_model() -> String { "llama3:8b".to_string() }
fn default_embedding_model() -> String { "mxbai-embed-large".to_string() }
fn default_embedding_dimension() -> usize { 1024 }
fn default_temperature() -> f32 { 0.1 }
fn default_ollama_timeout() -> u64 { 120 }
fn default_retry_budget() -> u64 { 30 }

impl EngineConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("VERIDOC_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with VERIDOC__ prefix
            // e.g., VERIDOC__RETRIEVAL__FUSION_WEIGHT=0.6
            .add_source(
                Environment::with_prefix("VERIDOC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("VERIDOC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get the per-branch retrieval deadline as Duration
    pub fn branch_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieval.branch_timeout_ms)
    }
}
