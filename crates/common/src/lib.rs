//! Veridoc Common Library
//!
//! Shared code for the Veridoc engine crates including:
//! - Error types and handling
//! - Configuration management
//! - External capability seams (embedding, LLM, audit, PII masking)
//! - Index adapter traits
//! - The in-process document store
//! - Session context and metrics

pub mod capabilities;
pub mod config;
pub mod errors;
pub mod index;
pub mod metrics;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use capabilities::{AuditVerdict, ContextBlock, QueryIntent};
pub use config::EngineConfig;
pub use errors::{EngineError, Result};
pub use index::{IndexHit, KeywordIndex, VectorIndex};
pub use store::{Chunk, DocumentStore, ParentDocument};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
