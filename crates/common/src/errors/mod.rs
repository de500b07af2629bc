//! Error types for the Veridoc engine
//!
//! Provides:
//! - Distinct error types for each failure mode of ingest/query
//! - Machine-readable error kinds with stable numeric codes
//! - A retryability classification used by the backoff layer

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error kinds for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    // Validation errors (1xxx)
    ValidationError,
    MissingField,

    // Ingestion errors (2xxx)
    IngestionError,
    DocumentNotFound,

    // Index errors (3xxx)
    IndexUnavailable,
    EmbeddingError,

    // Generation errors (4xxx)
    GenerationError,

    // Lifecycle (5xxx)
    Cancelled,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
    UpstreamError,
}

impl ErrorKind {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorKind::ValidationError => 1001,
            ErrorKind::MissingField => 1002,

            // Ingestion (2xxx)
            ErrorKind::IngestionError => 2001,
            ErrorKind::DocumentNotFound => 2002,

            // Index (3xxx)
            ErrorKind::IndexUnavailable => 3001,
            ErrorKind::EmbeddingError => 3002,

            // Generation (4xxx)
            ErrorKind::GenerationError => 4001,

            // Lifecycle (5xxx)
            ErrorKind::Cancelled => 5001,

            // Internal (9xxx)
            ErrorKind::InternalError => 9001,
            ErrorKind::ConfigurationError => 9002,
            ErrorKind::SerializationError => 9003,
            ErrorKind::UpstreamError => 9004,
        }
    }
}

/// Engine error types
#[derive(Error, Debug)]
pub enum EngineError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    // Ingestion errors
    #[error("Ingestion rejected: {message}")]
    Ingestion { message: String },

    #[error("Document not found: {id}")]
    DocumentNotFound { id: String },

    // Index errors
    #[error("{index} index unavailable: {message}")]
    IndexUnavailable { index: String, message: String },

    #[error("Embedding service error: {message}")]
    Embedding { message: String },

    // Generation errors (LLM or audit call, after retries)
    #[error("Generation failed: {message}")]
    Generation { message: String },

    // Lifecycle
    #[error("Query cancelled")]
    Cancelled,

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Get the error kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation { .. } => ErrorKind::ValidationError,
            EngineError::MissingField { .. } => ErrorKind::MissingField,
            EngineError::Ingestion { .. } => ErrorKind::IngestionError,
            EngineError::DocumentNotFound { .. } => ErrorKind::DocumentNotFound,
            EngineError::IndexUnavailable { .. } => ErrorKind::IndexUnavailable,
            EngineError::Embedding { .. } => ErrorKind::EmbeddingError,
            EngineError::Generation { .. } => ErrorKind::GenerationError,
            EngineError::Cancelled => ErrorKind::Cancelled,
            EngineError::Internal { .. } => ErrorKind::InternalError,
            EngineError::Configuration { .. } => ErrorKind::ConfigurationError,
            EngineError::Serialization(_) => ErrorKind::SerializationError,
            EngineError::HttpClient(_) => ErrorKind::UpstreamError,
            EngineError::Other(_) => ErrorKind::InternalError,
        }
    }

    /// Whether the failure is transient and worth retrying with backoff.
    ///
    /// Validation and ingestion rejections are permanent; index and
    /// upstream transport failures may clear on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::IndexUnavailable { .. }
                | EngineError::Embedding { .. }
                | EngineError::HttpClient(_)
        )
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Internal {
            message: err.to_string(),
        }
    }
}

/// Structured error payload returned to callers
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub code: u16,
    pub message: String,
}

impl From<&EngineError> for ErrorResponse {
    fn from(err: &EngineError) -> Self {
        let kind = err.kind();
        Self {
            kind,
            code: kind.as_code(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        let err = EngineError::Ingestion {
            message: "empty text".into(),
        };
        assert_eq!(err.kind(), ErrorKind::IngestionError);
        assert_eq!(err.kind().as_code(), 2001);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_transient_classification() {
        let err = EngineError::IndexUnavailable {
            index: "vector".into(),
            message: "connection refused".into(),
        };
        assert!(err.is_transient());

        let err = EngineError::Validation {
            message: "fusion_weight out of range".into(),
            field: Some("fusion_weight".into()),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn test_error_response_payload() {
        let err = EngineError::Generation {
            message: "model timed out".into(),
        };
        let payload = ErrorResponse::from(&err);
        assert_eq!(payload.code, 4001);
        assert!(payload.message.contains("model timed out"));
    }
}
