//! Error types for ShotScout
//!
//! Provides:
//! - Distinct error types for startup, per-query, per-candidate and
//!   per-batch failure modes
//! - Machine-readable error codes for observability
//! - Fatal vs. recoverable classification

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{Granularity, Modality};

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    EmptyQuery,

    // Resource errors (4xxx)
    FrameNotFound,
    ShotNotFound,
    IndexNotFound,
    BlockNotFound,

    // Catalog/startup errors (7xxx)
    CatalogSourceError,
    CatalogInconsistent,

    // External service errors (8xxx)
    EmbeddingError,
    EmbeddingTimeout,
    DimensionMismatch,
    ScorerError,
    ChatError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
    IoError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::EmptyQuery => 1002,

            ErrorCode::FrameNotFound => 4001,
            ErrorCode::ShotNotFound => 4002,
            ErrorCode::IndexNotFound => 4003,
            ErrorCode::BlockNotFound => 4004,

            ErrorCode::CatalogSourceError => 7001,
            ErrorCode::CatalogInconsistent => 7002,

            ErrorCode::EmbeddingError => 8001,
            ErrorCode::EmbeddingTimeout => 8002,
            ErrorCode::DimensionMismatch => 8003,
            ErrorCode::ScorerError => 8004,
            ErrorCode::ChatError => 8005,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
            ErrorCode::IoError => 9004,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Query must not be empty")]
    EmptyQuery,

    // Resource errors
    #[error("Frame not found: {path}")]
    FrameNotFound { path: String },

    #[error("Shot not found: {path}")]
    ShotNotFound { path: String },

    #[error("No index registered for {modality:?}/{granularity:?}")]
    IndexNotFound {
        modality: Modality,
        granularity: Granularity,
    },

    #[error("No embedding block loaded for {collection}/{video}")]
    BlockNotFound { collection: String, video: String },

    // Catalog/startup errors
    #[error("Catalog source error in {source_path}: {message}")]
    CatalogSource {
        source_path: String,
        message: String,
    },

    #[error("Catalog inconsistent: {message}")]
    CatalogInconsistent { message: String },

    // External service errors
    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("Embedding timeout after {timeout_ms}ms")]
    EmbeddingTimeout { timeout_ms: u64 },

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Relevance scorer error: {message}")]
    ScorerError { message: String },

    #[error("Chat completion error: {message}")]
    ChatError { message: String },

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::EmptyQuery => ErrorCode::EmptyQuery,
            AppError::FrameNotFound { .. } => ErrorCode::FrameNotFound,
            AppError::ShotNotFound { .. } => ErrorCode::ShotNotFound,
            AppError::IndexNotFound { .. } => ErrorCode::IndexNotFound,
            AppError::BlockNotFound { .. } => ErrorCode::BlockNotFound,
            AppError::CatalogSource { .. } => ErrorCode::CatalogSourceError,
            AppError::CatalogInconsistent { .. } => ErrorCode::CatalogInconsistent,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::EmbeddingTimeout { .. } => ErrorCode::EmbeddingTimeout,
            AppError::DimensionMismatch { .. } => ErrorCode::DimensionMismatch,
            AppError::ScorerError { .. } => ErrorCode::ScorerError,
            AppError::ChatError { .. } => ErrorCode::ChatError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Io(_) => ErrorCode::IoError,
            AppError::HttpClient(_) => ErrorCode::EmbeddingError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Whether this error must abort startup (a catalog precondition is
    /// violated) rather than be reported back to the caller of one query.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::CatalogSource { .. } | AppError::CatalogInconsistent { .. }
        )
    }

    /// Whether this error describes a caller-side configuration problem
    /// (unsupported combination, empty query) as opposed to a runtime fault.
    /// Lets callers distinguish "empty because no matches" from "empty
    /// because misconfigured".
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AppError::Validation { .. }
                | AppError::EmptyQuery
                | AppError::IndexNotFound { .. }
                | AppError::Configuration { .. }
        )
    }
}
