//! ShotScout Common Library
//!
//! Shared code for the ShotScout retrieval engine:
//! - In-memory catalog store (metadata, search indexes, vector blocks)
//! - Embedding and chat completion clients
//! - Relevance scoring abstraction
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod catalog;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod scoring;

// Re-export commonly used types
pub use catalog::{CatalogStore, Frame, Granularity, Modality, Shot};
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use llm::ChatCompleter;
pub use scoring::RelevanceScorer;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "clip-vit-l-14";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;
