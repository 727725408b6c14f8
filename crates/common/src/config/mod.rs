//! Configuration management for ShotScout
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Catalog source locations
    pub catalog: CatalogConfig,

    /// Worker pool sizing
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chat completion service (relevance scoring, query planning)
    #[serde(default)]
    pub chat: ChatConfig,

    /// Rerank stage configuration
    #[serde(default)]
    pub rerank: RerankConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    /// Archive root; the loader resolves the conventional sub-directories
    /// below it unless they are overridden individually.
    pub root: PathBuf,

    /// Shot metadata partitions: `<shots_dir>/<collection>/<video>.json`
    pub shots_dir: Option<PathBuf>,

    /// Dense similarity indexes: `<index_dir>/sim_{frame,shot}.{json,f32}`
    pub index_dir: Option<PathBuf>,

    /// Lexical artifacts: matrix.json, paths.json, vectorizer.json
    pub lexical_dir: Option<PathBuf>,

    /// Per-video frame vectors: `<vectors_dir>/<collection>/<video>.{json,f32}`
    pub vectors_dir: Option<PathBuf>,
}

impl CatalogConfig {
    pub fn shots_dir(&self) -> PathBuf {
        self.shots_dir
            .clone()
            .unwrap_or_else(|| self.root.join("shots"))
    }

    pub fn index_dir(&self) -> PathBuf {
        self.index_dir
            .clone()
            .unwrap_or_else(|| self.root.join("indexes"))
    }

    pub fn lexical_dir(&self) -> PathBuf {
        self.lexical_dir
            .clone()
            .unwrap_or_else(|| self.root.join("lexical"))
    }

    pub fn vectors_dir(&self) -> PathBuf {
        self.vectors_dir
            .clone()
            .unwrap_or_else(|| self.root.join("frame_vectors"))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Worker pool width for catalog loading
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Worker pool width for rerank batch dispatch
    #[serde(default = "default_pool_width")]
    pub rerank_pool_width: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: http, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for the embedding service
    pub api_key: Option<String>,

    /// Service base URL
    #[serde(default = "default_embedding_base")]
    pub api_base: String,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatConfig {
    /// API key for the completion service
    pub api_key: Option<String>,

    /// Service base URL
    #[serde(default = "default_chat_base")]
    pub api_base: String,

    /// Model to use
    #[serde(default = "default_chat_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_chat_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_chat_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RerankConfig {
    /// How many leading candidates are submitted to the scorer
    #[serde(default = "default_top_k_rerank")]
    pub top_k: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_max_workers() -> usize {
    16
}
fn default_pool_width() -> usize {
    8
}
fn default_embedding_provider() -> String {
    "http".to_string()
}
fn default_embedding_base() -> String {
    "http://localhost:8200/v1".to_string()
}
fn default_embedding_model() -> String {
    "clip-vit-l-14".to_string()
}
fn default_embedding_dimension() -> usize {
    768
}
fn default_embedding_timeout() -> u64 {
    30
}
fn default_embedding_retries() -> u32 {
    3
}
fn default_chat_base() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_chat_model() -> String {
    "gpt-4o".to_string()
}
fn default_chat_timeout() -> u64 {
    60
}
fn default_chat_retries() -> u32 {
    2
}
fn default_top_k_rerank() -> usize {
    50
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_json_logging() -> bool {
    true
}
fn default_service_name() -> String {
    "shotscout".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            rerank_pool_width: default_pool_width(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: default_embedding_base(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_chat_base(),
            model: default_chat_model(),
            timeout_secs: default_chat_timeout(),
            max_retries: default_chat_retries(),
        }
    }
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k_rerank(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            service_name: default_service_name(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        // Pick up a local .env before reading the environment
        dotenvy::dotenv().ok();

        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__CATALOG__ROOT=/data/archive
            .add_source(
                Environment::with_prefix("APP")
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
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get embedding request timeout as Duration
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding.timeout_secs)
    }

    /// Get chat request timeout as Duration
    pub fn chat_timeout(&self) -> Duration {
        Duration::from_secs(self.chat.timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            catalog: CatalogConfig {
                root: PathBuf::from("/data/archive"),
                shots_dir: None,
                index_dir: None,
                lexical_dir: None,
                vectors_dir: None,
            },
            runtime: RuntimeConfig::default(),
            embedding: EmbeddingConfig::default(),
            chat: ChatConfig::default(),
            rerank: RerankConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.runtime.max_workers, 16);
        assert_eq!(config.embedding.model, "clip-vit-l-14");
        assert_eq!(config.rerank.top_k, 50);
    }

    #[test]
    fn test_catalog_dir_conventions() {
        let config = AppConfig::default();
        assert_eq!(
            config.catalog.shots_dir(),
            PathBuf::from("/data/archive/shots")
        );
        assert_eq!(
            config.catalog.vectors_dir(),
            PathBuf::from("/data/archive/frame_vectors")
        );
    }

    #[test]
    fn test_catalog_dir_override() {
        let mut config = AppConfig::default();
        config.catalog.index_dir = Some(PathBuf::from("/ssd/indexes"));
        assert_eq!(config.catalog.index_dir(), PathBuf::from("/ssd/indexes"));
        assert_eq!(
            config.catalog.lexical_dir(),
            PathBuf::from("/data/archive/lexical")
        );
    }
}
