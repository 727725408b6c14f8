//! Embedding service abstraction
//!
//! Provides a unified interface over the embedding model used to place
//! queries and archive frames in the same vector space:
//! - HTTP service client (CLIP-style encoder behind an embeddings endpoint)
//! - Mock embedder for tests and local development
//!
//! Every vector handed out by this module is L2-normalized, so downstream
//! similarity is a plain dot product.

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Trait for query encoding
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Encode a single text into a normalized vector
    async fn encode_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Encode multiple texts (batch)
    async fn encode_text_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Encode a raw image into a normalized vector
    async fn encode_image(&self, image: &[u8]) -> Result<Vec<f32>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// L2-normalize a vector in place; a zero vector is left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Dot product of two equal-length vectors. On normalized inputs this is
/// cosine similarity.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// HTTP embedding client
pub struct HttpEmbedder {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    dimension: usize,
    base_url: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct EmbedRequest {
    input: Vec<String>,
    model: String,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedEntry>,
}

#[derive(Deserialize)]
struct EmbedEntry {
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        model: String,
        dimension: usize,
        timeout: Duration,
        max_retries: u32,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            model,
            dimension,
            base_url,
            max_retries,
        }
    }

    /// Make request with retry
    async fn request_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut last_error = None;

        for attempt in 0..self.max_retries.max(1) {
            if attempt > 0 {
                // Exponential backoff
                let delay = Duration::from_millis(100 * (2_u64.pow(attempt)));
                tokio::time::sleep(delay).await;
            }

            match self.make_request(texts).await {
                Ok(embeddings) => return Ok(embeddings),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        "Embedding request failed, retrying"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::EmbeddingError {
            message: "Unknown error after retries".to_string(),
        }))
    }

    async fn make_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);

        let request = EmbedRequest {
            input: texts.to_vec(),
            model: self.model.clone(),
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(|e| AppError::EmbeddingError {
            message: format!("Request failed: {}", e),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::EmbeddingError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: EmbedResponse =
            response.json().await.map_err(|e| AppError::EmbeddingError {
                message: format!("Failed to parse response: {}", e),
            })?;

        let mut embeddings: Vec<Vec<f32>> =
            result.data.into_iter().map(|e| e.embedding).collect();
        for v in &mut embeddings {
            self.check_dimension(v)?;
            l2_normalize(v);
        }
        Ok(embeddings)
    }

    fn check_dimension(&self, v: &[f32]) -> Result<()> {
        if v.len() != self.dimension {
            return Err(AppError::DimensionMismatch {
                expected: self.dimension,
                actual: v.len(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn encode_text(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.request_with_retry(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AppError::EmbeddingError {
                message: "Empty response".to_string(),
            })
    }

    async fn encode_text_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // Keep request bodies bounded
        const BATCH_SIZE: usize = 64;

        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(BATCH_SIZE) {
            let embeddings = self.request_with_retry(chunk).await?;
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    async fn encode_image(&self, image: &[u8]) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings/image", self.base_url);

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/octet-stream")
            .body(image.to_vec());
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(|e| AppError::EmbeddingError {
            message: format!("Request failed: {}", e),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::EmbeddingError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: EmbedEntry =
            response.json().await.map_err(|e| AppError::EmbeddingError {
                message: format!("Failed to parse response: {}", e),
            })?;

        let mut embedding = result.embedding;
        self.check_dimension(&embedding)?;
        l2_normalize(&mut embedding);
        Ok(embedding)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Mock embedder for testing
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn encode_text(&self, _text: &str) -> Result<Vec<f32>> {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let mut v: Vec<f32> = (0..self.dimension).map(|_| rng.gen::<f32>()).collect();
        l2_normalize(&mut v);
        Ok(v)
    }

    async fn encode_text_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for _ in texts {
            embeddings.push(self.encode_text("").await?);
        }
        Ok(embeddings)
    }

    async fn encode_image(&self, _image: &[u8]) -> Result<Vec<f32>> {
        self.encode_text("").await
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &crate::config::EmbeddingConfig) -> Arc<dyn Embedder> {
    match config.provider.as_str() {
        "http" => Arc::new(HttpEmbedder::new(
            config.api_base.clone(),
            config.api_key.clone(),
            config.model.clone(),
            config.dimension,
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )),
        "mock" => Arc::new(MockEmbedder::new(config.dimension)),
        other => {
            tracing::warn!(provider = other, "Unknown embedding provider, using mock");
            Arc::new(MockEmbedder::new(config.dimension))
        }
    }
}
