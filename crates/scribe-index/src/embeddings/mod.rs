//! Embedding provider trait and implementations.
//!
//! Providers turn text into vectors. [`EmbeddingBatcher`] sits in front of a
//! provider and keeps every call inside its size limits.

pub mod batcher;

pub use batcher::{BatchConfig, BatchConfigError, EmbeddedPiece, EmbeddingBatcher};

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur during embedding generation.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("API request failed ({status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited after {0} retries")]
    RateLimited(u32),

    #[error("Network error: {0}")]
    NetworkError(String),
}

/// Trait for embedding providers.
///
/// `embed_batch` must return exactly one vector per input, in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed multiple texts in a batch
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the number of dimensions
    fn dimensions(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Request body for the `/embeddings` endpoint
#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

/// Response from the `/embeddings` endpoint
#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

/// Individual embedding data in response
#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Embedding provider for any OpenAI-compatible `/embeddings` API.
pub struct OpenAiEmbeddings {
    api_key: String,
    model: String,
    dimensions: usize,
    send_dimensions: bool,
    client: Client,
    base_url: String,
    max_retries: u32,
}

impl OpenAiEmbeddings {
    /// Create a provider for `model` producing `dimensions`-sized vectors.
    ///
    /// Defaults to `text-embedding-3-small` (1536 dimensions) at the OpenAI API.
    pub fn new(api_key: String, model: Option<String>, dimensions: Option<usize>) -> Self {
        Self {
            api_key,
            model: model.unwrap_or_else(|| "text-embedding-3-small".to_string()),
            send_dimensions: dimensions.is_some(),
            dimensions: dimensions.unwrap_or(1536),
            client: Client::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            max_retries: 3,
        }
    }

    /// Set a custom API base URL (proxies, local servers, tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Maximum retries after a 429 response.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }

    /// Send embedding request with retry logic for rate limits.
    async fn send_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request_body = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.send_dimensions.then_some(self.dimensions),
        };
        let url = self.endpoint();

        let mut retry_count = 0;
        let mut backoff_secs = 1u64;

        loop {
            debug!("Sending embedding request for {} texts to {}", texts.len(), url);

            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request_body)
                .send()
                .await
                .map_err(|e| EmbeddingError::NetworkError(e.to_string()))?;

            let status = response.status();

            if status.is_success() {
                let embedding_response: EmbeddingResponse = response
                    .json()
                    .await
                    .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

                return Ok(order_embeddings(embedding_response.data, texts.len())?);
            }

            if status.as_u16() == 429 {
                retry_count += 1;
                if retry_count > self.max_retries {
                    return Err(EmbeddingError::RateLimited(self.max_retries).into());
                }

                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(backoff_secs);

                warn!(
                    "Rate limited, retrying after {} seconds (attempt {}/{})",
                    retry_after, retry_count, self.max_retries
                );

                tokio::time::sleep(Duration::from_secs(retry_after)).await;
                backoff_secs *= 2;
                continue;
            }

            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(EmbeddingError::ApiError {
                status: status.as_u16(),
                body,
            }
            .into());
        }
    }
}

/// Sort response items by `index` and check there is one per input.
fn order_embeddings(
    data: Vec<EmbeddingData>,
    expected: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if data.len() != expected {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {} embeddings, got {}",
            expected,
            data.len()
        )));
    }

    let mut embeddings: Vec<(usize, Vec<f32>)> =
        data.into_iter().map(|d| (d.index, d.embedding)).collect();
    embeddings.sort_by_key(|(idx, _)| *idx);

    if embeddings.iter().enumerate().any(|(i, (idx, _))| i != *idx) {
        return Err(EmbeddingError::InvalidResponse(
            "response indices do not cover the request".to_string(),
        ));
    }

    Ok(embeddings.into_iter().map(|(_, emb)| emb).collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("no embedding returned".into()).into())
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!("Embedding batch of {} texts", texts.len());
        self.send_request(texts).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Cosine similarity of two vectors; 0.0 for mismatched, empty or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut mag_a = 0.0f32;
    let mut mag_b = 0.0f32;
    for (ai, bi) in a.iter().zip(b.iter()) {
        dot += ai * bi;
        mag_a += ai * ai;
        mag_b += bi * bi;
    }
    let mag = (mag_a * mag_b).sqrt();
    if mag == 0.0 {
        0.0
    } else {
        dot / mag
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_creation() {
        let provider = OpenAiEmbeddings::new("test-key".to_string(), None, None);
        assert_eq!(provider.dimensions(), 1536);
        assert_eq!(provider.model_name(), "text-embedding-3-small");
        assert_eq!(provider.endpoint(), "https://api.openai.com/v1/embeddings");
        assert!(!provider.send_dimensions);
    }

    #[test]
    fn test_provider_custom_model() {
        let provider = OpenAiEmbeddings::new(
            "test-key".to_string(),
            Some("custom/model".to_string()),
            Some(1024),
        );
        assert_eq!(provider.dimensions(), 1024);
        assert_eq!(provider.model_name(), "custom/model");
        assert!(provider.send_dimensions);
    }

    #[test]
    fn test_provider_with_base_url() {
        let provider = OpenAiEmbeddings::new("test-key".to_string(), None, None)
            .with_base_url("http://localhost:8080/v1/");
        assert_eq!(provider.endpoint(), "http://localhost:8080/v1/embeddings");
    }

    #[test]
    fn test_order_embeddings_sorts_by_index() {
        let data = vec![
            EmbeddingData { embedding: vec![2.0], index: 2 },
            EmbeddingData { embedding: vec![0.0], index: 0 },
            EmbeddingData { embedding: vec![1.0], index: 1 },
        ];
        let ordered = order_embeddings(data, 3).unwrap();
        assert_eq!(ordered, vec![vec![0.0], vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_order_embeddings_rejects_count_mismatch() {
        let data = vec![EmbeddingData { embedding: vec![0.0], index: 0 }];
        assert!(matches!(
            order_embeddings(data, 2),
            Err(EmbeddingError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_order_embeddings_rejects_duplicate_index() {
        let data = vec![
            EmbeddingData { embedding: vec![0.0], index: 0 },
            EmbeddingData { embedding: vec![0.0], index: 0 },
        ];
        assert!(order_embeddings(data, 2).is_err());
    }

    #[test]
    fn test_request_serialization() {
        let input = vec!["a".to_string()];
        let body = EmbeddingRequest {
            model: "m",
            input: &input,
            dimensions: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({"model": "m", "input": ["a"]}));
    }

    #[test]
    fn test_cosine_similarity() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
