//! Embedding provider trait and implementations.
//!
//! This module defines the interface for generating embeddings
//! and provides an implementation for the Gemini embedding API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Default Gemini embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";

/// Default Gemini API base URL.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Errors that can occur during embedding generation.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("API request failed ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    NetworkError(String),
}

/// Trait for embedding providers.
///
/// Implementations should be Send + Sync to allow use in async contexts.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("No embedding returned".to_string()))
    }

    /// Embed multiple texts in a batch, one vector per text in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the maximum batch size supported.
    fn max_batch_size(&self) -> usize {
        100
    }
}

#[derive(Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedContentRequest>,
}

#[derive(Serialize)]
struct EmbedContentRequest {
    model: String,
    content: Content,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

/// Gemini embedding provider (`batchEmbedContents`).
pub struct GeminiEmbeddings {
    api_key: String,
    model: String,
    client: Client,
    base_url: String,
}

impl GeminiEmbeddings {
    /// Create a new Gemini embeddings provider.
    ///
    /// Uses `text-embedding-004` when no model is given.
    pub fn new(api_key: String, model: Option<String>) -> Self {
        Self {
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            client: Client::new(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
        }
    }

    /// Set a custom base URL (useful for testing or proxies).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Use a preconfigured HTTP client (timeouts, proxies).
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    async fn send_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/models/{}:batchEmbedContents", self.base_url, self.model);
        let model_ref = format!("models/{}", self.model);
        let request_body = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: model_ref.clone(),
                    content: Content {
                        parts: vec![Part { text: text.clone() }],
                    },
                })
                .collect(),
        };

        debug!("Sending embedding request for {} texts to {}", texts.len(), url);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| EmbeddingError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(EmbeddingError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: BatchEmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        if parsed.embeddings.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }

        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddings {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!("Embedding batch of {} texts", texts.len());
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.max_batch_size()) {
            vectors.extend(self.send_request(batch).await?);
        }
        Ok(vectors)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn provider(server: &MockServer) -> GeminiEmbeddings {
        GeminiEmbeddings::new("test-key".to_string(), None).with_base_url(server.base_url())
    }

    #[test]
    fn test_provider_creation() {
        let provider = GeminiEmbeddings::new("test-key".to_string(), None);
        assert_eq!(provider.model_name(), DEFAULT_EMBEDDING_MODEL);
        assert_eq!(provider.max_batch_size(), 100);
        assert_eq!(provider.base_url, DEFAULT_GEMINI_BASE_URL);
    }

    #[test]
    fn test_provider_with_base_url() {
        let provider = GeminiEmbeddings::new("test-key".to_string(), Some("custom".to_string()))
            .with_base_url("http://localhost:8080/v1beta/".to_string());
        assert_eq!(provider.base_url, "http://localhost:8080/v1beta");
        assert_eq!(provider.model_name(), "custom");
    }

    #[tokio::test]
    async fn test_embed_batch_returns_vectors_in_order() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/models/text-embedding-004:batchEmbedContents")
                .header("x-goog-api-key", "test-key");
            then.status(200).json_body(json!({
                "embeddings": [
                    { "values": [1.0, 0.0] },
                    { "values": [0.0, 1.0] }
                ]
            }));
        });

        let vectors = provider(&server)
            .embed_batch(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        mock.assert_calls(1);
    }

    #[tokio::test]
    async fn test_embed_batch_empty_input_skips_request() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST);
            then.status(500);
        });

        let vectors = provider(&server).embed_batch(&[]).await.unwrap();
        assert!(vectors.is_empty());
        mock.assert_calls(0);
    }

    #[tokio::test]
    async fn test_embed_batch_count_mismatch_is_invalid() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST);
            then.status(200).json_body(json!({ "embeddings": [ { "values": [1.0] } ] }));
        });

        let err = provider(&server)
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_api_error_carries_status() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST);
            then.status(400).body("bad request");
        });

        let err = provider(&server).embed("query").await.unwrap_err();
        match err {
            EmbeddingError::ApiError { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("bad request"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
