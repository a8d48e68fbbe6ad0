//! Embedding client abstraction and adapters.
//!
//! Chunk and query texts are vectorized through one of two backends: the
//! OpenAI-compatible embeddings API, or a deterministic byte-folding encoder
//! that needs no network and no credentials. The latter keeps the full
//! workflow usable offline and gives tests reproducible vectors.

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// The provider response could not be decoded.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied text, in input order.
    async fn embed(&self, api_key: &str, texts: Vec<String>)
    -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Build an embedding client suitable for the given configuration.
pub fn embedding_client_from_config(config: &Config) -> Box<dyn EmbeddingClient> {
    match config.embedding_provider {
        EmbeddingProvider::OpenAI => Box::new(OpenAiEmbeddingClient::new(
            config.llm_base_url.clone(),
            config.embedding_model.clone(),
        )),
        EmbeddingProvider::Hashed => Box::new(HashedEmbeddingClient::new(config.embedding_dimension)),
    }
}

/// Client for the OpenAI-compatible `/v1/embeddings` endpoint.
pub struct OpenAiEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OpenAiEmbeddingClient {
    /// Construct a client against the given API base URL and model.
    pub fn new(base_url: String, model: String) -> Self {
        let http = Client::builder()
            .user_agent("docuchat/embeddings")
            .build()
            .expect("Failed to construct reqwest::Client for embeddings");
        Self {
            http,
            base_url,
            model,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn embed(
        &self,
        api_key: &str,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Err(EmbeddingError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        let expected = texts.len();
        let payload = json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                EmbeddingError::ProviderUnavailable(format!(
                    "failed to reach embeddings API at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(EmbeddingError::GenerationFailed(
                "embeddings API rejected the supplied credentials".to_string(),
            ));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::GenerationFailed(format!(
                "embeddings API returned {status}: {body}"
            )));
        }

        let body: EmbeddingsResponse = response.json().await.map_err(|error| {
            EmbeddingError::InvalidResponse(format!("failed to decode embeddings response: {error}"))
        })?;

        if body.data.len() != expected {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {expected} vectors, got {}",
                body.data.len()
            )));
        }

        Ok(body.data.into_iter().map(|item| item.embedding).collect())
    }
}

/// Deterministic embedding client that folds bytes into a fixed-size vector.
///
/// Not a semantic model: nearby texts only score close when they share bytes.
/// It exists so the pipeline runs end to end without network access.
pub struct HashedEmbeddingClient {
    dimension: usize,
}

impl HashedEmbeddingClient {
    /// Construct a client producing vectors of the given dimension.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];
        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = idx % self.dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();
        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashedEmbeddingClient {
    async fn embed(
        &self,
        _api_key: &str,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if self.dimension == 0 {
            return Err(EmbeddingError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        if texts.is_empty() {
            return Err(EmbeddingError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        Ok(texts.iter().map(|text| self.encode(text)).collect())
    }
}
