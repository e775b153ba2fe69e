//! Embedding client abstraction and HTTP adapters.
//!
//! Both adapters talk to their provider over plain `reqwest` and batch inputs so large
//! documents do not produce a single oversized request.

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

const EMBEDDING_BATCH_SIZE: usize = 32;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider answered with a payload we could not use.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied chunk of text, preserving order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Build the embedding client selected by configuration.
pub fn build_embedding_client(
    config: &Config,
) -> Result<Arc<dyn EmbeddingClient>, EmbeddingClientError> {
    let http = Client::builder()
        .user_agent("pdfrag/embed")
        .build()
        .map_err(|error| EmbeddingClientError::ProviderUnavailable(error.to_string()))?;

    tracing::debug!(
        provider = ?config.embedding_provider,
        model = %config.embedding_model,
        dimension = config.embedding_dimension,
        "Building embedding client"
    );

    Ok(match config.embedding_provider {
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbeddingClient {
            http,
            base_url: config.ollama_url.clone(),
            model: config.embedding_model.clone(),
        }),
        EmbeddingProvider::OpenAI => Arc::new(OpenAiEmbeddingClient {
            http,
            base_url: config.openai_base_url.clone(),
            api_key: config.openai_api_key.clone().unwrap_or_default(),
            model: config.embedding_model.clone(),
        }),
    })
}

/// Embeddings served by a local Ollama runtime via `POST /api/embed`.
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbeddingClient {
    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let endpoint = format!("{}/api/embed", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&endpoint)
            .json(&json!({ "model": self.model, "input": batch }))
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let payload: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|error| EmbeddingClientError::InvalidResponse(error.to_string()))?;
        Ok(payload.embeddings)
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        embed_in_batches(&texts, |batch| self.embed_batch(batch)).await
    }
}

/// Embeddings served by an OpenAI-compatible `POST /embeddings` endpoint.
pub struct OpenAiEmbeddingClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Deserialize)]
struct OpenAiEmbedding {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbeddingClient {
    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let endpoint = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": batch }))
            .send()
            .await
            .map_err(|error| EmbeddingClientError::ProviderUnavailable(error.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "OpenAI returned {status}: {body}"
            )));
        }

        let mut payload: OpenAiEmbeddingResponse = response
            .json()
            .await
            .map_err(|error| EmbeddingClientError::InvalidResponse(error.to_string()))?;
        payload.data.sort_by_key(|item| item.index);
        Ok(payload.data.into_iter().map(|item| item.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        embed_in_batches(&texts, |batch| self.embed_batch(batch)).await
    }
}

async fn embed_in_batches<'a, F, Fut>(
    texts: &'a [String],
    mut embed: F,
) -> Result<Vec<Vec<f32>>, EmbeddingClientError>
where
    F: FnMut(&'a [String]) -> Fut,
    Fut: std::future::Future<Output = Result<Vec<Vec<f32>>, EmbeddingClientError>>,
{
    if texts.is_empty() {
        return Err(EmbeddingClientError::GenerationFailed(
            "no texts provided".to_string(),
        ));
    }

    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(EMBEDDING_BATCH_SIZE) {
        let embedded = embed(batch).await?;
        if embedded.len() != batch.len() {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "expected {} vectors, received {}",
                batch.len(),
                embedded.len()
            )));
        }
        vectors.extend(embedded);
    }
    tracing::debug!(count = vectors.len(), "Generated embeddings");
    Ok(vectors)
}
