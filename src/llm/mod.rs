//! Chat-model clients for answer generation and image description.
//!
//! Both roles speak the Ollama `/api/chat` protocol: answers go to the hosted endpoint with a
//! bearer credential, image descriptions go to the local runtime with the image attached as
//! base64. Requests are non-streaming.

use crate::config::Config;
use crate::prompts::IMAGE_DESCRIPTION_PROMPT;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::Path;
use thiserror::Error;

/// Errors surfaced while calling a chat model.
#[derive(Debug, Error)]
pub enum LlmClientError {
    /// Provider could not be reached or the endpoint does not exist.
    #[error("Model provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Model call failed: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// Local image could not be read before sending.
    #[error("Failed to read image {path}: {source}")]
    ImageRead {
        /// Image path that failed to load.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}

/// Produces free-text answers for fully rendered prompts.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Submit a prompt and return the model's reply text.
    async fn generate(&self, prompt: &str) -> Result<String, LlmClientError>;
}

/// Describes the content of a local image file.
#[async_trait]
pub trait VisionClient: Send + Sync {
    /// Return a textual description of the image at `path`.
    async fn describe_image(&self, path: &Path) -> Result<String, LlmClientError>;
}

/// Client for the Ollama chat API, usable for both generation and vision roles.
pub struct OllamaChatClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f32>,
}

impl OllamaChatClient {
    /// Build the answer-generation client against the hosted endpoint.
    pub fn for_generation(config: &Config) -> Result<Self, LlmClientError> {
        Self::new(
            "pdfrag/generate",
            &config.llm_base_url,
            &config.llm_model,
            Some(config.llm_api_key.clone()),
            Some(config.llm_temperature),
        )
    }

    /// Build the image-description client against the local runtime.
    pub fn for_vision(config: &Config) -> Result<Self, LlmClientError> {
        Self::new(
            "pdfrag/vision",
            &config.ollama_url,
            &config.vision_model,
            None,
            None,
        )
    }

    fn new(
        user_agent: &str,
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        temperature: Option<f32>,
    ) -> Result<Self, LlmClientError> {
        let http = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|error| LlmClientError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.to_string(),
            model: model.to_string(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }

    async fn chat(&self, message: Value) -> Result<String, LlmClientError> {
        let mut payload = json!({
            "model": self.model,
            "messages": [message],
            "stream": false,
        });
        if let Some(temperature) = self.temperature
            && let Some(object) = payload.as_object_mut()
        {
            object.insert("options".into(), json!({ "temperature": temperature }));
        }

        let mut request = self.http.post(self.endpoint()).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|error| {
            LlmClientError::ProviderUnavailable(format!(
                "failed to reach {}: {error}",
                self.base_url
            ))
        })?;

        if response.status() == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmClientError::ProviderUnavailable(format!(
                "{} returned 404: {body}",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmClientError::GenerationFailed(format!(
                "{} returned {status}: {body}",
                self.model
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|error| LlmClientError::InvalidResponse(error.to_string()))?;

        if !body.done {
            return Err(LlmClientError::InvalidResponse(
                "response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.message.content)
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
    #[serde(default = "default_done")]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

fn default_done() -> bool {
    true
}

#[async_trait]
impl GenerationClient for OllamaChatClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmClientError> {
        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "Requesting answer");
        self.chat(json!({ "role": "user", "content": prompt }))
            .await
    }
}

#[async_trait]
impl VisionClient for OllamaChatClient {
    async fn describe_image(&self, path: &Path) -> Result<String, LlmClientError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| LlmClientError::ImageRead {
                path: path.display().to_string(),
                source,
            })?;
        tracing::debug!(
            model = %self.model,
            image = %path.display(),
            bytes = bytes.len(),
            "Requesting image description"
        );
        let content = self
            .chat(json!({
                "role": "user",
                "content": IMAGE_DESCRIPTION_PROMPT,
                "images": [STANDARD.encode(&bytes)],
            }))
            .await?;
        Ok(content.trim().to_string())
    }
}
