use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{EmbeddingsConfig, OllamaConfig};
use crate::error::{ProviderError, ServiceError, ServiceResult};
use crate::provider::{EmbeddingProvider, GenerativeModel};
use crate::service::prompts::IMAGE_DESCRIPTION_PROMPT;

/// Ollama API client
///
/// Serves as both the embedding provider (text embeddings and image
/// descriptions) and the generative model.
pub struct OllamaClient {
    client: Client,
    config: OllamaConfig,
    embedding_model: String,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(config: OllamaConfig, embeddings: &EmbeddingsConfig) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| {
                ServiceError::Provider(ProviderError::Connection {
                    url: config.base_url.clone(),
                    source: e,
                })
            })?;

        Ok(Self {
            client,
            config,
            embedding_model: embeddings.model.clone(),
        })
    }

    /// Check if Ollama is available
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url);

        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(error = %e, "Ollama health check failed");
                false
            }
        }
    }

    /// Generate a non-streaming chat response
    async fn chat(&self, model: &str, messages: Vec<ChatMessage>) -> Result<String, ProviderError> {
        let url = format!("{}/api/chat", self.config.base_url);

        let request = OllamaChatRequest {
            model: model.to_string(),
            messages,
            stream: false,
            options: Some(OllamaOptions {
                temperature: Some(self.config.temperature),
            }),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Connection {
                url: url.clone(),
                source: e,
            })?;

        let response = check_status(response, model).await?;

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse { source: e })?;

        Ok(chat_response.message.content)
    }
}

/// Map a non-success response to a provider error
async fn check_status(response: Response, model: &str) -> Result<Response, ProviderError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();

    if message.contains("model")
        && (message.contains("not found") || message.contains("does not exist"))
    {
        return Err(ProviderError::ModelNotFound {
            model: model.to_string(),
        });
    }

    Err(ProviderError::Request { status, message })
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let url = format!("{}/api/embeddings", self.config.base_url);

        let request = OllamaEmbeddingRequest {
            model: &self.embedding_model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Connection {
                url: url.clone(),
                source: e,
            })?;

        let response = check_status(response, &self.embedding_model).await?;

        let embedding_response: OllamaEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse { source: e })?;

        if embedding_response.embedding.is_empty() {
            return Err(ProviderError::EmptyEmbedding);
        }

        Ok(embedding_response.embedding)
    }

    async fn describe_image(&self, image: &[u8]) -> Result<String, ProviderError> {
        if !self.describes_images() {
            return Err(ProviderError::Unavailable {
                message: "no vision model configured".to_string(),
            });
        }

        let image_base64 = base64::engine::general_purpose::STANDARD.encode(image);
        let message = ChatMessage::user_with_image(IMAGE_DESCRIPTION_PROMPT, image_base64);

        let description = self.chat(&self.config.vision_model, vec![message]).await?;
        debug!(
            model = %self.config.vision_model,
            bytes = image.len(),
            description_length = description.len(),
            "Image described"
        );

        Ok(description.trim().to_string())
    }

    fn describes_images(&self) -> bool {
        !self.config.vision_model.is_empty()
    }
}

#[async_trait]
impl GenerativeModel for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        self.chat(&self.config.generation_model, vec![ChatMessage::user(prompt)])
            .await
    }

    async fn is_available(&self) -> bool {
        self.health_check().await
    }
}

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    /// Base64-encoded images for vision models
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            images: None,
        }
    }

    /// Create a user message with an image for vision models
    pub fn user_with_image(content: impl Into<String>, image_base64: String) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            images: Some(vec![image_base64]),
        }
    }
}

// Internal Ollama API types

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}
