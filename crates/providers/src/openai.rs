//! OpenAI-compatible backend — chat completions and embeddings over HTTP.
//!
//! Works with any service exposing the OpenAI wire format: OpenAI itself,
//! OpenRouter, Ollama, vLLM, and friends. The backend does a single
//! request per call; retry and timeout policy live in `ModelGateway`.

use async_trait::async_trait;
use serde::Deserialize;
use studykit_config::ModelConfig;
use studykit_core::error::ModelError;
use studykit_core::model::*;
use tracing::{debug, warn};

/// A backend speaking the OpenAI chat/embeddings wire format.
pub struct OpenAiBackend {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiBackend {
    /// Create a backend for any OpenAI-compatible endpoint.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    /// Build the backend from the model section of the app config.
    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(
            "openai",
            &config.base_url,
            config.api_key.clone().unwrap_or_default(),
        )
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<ModelReply, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "stream": false,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        debug!(
            backend = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status();

        if status.as_u16() == 429 {
            return Err(ModelError::RateLimited {
                retry_after_secs: retry_after_secs(response.headers()),
            });
        }

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ModelError::AuthenticationFailed(format!(
                "API key rejected by '{}'",
                self.name
            )));
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(
                backend = %self.name,
                status = status.as_u16(),
                "Completion request failed"
            );
            return Err(ModelError::ApiError {
                status_code: status.as_u16(),
                message,
            });
        }

        let api_response: ChatResponse =
            response.json().await.map_err(|e| ModelError::ApiError {
                status_code: 200,
                message: format!("Failed to parse completion response: {e}"),
            })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::ApiError {
                status_code: 200,
                message: "Response contained no choices".into(),
            })?;

        Ok(ModelReply {
            text: choice.message.content.unwrap_or_default(),
            model: api_response.model,
            usage: api_response.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ModelError> {
        let url = format!("{}/embeddings", self.base_url);

        let body = serde_json::json!({
            "model": request.model,
            "input": request.inputs,
            "encoding_format": "float",
        });

        debug!(
            backend = %self.name,
            model = %request.model,
            inputs = request.inputs.len(),
            "Sending embedding request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status();

        if status.as_u16() == 429 {
            return Err(ModelError::RateLimited {
                retry_after_secs: retry_after_secs(response.headers()),
            });
        }

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ModelError::AuthenticationFailed(format!(
                "API key rejected by '{}'",
                self.name
            )));
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(
                backend = %self.name,
                status = status.as_u16(),
                "Embedding request failed"
            );
            return Err(ModelError::ApiError {
                status_code: status.as_u16(),
                message,
            });
        }

        let api_response: EmbeddingApiResponse =
            response.json().await.map_err(|e| ModelError::ApiError {
                status_code: 200,
                message: format!("Failed to parse embedding response: {e}"),
            })?;

        Ok(EmbeddingResponse {
            embeddings: api_response.data.into_iter().map(|d| d.embedding).collect(),
            model: api_response.model,
            usage: api_response.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: 0,
                total_tokens: u.total_tokens,
            }),
        })
    }
}

/// Seconds to wait from a 429's Retry-After header, defaulting to 5.
fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> u64 {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(5)
}

// --- Wire types (OpenAI-compatible) ---

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    #[serde(default)]
    model: String,
    data: Vec<EmbeddingItem>,
    usage: Option<EmbeddingApiUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}
