//! ModelBackend trait — the abstraction over the external LLM service.
//!
//! The service treats the model as an opaque, rate-limited, occasionally
//! failing network dependency with two capabilities: text completion and
//! text embedding. Implementations live in `studykit-providers`; tests
//! inject scripted mocks.

use crate::error::ModelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The role of a prompt message sent to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

/// One message of a model-ready prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: PromptRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: PromptRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: PromptRole::Assistant, content: content.into() }
    }
}

/// A completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The model to use (e.g. "gpt-4o-mini").
    pub model: String,

    /// The composed prompt messages, system first.
    pub messages: Vec<PromptMessage>,

    /// Temperature (0.0 = deterministic).
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Cap on generated tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.7
}

/// A normalized completion reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelReply {
    /// The generated text.
    pub text: String,

    /// Which model actually responded (may differ from requested).
    pub model: String,

    /// Token usage, when the service reports it.
    pub usage: Option<Usage>,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// An embedding request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// The embedding model (e.g. "text-embedding-3-small").
    pub model: String,

    /// The texts to embed, one vector returned per input.
    pub inputs: Vec<String>,
}

/// An embedding response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// One vector per input text, in input order.
    pub embeddings: Vec<Vec<f32>>,

    /// Which model was used.
    pub model: String,

    pub usage: Option<Usage>,
}

/// The model backend seam.
///
/// The gateway layer in `studykit-providers` wraps an implementation with
/// retry, backoff, and timeout; nothing else in the system talks to the
/// model service directly.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// A short name for logs (e.g. "openai", "mock").
    fn name(&self) -> &str;

    /// Send a prompt and get a complete reply.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<ModelReply, ModelError>;

    /// Generate embeddings for the given texts.
    ///
    /// Default implementation reports the capability as unconfigured.
    async fn embed(
        &self,
        _request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ModelError> {
        Err(ModelError::NotConfigured(format!(
            "backend '{}' does not support embeddings",
            self.name()
        )))
    }
}
