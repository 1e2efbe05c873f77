//! Configuration loading, validation, and management for StudyKit.
//!
//! Loads configuration from `~/.studykit/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.studykit/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model service configuration
    #[serde(default)]
    pub model: ModelConfig,

    /// Document ingestion configuration
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Prompt composition configuration
    #[serde(default)]
    pub compose: ComposeConfig,

    /// Session lifecycle configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Gamification configuration
    #[serde(default)]
    pub progress: ProgressConfig,

    /// Storage backend configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// HTTP gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("model", &self.model)
            .field("ingest", &self.ingest)
            .field("compose", &self.compose)
            .field("session", &self.session)
            .field("progress", &self.progress)
            .field("store", &self.store)
            .field("gateway", &self.gateway)
            .finish()
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

/// Settings for the external LLM service.
#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// API key; usually supplied via `STUDYKIT_API_KEY`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// OpenAI-compatible base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Chat completion model
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Embedding model
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Sampling temperature for chat mode
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-call timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Max attempts for transient failures (1 = no retry)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    250
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("chat_model", &self.chat_model)
            .field("embedding_model", &self.embedding_model)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .field("base_delay_ms", &self.base_delay_ms)
            .finish()
    }
}

/// Upload validation and chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Maximum upload size in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,

    /// Target chunk size in tokens
    #[serde(default = "default_chunk_tokens")]
    pub chunk_tokens: usize,

    /// Overlap between consecutive chunks in tokens
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Texts per embedding request
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,
}

fn default_max_file_size() -> usize {
    5 * 1024 * 1024
}
fn default_chunk_tokens() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    50
}
fn default_embed_batch_size() -> usize {
    16
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            chunk_tokens: default_chunk_tokens(),
            chunk_overlap: default_chunk_overlap(),
            embed_batch_size: default_embed_batch_size(),
        }
    }
}

/// Prompt composition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeConfig {
    /// Hard ceiling on composed prompt tokens
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// Retrieval depth: chunks fetched per request
    #[serde(default = "default_retrieval_k")]
    pub retrieval_k: usize,

    /// Most recent turns considered for the history layer
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,
}

fn default_token_budget() -> usize {
    4096
}
fn default_retrieval_k() -> usize {
    5
}
fn default_max_history_turns() -> usize {
    20
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            retrieval_k: default_retrieval_k(),
            max_history_turns: default_max_history_turns(),
        }
    }
}

/// Session lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Free-tier inactivity TTL in days (premium sessions never expire)
    #[serde(default = "default_free_ttl_days")]
    pub free_ttl_days: u32,

    /// Stored history cap in turns; oldest are trimmed beyond this
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
}

fn default_free_ttl_days() -> u32 {
    7
}
fn default_history_cap() -> usize {
    100
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            free_ttl_days: default_free_ttl_days(),
            history_cap: default_history_cap(),
        }
    }
}

/// Gamification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Study artifacts a free-tier session may generate
    #[serde(default = "default_free_artifact_limit")]
    pub free_artifact_limit: u32,
}

fn default_free_artifact_limit() -> u32 {
    5
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            free_artifact_limit: default_free_artifact_limit(),
        }
    }
}

/// Storage backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend: "memory" or "sqlite"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// SQLite database path (sqlite backend only)
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_backend() -> String {
    "sqlite".into()
}
fn default_store_path() -> String {
    "studykit.db".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: default_store_path(),
        }
    }
}

/// HTTP gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Sliding-window rate limit per client per minute
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: usize,

    /// Allowed CORS origin
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8080
}
fn default_rate_limit() -> usize {
    60
}
fn default_allowed_origin() -> String {
    "http://localhost:8080".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            rate_limit_per_minute: default_rate_limit(),
            allowed_origin: default_allowed_origin(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.studykit/config.toml).
    ///
    /// Environment variables take priority over the file:
    /// - `STUDYKIT_API_KEY` (falls back to `OPENAI_API_KEY`)
    /// - `STUDYKIT_BASE_URL`
    /// - `STUDYKIT_MODEL`
    /// - `STUDYKIT_STORE_PATH`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.model.api_key.is_none() {
            config.model.api_key = std::env::var("STUDYKIT_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(base_url) = std::env::var("STUDYKIT_BASE_URL") {
            config.model.base_url = base_url;
        }

        if let Ok(model) = std::env::var("STUDYKIT_MODEL") {
            config.model.chat_model = model;
        }

        if let Ok(path) = std::env::var("STUDYKIT_STORE_PATH") {
            config.store.path = path;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".studykit")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.temperature < 0.0 || self.model.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.model.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "model.max_attempts must be at least 1".into(),
            ));
        }

        if self.ingest.max_file_size == 0 {
            return Err(ConfigError::ValidationError(
                "ingest.max_file_size must be > 0".into(),
            ));
        }

        if self.ingest.chunk_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "ingest.chunk_tokens must be > 0".into(),
            ));
        }

        if self.ingest.chunk_overlap >= self.ingest.chunk_tokens {
            return Err(ConfigError::ValidationError(
                "ingest.chunk_overlap must be smaller than ingest.chunk_tokens".into(),
            ));
        }

        if self.ingest.embed_batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "ingest.embed_batch_size must be at least 1".into(),
            ));
        }

        if self.compose.token_budget == 0 {
            return Err(ConfigError::ValidationError(
                "compose.token_budget must be > 0".into(),
            ));
        }

        if self.session.history_cap == 0 {
            return Err(ConfigError::ValidationError(
                "session.history_cap must be > 0".into(),
            ));
        }

        match self.store.backend.as_str() {
            "memory" | "sqlite" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "store.backend must be 'memory' or 'sqlite', got '{other}'"
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.model.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            ingest: IngestConfig::default(),
            compose: ComposeConfig::default(),
            session: SessionConfig::default(),
            progress: ProgressConfig::default(),
            store: StoreConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.ingest.max_file_size, 5 * 1024 * 1024);
        assert_eq!(config.ingest.chunk_tokens, 500);
        assert_eq!(config.ingest.chunk_overlap, 50);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model.chat_model, config.model.chat_model);
        assert_eq!(parsed.gateway.port, config.gateway.port);
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        let mut config = AppConfig::default();
        config.ingest.chunk_overlap = config.ingest.chunk_tokens;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_attempts_rejected() {
        let mut config = AppConfig::default();
        config.model.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_store_backend_rejected() {
        let mut config = AppConfig::default();
        config.store.backend = "redis".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().gateway.port, 8080);
    }

    #[test]
    fn partial_config_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[gateway]\nport = 9000\n\n[ingest]\nchunk_tokens = 256\nchunk_overlap = 32\n"
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.ingest.chunk_tokens, 256);
        assert_eq!(config.ingest.chunk_overlap, 32);
        // Untouched sections keep defaults
        assert_eq!(config.compose.token_budget, 4096);
        assert_eq!(config.session.free_ttl_days, 7);
    }

    #[test]
    fn invalid_config_file_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[ingest]\nchunk_tokens = 100\nchunk_overlap = 100\n").unwrap();

        let result = AppConfig::load_from(file.path());
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn api_key_redacted_in_debug() {
        let mut config = AppConfig::default();
        config.model.api_key = Some("sk-secret-key".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret-key"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gpt-4o-mini"));
        assert!(toml_str.contains("8080"));
    }
}
