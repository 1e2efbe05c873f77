//! Error types for the StudyKit domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Each bounded context
//! has its own error enum; the top-level `Error` aggregates them and maps
//! every variant to a stable kind identifier that clients can branch on
//! without parsing prose.

use thiserror::Error;

/// The top-level error type for all StudyKit operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Ingestion errors ---
    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    // --- Index errors ---
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    // --- Model errors ---
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    // --- Prompt composition errors ---
    #[error("Composition error: {0}")]
    Compose(#[from] ComposeError),

    // --- Mode routing errors ---
    #[error("Routing error: {0}")]
    Route(#[from] RouteError),

    // --- Gamification errors ---
    #[error("Progress error: {0}")]
    Progress(#[from] ProgressError),

    // --- Storage errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Entity lookups ---
    #[error("Not found: {0}")]
    NotFound(String),

    /// A well-formed request with unusable content, e.g. a chat request
    /// without a message.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// An operation raced with a state change it cannot recover from,
    /// e.g. answers submitted against an artifact that was deleted.
    #[error("State conflict: {0}")]
    StateConflict(String),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The stable kind identifier surfaced to clients.
    ///
    /// Kinds are part of the wire contract: UIs branch on them, so adding
    /// a variant means choosing a kind here, never renaming an existing one.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Ingest(e) => e.kind(),
            Error::Index(_) => "internal",
            Error::Model(e) => e.kind(),
            Error::Compose(ComposeError::PromptTooLarge { .. }) => "prompt_too_large",
            Error::Route(RouteError::ModeNotAvailable { .. }) => "mode_not_available",
            Error::Progress(e) => e.kind(),
            Error::Store(_) => "internal",
            Error::NotFound(_) => "not_found",
            Error::InvalidRequest(_) => "invalid_request",
            Error::StateConflict(_) => "state_conflict",
            Error::Serialization(_) => "internal",
            Error::Internal(_) => "internal",
        }
    }

    /// Whether the error is transient and a retry by the caller could help.
    ///
    /// Only the model gateway and the index builder retry internally;
    /// outer layers must not, so this exists for surfacing, not looping.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Model(e) if e.is_transient())
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum IngestError {
    #[error("Document too large: {size} bytes (limit {max})")]
    SizeExceeded { size: usize, max: usize },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Document contained no extractable text")]
    EmptyContent,

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Indexing incomplete: {embedded} of {total} chunks embedded")]
    IndexingIncomplete { embedded: usize, total: usize },
}

impl IngestError {
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::SizeExceeded { .. } => "size_exceeded",
            IngestError::UnsupportedFormat(_) => "unsupported_format",
            IngestError::EmptyContent => "empty_content",
            IngestError::ExtractionFailed(_) => "unsupported_format",
            IngestError::IndexingIncomplete { .. } => "indexing_incomplete",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum IndexError {
    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Index rejected chunks: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by model service, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Model backend not configured: {0}")]
    NotConfigured(String),

    /// Retries exhausted inside the gateway; the last failure is attached.
    #[error("Model unavailable after {attempts} attempts: {last_error}")]
    Unavailable { attempts: u32, last_error: String },

    #[error("Model output did not match the expected schema: {0}")]
    MalformedOutput(String),
}

impl ModelError {
    pub fn kind(&self) -> &'static str {
        match self {
            ModelError::MalformedOutput(_) => "malformed_model_output",
            _ => "model_unavailable",
        }
    }

    /// Transient failures are eligible for retry inside the gateway.
    pub fn is_transient(&self) -> bool {
        match self {
            ModelError::Timeout(_) | ModelError::Network(_) | ModelError::RateLimited { .. } => {
                true
            }
            ModelError::ApiError { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ComposeError {
    #[error("Prompt exceeds token budget: needs {required}, budget {budget}")]
    PromptTooLarge { required: usize, budget: usize },
}

#[derive(Debug, Clone, Error)]
pub enum RouteError {
    #[error("Mode '{mode}' not available: {reason}")]
    ModeNotAvailable { mode: String, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum ProgressError {
    #[error("Answer count mismatch: artifact has {expected} items, got {got} answers")]
    AnswerCountMismatch { expected: usize, got: usize },

    #[error("Artifact '{0}' has no gradable answer key")]
    NotGradable(String),
}

impl ProgressError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProgressError::AnswerCountMismatch { .. } => "invalid_request",
            ProgressError::NotGradable(_) => "invalid_request",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}
