//! # StudyKit Core
//!
//! Domain types, traits, and error definitions for the StudyKit session
//! orchestrator. This crate has **zero framework dependencies** — it defines
//! the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external dependency of the orchestrator — the model service, the
//! vector index, the session and progress stores — is a trait here.
//! Implementations live in their respective crates. This enables:
//! - Swapping backends via configuration
//! - Testing every pipeline with scripted mocks
//! - A clean dependency graph (all crates depend inward on core)

pub mod artifact;
pub mod document;
pub mod error;
pub mod index;
pub mod model;
pub mod progress;
pub mod request;
pub mod session;
pub mod store;
pub mod sync;
pub mod token;

// Re-export key types at crate root for ergonomics
pub use artifact::{ArtifactItems, Difficulty, Flashcard, QuizItem, StudyArtifact};
pub use document::{Chunk, Document, DocumentStatus, EmbeddedChunk, ScoredChunk};
pub use error::{
    ComposeError, Error, IngestError, IndexError, ModelError, ProgressError, Result, RouteError,
    StoreError,
};
pub use index::VectorIndex;
pub use model::{
    CompletionRequest, EmbeddingRequest, EmbeddingResponse, ModelBackend, ModelReply,
    PromptMessage, PromptRole, Usage,
};
pub use progress::{GamificationState, GradeReport, ProgressSummary};
pub use request::{StudyMode, StudyPayload, StudyReply, StudyRequest, StudyResponse};
pub use session::{Role, Session, SessionId, SessionMode, Tier, Turn};
pub use store::{ProgressStore, SessionStore};
pub use sync::KeyedLocks;
