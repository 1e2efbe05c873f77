//! # StudyKit Orchestrator
//!
//! The coordination layer between the HTTP surface and everything else:
//! routes each request to a pipeline, composes budgeted prompts, drives
//! the model gateway, and persists the outcome.
//!
//! [`StudyService`] is the only entry point adapters need; the router and
//! composer are exposed for tests and for embedding in other frontends.

pub mod artifacts;
pub mod composer;
pub mod router;
pub mod service;

pub use artifacts::{FlashcardReply, QuizReply, ValidatedQuizItem};
pub use composer::{
    difficulty_for_mastery, ComposeInput, ComposedPrompt, PromptComposer, PromptPlan,
};
pub use router::{route, ArtifactKind, PipelineTarget};
pub use service::{StudyService, SubmissionResult};
