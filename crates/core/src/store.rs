//! Storage traits — the seams between the orchestrator and its state.
//!
//! Two access patterns, matching how the data is used:
//! - `SessionStore`: ephemeral session-scoped data (sessions, documents,
//!   artifacts) with get-by-id and tier-driven expiry.
//! - `ProgressStore`: durable per-user gamification state.
//!
//! Implementations: in-memory (tests/dev) and SQLite, in `studykit-store`.

use crate::artifact::StudyArtifact;
use crate::document::Document;
use crate::error::StoreError;
use crate::progress::GamificationState;
use crate::session::Session;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Session-scoped storage: sessions, documents, artifacts.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The backend name (e.g. "memory", "sqlite").
    fn name(&self) -> &str;

    /// Insert or replace a session.
    async fn put_session(&self, session: Session) -> Result<(), StoreError>;

    /// Fetch a session by id. Expired sessions are reported as absent.
    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError>;

    /// All live sessions owned by a user, most recently active first.
    async fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>, StoreError>;

    /// Delete a session; returns whether it existed.
    async fn delete_session(&self, id: &str) -> Result<bool, StoreError>;

    /// Remove sessions whose expiry has passed; returns how many went.
    ///
    /// Reads already treat expired sessions as absent, so sweeping only
    /// reclaims space and can run on any schedule.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Insert or replace a document.
    async fn put_document(&self, document: Document) -> Result<(), StoreError>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError>;

    /// Find a user's document by raw-content hash (ingest idempotency).
    async fn find_document_by_hash(
        &self,
        user_id: &str,
        content_hash: &str,
    ) -> Result<Option<Document>, StoreError>;

    async fn delete_document(&self, id: &str) -> Result<bool, StoreError>;

    /// Insert an artifact (artifacts are immutable; no replace path).
    async fn put_artifact(&self, artifact: StudyArtifact) -> Result<(), StoreError>;

    async fn get_artifact(&self, id: &str) -> Result<Option<StudyArtifact>, StoreError>;
}

/// Durable per-user gamification state.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Load a user's state; `None` for first-time users.
    async fn load_state(&self, user_id: &str) -> Result<Option<GamificationState>, StoreError>;

    /// Durably write a user's state.
    async fn save_state(&self, state: &GamificationState) -> Result<(), StoreError>;
}
