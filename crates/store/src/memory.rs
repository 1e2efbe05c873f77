//! In-memory store — useful for testing and single-process deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use studykit_core::{
    Document, GamificationState, ProgressStore, Session, SessionStore, StoreError, StudyArtifact,
};
use tokio::sync::RwLock;

/// A store that keeps everything in process memory.
///
/// Sessions, documents, and artifacts vanish on restart, which matches
/// their ephemeral contract; gamification state does too, so deployments
/// that care about durable progress use the SQLite store instead.
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Session>>,
    documents: RwLock<HashMap<String, Document>>,
    artifacts: RwLock<HashMap<String, StudyArtifact>>,
    progress: RwLock<HashMap<String, GamificationState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            documents: RwLock::new(HashMap::new()),
            artifacts: RwLock::new(HashMap::new()),
            progress: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put_session(&self, session: Session) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(session.id.0.clone(), session);
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(id)
            .filter(|s| !s.is_expired(Utc::now()))
            .cloned())
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>, StoreError> {
        let now = Utc::now();
        let sessions = self.sessions.read().await;
        let mut owned: Vec<Session> = sessions
            .values()
            .filter(|s| s.user_id == user_id && !s.is_expired(now))
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.last_active.cmp(&a.last_active));
        Ok(owned)
    }

    async fn delete_session(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.sessions.write().await.remove(id).is_some())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now));
        Ok((before - sessions.len()) as u64)
    }

    async fn put_document(&self, document: Document) -> Result<(), StoreError> {
        self.documents
            .write()
            .await
            .insert(document.id.clone(), document);
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.documents.read().await.get(id).cloned())
    }

    async fn find_document_by_hash(
        &self,
        user_id: &str,
        content_hash: &str,
    ) -> Result<Option<Document>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents
            .values()
            .filter(|d| d.user_id == user_id && d.content_hash == content_hash)
            .max_by_key(|d| d.ingested_at)
            .cloned())
    }

    async fn delete_document(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.documents.write().await.remove(id).is_some())
    }

    async fn put_artifact(&self, artifact: StudyArtifact) -> Result<(), StoreError> {
        self.artifacts
            .write()
            .await
            .insert(artifact.id.clone(), artifact);
        Ok(())
    }

    async fn get_artifact(&self, id: &str) -> Result<Option<StudyArtifact>, StoreError> {
        Ok(self.artifacts.read().await.get(id).cloned())
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn load_state(&self, user_id: &str) -> Result<Option<GamificationState>, StoreError> {
        Ok(self.progress.read().await.get(user_id).cloned())
    }

    async fn save_state(&self, state: &GamificationState) -> Result<(), StoreError> {
        self.progress
            .write()
            .await
            .insert(state.user_id.clone(), state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use studykit_core::{SessionMode, Tier, Turn};

    #[tokio::test]
    async fn session_roundtrip() {
        let store = MemoryStore::new();
        let mut session = Session::new("user-1", Tier::Free, SessionMode::Chat);
        session.push(Turn::user("What is mitosis?"));
        let id = session.id.0.clone();

        store.put_session(session).await.unwrap();
        let loaded = store.get_session(&id).await.unwrap().unwrap();
        assert_eq!(loaded.history.len(), 1);
        assert_eq!(loaded.user_id, "user-1");
    }

    #[tokio::test]
    async fn expired_session_reported_absent() {
        let store = MemoryStore::new();
        let mut session = Session::new("user-1", Tier::Free, SessionMode::Chat);
        session.expires_at = Some(Utc::now() - Duration::hours(1));
        let id = session.id.0.clone();

        store.put_session(session).await.unwrap();
        assert!(store.get_session(&id).await.unwrap().is_none());
        assert!(store.list_sessions("user-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sweep_removes_expired_only() {
        let store = MemoryStore::new();
        let mut expired = Session::new("user-1", Tier::Free, SessionMode::Chat);
        expired.expires_at = Some(Utc::now() - Duration::hours(1));
        let live = Session::new("user-1", Tier::Premium, SessionMode::Study);
        let live_id = live.id.0.clone();

        store.put_session(expired).await.unwrap();
        store.put_session(live).await.unwrap();

        let swept = store.sweep_expired(Utc::now()).await.unwrap();
        assert_eq!(swept, 1);
        assert!(store.get_session(&live_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn list_sessions_most_recent_first() {
        let store = MemoryStore::new();
        let mut older = Session::new("user-1", Tier::Free, SessionMode::Chat);
        older.last_active = Utc::now() - Duration::minutes(30);
        let older_id = older.id.0.clone();
        let newer = Session::new("user-1", Tier::Free, SessionMode::Chat);
        let newer_id = newer.id.0.clone();

        store.put_session(older).await.unwrap();
        store.put_session(newer).await.unwrap();

        let listed = store.list_sessions("user-1").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id.0, newer_id);
        assert_eq!(listed[1].id.0, older_id);
    }

    #[tokio::test]
    async fn find_document_by_hash() {
        let store = MemoryStore::new();
        let mut doc = Document::new("user-1", "notes.txt");
        doc.content_hash = "abc123".into();
        let doc_id = doc.id.clone();
        store.put_document(doc).await.unwrap();

        let found = store
            .find_document_by_hash("user-1", "abc123")
            .await
            .unwrap();
        assert_eq!(found.unwrap().id, doc_id);

        let other_user = store
            .find_document_by_hash("user-2", "abc123")
            .await
            .unwrap();
        assert!(other_user.is_none());
    }

    #[tokio::test]
    async fn progress_state_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.load_state("user-1").await.unwrap().is_none());

        let mut state = GamificationState::new("user-1");
        state.add_score(42);
        store.save_state(&state).await.unwrap();

        let loaded = store.load_state("user-1").await.unwrap().unwrap();
        assert_eq!(loaded.score, 42);
    }

    #[tokio::test]
    async fn delete_session_reports_existence() {
        let store = MemoryStore::new();
        let session = Session::new("user-1", Tier::Free, SessionMode::Chat);
        let id = session.id.0.clone();
        store.put_session(session).await.unwrap();

        assert!(store.delete_session(&id).await.unwrap());
        assert!(!store.delete_session(&id).await.unwrap());
    }
}
