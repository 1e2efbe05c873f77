//! SQLite store.
//!
//! One database file, four tables:
//! - `sessions`   — session rows with history as a JSON column
//! - `documents`  — extracted documents, keyed by id, hash-indexed
//! - `artifacts`  — immutable study artifacts (answer keys included)
//! - `progress`   — one durable gamification row per user
//!
//! Timestamps are RFC 3339 text; in UTC that sorts lexicographically,
//! which the expiry sweep and recency ordering rely on.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::str::FromStr;
use studykit_core::{
    Document, DocumentStatus, GamificationState, ProgressStore, Session, SessionId, SessionMode,
    SessionStore, StoreError, StudyArtifact, Tier, Turn,
};
use tracing::{debug, info};

/// A production SQLite store for sessions, documents, artifacts, and progress.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store from a connection string.
    ///
    /// The database and all tables/indexes are created automatically.
    /// Pass `"sqlite::memory:"` for an ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id                  TEXT PRIMARY KEY,
                user_id             TEXT NOT NULL,
                tier                TEXT NOT NULL,
                mode                TEXT NOT NULL,
                active_document_id  TEXT,
                history             TEXT NOT NULL DEFAULT '[]',
                artifacts_generated INTEGER NOT NULL DEFAULT 0,
                created_at          TEXT NOT NULL,
                last_active         TEXT NOT NULL,
                expires_at          TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("sessions table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id, last_active DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("sessions index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id            TEXT PRIMARY KEY,
                user_id       TEXT NOT NULL,
                title         TEXT NOT NULL,
                topic         TEXT NOT NULL,
                byte_size     INTEGER NOT NULL,
                text          TEXT NOT NULL,
                content_hash  TEXT NOT NULL,
                status        TEXT NOT NULL,
                ingested_at   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("documents table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_documents_hash ON documents(user_id, content_hash)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("documents index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS artifacts (
                id            TEXT PRIMARY KEY,
                session_id    TEXT NOT NULL,
                document_id   TEXT NOT NULL,
                items         TEXT NOT NULL,
                generated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("artifacts table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS progress (
                user_id       TEXT PRIMARY KEY,
                score         INTEGER NOT NULL DEFAULT 0,
                streak        INTEGER NOT NULL DEFAULT 0,
                last_activity TEXT,
                mastery       TEXT NOT NULL DEFAULT '{}',
                updated_at    TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("progress table: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn parse_timestamp(s: &str) -> DateTime<Utc> {
        chrono::DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<Session, StoreError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let user_id: String = row
            .try_get("user_id")
            .map_err(|e| StoreError::QueryFailed(format!("user_id column: {e}")))?;
        let tier_str: String = row
            .try_get("tier")
            .map_err(|e| StoreError::QueryFailed(format!("tier column: {e}")))?;
        let mode_str: String = row
            .try_get("mode")
            .map_err(|e| StoreError::QueryFailed(format!("mode column: {e}")))?;
        let active_document_id: Option<String> = row
            .try_get("active_document_id")
            .map_err(|e| StoreError::QueryFailed(format!("active_document_id column: {e}")))?;
        let history_json: String = row
            .try_get("history")
            .map_err(|e| StoreError::QueryFailed(format!("history column: {e}")))?;
        let artifacts_generated: i64 = row
            .try_get("artifacts_generated")
            .map_err(|e| StoreError::QueryFailed(format!("artifacts_generated column: {e}")))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;
        let last_active_str: String = row
            .try_get("last_active")
            .map_err(|e| StoreError::QueryFailed(format!("last_active column: {e}")))?;
        let expires_at_str: Option<String> = row
            .try_get("expires_at")
            .map_err(|e| StoreError::QueryFailed(format!("expires_at column: {e}")))?;

        let history: Vec<Turn> = serde_json::from_str(&history_json).unwrap_or_default();

        Ok(Session {
            id: SessionId(id),
            user_id,
            tier: tier_str.parse::<Tier>().unwrap_or_default(),
            mode: mode_str.parse::<SessionMode>().unwrap_or(SessionMode::Chat),
            active_document_id,
            history,
            artifacts_generated: artifacts_generated.max(0) as u32,
            created_at: Self::parse_timestamp(&created_at_str),
            last_active: Self::parse_timestamp(&last_active_str),
            expires_at: expires_at_str.as_deref().map(Self::parse_timestamp),
        })
    }

    fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document, StoreError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let user_id: String = row
            .try_get("user_id")
            .map_err(|e| StoreError::QueryFailed(format!("user_id column: {e}")))?;
        let title: String = row
            .try_get("title")
            .map_err(|e| StoreError::QueryFailed(format!("title column: {e}")))?;
        let topic: String = row
            .try_get("topic")
            .map_err(|e| StoreError::QueryFailed(format!("topic column: {e}")))?;
        let byte_size: i64 = row
            .try_get("byte_size")
            .map_err(|e| StoreError::QueryFailed(format!("byte_size column: {e}")))?;
        let text: String = row
            .try_get("text")
            .map_err(|e| StoreError::QueryFailed(format!("text column: {e}")))?;
        let content_hash: String = row
            .try_get("content_hash")
            .map_err(|e| StoreError::QueryFailed(format!("content_hash column: {e}")))?;
        let status_str: String = row
            .try_get("status")
            .map_err(|e| StoreError::QueryFailed(format!("status column: {e}")))?;
        let ingested_at_str: String = row
            .try_get("ingested_at")
            .map_err(|e| StoreError::QueryFailed(format!("ingested_at column: {e}")))?;

        Ok(Document {
            id,
            user_id,
            title,
            topic,
            byte_size: byte_size.max(0) as usize,
            text,
            content_hash,
            status: status_from_str(&status_str),
            ingested_at: Self::parse_timestamp(&ingested_at_str),
        })
    }

    fn row_to_state(row: &sqlx::sqlite::SqliteRow) -> Result<GamificationState, StoreError> {
        let user_id: String = row
            .try_get("user_id")
            .map_err(|e| StoreError::QueryFailed(format!("user_id column: {e}")))?;
        let score: i64 = row
            .try_get("score")
            .map_err(|e| StoreError::QueryFailed(format!("score column: {e}")))?;
        let streak: i64 = row
            .try_get("streak")
            .map_err(|e| StoreError::QueryFailed(format!("streak column: {e}")))?;
        let last_activity_str: Option<String> = row
            .try_get("last_activity")
            .map_err(|e| StoreError::QueryFailed(format!("last_activity column: {e}")))?;
        let mastery_json: String = row
            .try_get("mastery")
            .map_err(|e| StoreError::QueryFailed(format!("mastery column: {e}")))?;
        let updated_at_str: String = row
            .try_get("updated_at")
            .map_err(|e| StoreError::QueryFailed(format!("updated_at column: {e}")))?;

        let mastery: BTreeMap<String, u8> = serde_json::from_str(&mastery_json).unwrap_or_default();

        Ok(GamificationState {
            user_id,
            score: score.max(0) as u64,
            streak: streak.max(0) as u32,
            last_activity: last_activity_str.and_then(|s| s.parse::<NaiveDate>().ok()),
            mastery,
            updated_at: Self::parse_timestamp(&updated_at_str),
        })
    }
}

fn status_from_str(s: &str) -> DocumentStatus {
    match s {
        "ingested" => DocumentStatus::Ingested,
        "failed" => DocumentStatus::Failed,
        _ => DocumentStatus::Pending,
    }
}

fn status_to_str(status: DocumentStatus) -> &'static str {
    match status {
        DocumentStatus::Pending => "pending",
        DocumentStatus::Ingested => "ingested",
        DocumentStatus::Failed => "failed",
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn put_session(&self, session: Session) -> Result<(), StoreError> {
        let history_json = serde_json::to_string(&session.history)
            .map_err(|e| StoreError::Storage(format!("History serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO sessions
                (id, user_id, tier, mode, active_document_id, history,
                 artifacts_generated, created_at, last_active, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                tier = excluded.tier,
                mode = excluded.mode,
                active_document_id = excluded.active_document_id,
                history = excluded.history,
                artifacts_generated = excluded.artifacts_generated,
                last_active = excluded.last_active,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(&session.id.0)
        .bind(&session.user_id)
        .bind(session.tier.as_str())
        .bind(session.mode.as_str())
        .bind(&session.active_document_id)
        .bind(&history_json)
        .bind(session.artifacts_generated as i64)
        .bind(session.created_at.to_rfc3339())
        .bind(session.last_active.to_rfc3339())
        .bind(session.expires_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Session INSERT failed: {e}")))?;

        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Session SELECT: {e}")))?;

        match row {
            Some(row) => {
                let session = Self::row_to_session(&row)?;
                if session.is_expired(Utc::now()) {
                    return Ok(None);
                }
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>, StoreError> {
        let rows =
            sqlx::query("SELECT * FROM sessions WHERE user_id = ?1 ORDER BY last_active DESC")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::QueryFailed(format!("Session list: {e}")))?;

        let now = Utc::now();
        let sessions: Vec<Session> = rows
            .iter()
            .map(Self::row_to_session)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|s| !s.is_expired(now))
            .collect();
        Ok(sessions)
    }

    async fn delete_session(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("Session DELETE failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM sessions WHERE expires_at IS NOT NULL AND expires_at <= ?1",
        )
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Expiry sweep failed: {e}")))?;

        let swept = result.rows_affected();
        if swept > 0 {
            debug!(swept, "Swept expired sessions");
        }
        Ok(swept)
    }

    async fn put_document(&self, document: Document) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO documents
                (id, user_id, title, topic, byte_size, text, content_hash, status, ingested_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                topic = excluded.topic,
                byte_size = excluded.byte_size,
                text = excluded.text,
                content_hash = excluded.content_hash,
                status = excluded.status,
                ingested_at = excluded.ingested_at
            "#,
        )
        .bind(&document.id)
        .bind(&document.user_id)
        .bind(&document.title)
        .bind(&document.topic)
        .bind(document.byte_size as i64)
        .bind(&document.text)
        .bind(&document.content_hash)
        .bind(status_to_str(document.status))
        .bind(document.ingested_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Document INSERT failed: {e}")))?;

        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Document SELECT: {e}")))?;

        row.as_ref().map(Self::row_to_document).transpose()
    }

    async fn find_document_by_hash(
        &self,
        user_id: &str,
        content_hash: &str,
    ) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM documents
            WHERE user_id = ?1 AND content_hash = ?2
            ORDER BY ingested_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Document hash lookup: {e}")))?;

        row.as_ref().map(Self::row_to_document).transpose()
    }

    async fn delete_document(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("Document DELETE failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn put_artifact(&self, artifact: StudyArtifact) -> Result<(), StoreError> {
        let items_json = serde_json::to_string(&artifact.items)
            .map_err(|e| StoreError::Storage(format!("Items serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO artifacts (id, session_id, document_id, items, generated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&artifact.id)
        .bind(&artifact.session_id)
        .bind(&artifact.document_id)
        .bind(&items_json)
        .bind(artifact.generated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Artifact INSERT failed: {e}")))?;

        Ok(())
    }

    async fn get_artifact(&self, id: &str) -> Result<Option<StudyArtifact>, StoreError> {
        let row = sqlx::query("SELECT * FROM artifacts WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Artifact SELECT: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let artifact_id: String = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let session_id: String = row
            .try_get("session_id")
            .map_err(|e| StoreError::QueryFailed(format!("session_id column: {e}")))?;
        let document_id: String = row
            .try_get("document_id")
            .map_err(|e| StoreError::QueryFailed(format!("document_id column: {e}")))?;
        let items_json: String = row
            .try_get("items")
            .map_err(|e| StoreError::QueryFailed(format!("items column: {e}")))?;
        let generated_at_str: String = row
            .try_get("generated_at")
            .map_err(|e| StoreError::QueryFailed(format!("generated_at column: {e}")))?;

        let items = serde_json::from_str(&items_json)
            .map_err(|e| StoreError::QueryFailed(format!("Items deserialization: {e}")))?;

        Ok(Some(StudyArtifact {
            id: artifact_id,
            session_id,
            document_id,
            items,
            generated_at: Self::parse_timestamp(&generated_at_str),
        }))
    }
}

#[async_trait]
impl ProgressStore for SqliteStore {
    async fn load_state(&self, user_id: &str) -> Result<Option<GamificationState>, StoreError> {
        let row = sqlx::query("SELECT * FROM progress WHERE user_id = ?1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Progress SELECT: {e}")))?;

        row.as_ref().map(Self::row_to_state).transpose()
    }

    async fn save_state(&self, state: &GamificationState) -> Result<(), StoreError> {
        let mastery_json = serde_json::to_string(&state.mastery)
            .map_err(|e| StoreError::Storage(format!("Mastery serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO progress (user_id, score, streak, last_activity, mastery, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(user_id) DO UPDATE SET
                score = excluded.score,
                streak = excluded.streak,
                last_activity = excluded.last_activity,
                mastery = excluded.mastery,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&state.user_id)
        .bind(state.score as i64)
        .bind(state.streak as i64)
        .bind(state.last_activity.map(|d| d.to_string()))
        .bind(&mastery_json)
        .bind(state.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Progress INSERT failed: {e}")))?;

        Ok(())
    }
}
