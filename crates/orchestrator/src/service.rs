//! The study service facade — session lifecycle, uploads, and request
//! handling wired across ingest, retrieval, composition, the model
//! gateway, and progress tracking.
//!
//! One task per inbound request; the service holds no lock across a
//! model call. Per-user and per-build serialization live further down
//! (progress engine, ingest pipeline).

use chrono::{Duration, Utc};
use std::sync::Arc;
use std::time::Instant;
use studykit_config::{AppConfig, ModelConfig, ProgressConfig, SessionConfig};
use studykit_core::artifact::{ArtifactItems, StudyArtifact};
use studykit_core::document::Document;
use studykit_core::error::{Error, ModelError, Result};
use studykit_core::index::VectorIndex;
use studykit_core::model::{CompletionRequest, ModelBackend};
use studykit_core::progress::{GradeReport, ProgressSummary};
use studykit_core::request::{StudyMode, StudyReply, StudyRequest, StudyResponse};
use studykit_core::session::{Session, SessionMode, Tier, Turn};
use studykit_core::store::{ProgressStore, SessionStore};
use studykit_index::Retriever;
use studykit_ingest::IngestPipeline;
use studykit_progress::ProgressEngine;
use studykit_providers::ModelGateway;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::artifacts::{FlashcardReply, QuizReply};
use crate::composer::{difficulty_for_mastery, ComposeInput, PromptComposer};
use crate::router::{self, ArtifactKind, PipelineTarget};

/// Default item counts when the request does not ask for a number.
const DEFAULT_QUIZ_ITEMS: usize = 5;
const DEFAULT_FLASHCARD_ITEMS: usize = 10;
const MAX_ITEMS: usize = 20;

/// A graded submission plus the refreshed progress view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub artifact_id: String,
    pub report: GradeReport,
    pub gamification: ProgressSummary,
}

/// The orchestrator facade the HTTP adapter and CLI talk to.
pub struct StudyService {
    store: Arc<dyn SessionStore>,
    index: Arc<dyn VectorIndex>,
    gateway: Arc<ModelGateway>,
    pipeline: IngestPipeline,
    retriever: Retriever,
    composer: PromptComposer,
    progress: ProgressEngine,
    model_config: ModelConfig,
    session_config: SessionConfig,
    progress_config: ProgressConfig,
}

impl StudyService {
    /// Wire the service from config and injected backends.
    ///
    /// The raw model backend gets wrapped in the retrying gateway here;
    /// nothing downstream sees individual attempts.
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn SessionStore>,
        progress_store: Arc<dyn ProgressStore>,
        index: Arc<dyn VectorIndex>,
        backend: Arc<dyn ModelBackend>,
    ) -> Self {
        let gateway = Arc::new(ModelGateway::from_config(backend, &config.model));
        let pipeline = IngestPipeline::new(
            store.clone(),
            index.clone(),
            gateway.clone(),
            config.ingest.clone(),
            config.model.embedding_model.clone(),
        );
        let retriever = Retriever::new(
            index.clone(),
            gateway.clone(),
            config.model.embedding_model.clone(),
            config.compose.retrieval_k,
        );

        Self {
            store,
            index,
            gateway,
            pipeline,
            retriever,
            composer: PromptComposer::new(&config.compose),
            progress: ProgressEngine::new(progress_store),
            model_config: config.model.clone(),
            session_config: config.session.clone(),
            progress_config: config.progress.clone(),
        }
    }

    // --- Session lifecycle ---

    pub async fn create_session(
        &self,
        user_id: &str,
        tier: Tier,
        mode: SessionMode,
    ) -> Result<Session> {
        let mut session = Session::new(user_id, tier, mode);
        session.touch(Some(self.free_ttl()));
        self.store.put_session(session.clone()).await?;
        info!(
            session_id = %session.id,
            user_id = %user_id,
            tier = tier.as_str(),
            mode = mode.as_str(),
            "Created session"
        );
        Ok(session)
    }

    pub async fn get_session(&self, user_id: &str, session_id: &str) -> Result<Session> {
        self.owned_session(user_id, session_id).await
    }

    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>> {
        Ok(self.store.list_sessions(user_id).await?)
    }

    /// Delete a session and its document (unless another of the user's
    /// sessions still references it). Artifacts stay; grading against
    /// them conflicts once the session is gone.
    pub async fn delete_session(&self, user_id: &str, session_id: &str) -> Result<()> {
        let session = self.owned_session(user_id, session_id).await?;

        if let Some(doc_id) = &session.active_document_id {
            let still_referenced = self
                .store
                .list_sessions(user_id)
                .await?
                .iter()
                .any(|s| s.id != session.id && s.active_document_id.as_deref() == Some(doc_id));
            if !still_referenced {
                self.index.remove(doc_id).await?;
                self.store.delete_document(doc_id).await?;
            }
        }

        self.store.delete_session(session_id).await?;
        info!(session_id = %session_id, user_id = %user_id, "Deleted session");
        Ok(())
    }

    /// Drop expired sessions from the store.
    pub async fn sweep_expired(&self) -> Result<u64> {
        Ok(self.store.sweep_expired(Utc::now()).await?)
    }

    // --- Documents ---

    /// Ingest an upload and attach it to the session, replacing any
    /// previous document.
    ///
    /// If the session disappears while the index builds, the build's
    /// result is discarded and the upload reports the session missing.
    pub async fn upload_document(
        &self,
        user_id: &str,
        session_id: &str,
        filename: &str,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<Document> {
        self.owned_session(user_id, session_id).await?;

        let document = self
            .pipeline
            .ingest(user_id, filename, content_type, bytes)
            .await?;

        // The build can outlive the session; re-check before attaching.
        let mut session = match self.store.get_session(session_id).await? {
            Some(s) if s.user_id == user_id => s,
            _ => {
                self.index.remove(&document.id).await?;
                self.store.delete_document(&document.id).await?;
                return Err(Error::NotFound(format!("session '{session_id}'")));
            }
        };

        if let Some(old_id) = session.active_document_id.take() {
            if old_id != document.id {
                self.index.remove(&old_id).await?;
                self.store.delete_document(&old_id).await?;
            }
        }

        session.active_document_id = Some(document.id.clone());
        session.touch(Some(self.free_ttl()));
        self.store.put_session(session).await?;

        info!(
            session_id = %session_id,
            document_id = %document.id,
            topic = %document.topic,
            "Attached document to session"
        );
        Ok(document)
    }

    // --- Study requests ---

    /// Handle one study request end to end.
    pub async fn handle(
        &self,
        user_id: &str,
        tier: Tier,
        request: StudyRequest,
    ) -> Result<StudyResponse> {
        let started = Instant::now();
        let mut session = self.owned_session(user_id, &request.session_id).await?;

        // The payment provider's flag is authoritative per request.
        if session.tier != tier {
            session.tier = tier;
        }

        let document = match &session.active_document_id {
            Some(id) => self.store.get_document(id).await?,
            None => None,
        };

        let target = router::route(
            &session,
            document.as_ref(),
            request.mode,
            self.progress_config.free_artifact_limit,
        )?;

        let topic = document.as_ref().map(|d| d.topic.clone());
        let state = self.progress.state(user_id).await?;
        let mastery = topic.as_deref().map(|t| state.mastery_of(t)).unwrap_or(0);

        let reply = match target {
            PipelineTarget::Chat => {
                self.run_chat(&mut session, document.as_ref(), &request, mastery)
                    .await?
            }
            PipelineTarget::Artifact(kind) => {
                self.run_generation(&mut session, document.as_ref(), &request, kind, mastery)
                    .await?
            }
        };

        session.truncate_history(self.session_config.history_cap);
        session.touch(Some(self.free_ttl()));
        self.store.put_session(session).await?;

        let gamification = self.progress.summary(user_id, topic.as_deref()).await?;

        info!(
            session_id = %request.session_id,
            mode = %request.mode,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Handled study request"
        );

        Ok(StudyResponse {
            session_id: request.session_id,
            reply,
            gamification,
        })
    }

    async fn run_chat(
        &self,
        session: &mut Session,
        document: Option<&Document>,
        request: &StudyRequest,
        mastery: u8,
    ) -> Result<StudyReply> {
        let message = request
            .payload
            .message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| Error::InvalidRequest("chat requires a non-empty message".into()))?;

        let chunks = self
            .retriever
            .retrieve(document.map(|d| d.id.as_str()), message)
            .await?;

        let composed = self.composer.compose(ComposeInput {
            target: PipelineTarget::Chat,
            document,
            chunks: &chunks,
            history: &session.history,
            mastery,
            message,
            item_count: 0,
        })?;
        debug!(plan = ?composed.plan, "Composed chat prompt");

        let reply = self
            .gateway
            .complete(self.completion(composed.messages))
            .await?;

        session.push(Turn::user(message));
        session.push(Turn::assistant(&reply.text));

        Ok(StudyReply::Text { text: reply.text })
    }

    async fn run_generation(
        &self,
        session: &mut Session,
        document: Option<&Document>,
        request: &StudyRequest,
        kind: ArtifactKind,
        mastery: u8,
    ) -> Result<StudyReply> {
        // The router only sends generation here with an ingested document.
        let document = document
            .ok_or_else(|| Error::Internal("generation routed without a document".into()))?;

        let item_count = requested_items(kind, request.payload.item_count);
        let difficulty = difficulty_for_mastery(mastery);

        // Generation grounds on the chunks most relevant to the document
        // itself rather than to a user query.
        let chunks = self
            .retriever
            .retrieve(Some(document.id.as_str()), &document.title)
            .await?;

        let composed = self.composer.compose(ComposeInput {
            target: PipelineTarget::Artifact(kind),
            document: Some(document),
            chunks: &chunks,
            history: &session.history,
            mastery,
            message: "",
            item_count,
        })?;
        debug!(plan = ?composed.plan, kind = ?kind, "Composed generation prompt");

        let completion = self.completion(composed.messages);
        let items = match kind {
            ArtifactKind::Quiz => {
                let reply: QuizReply = self.gateway.complete_structured(completion).await?;
                ArtifactItems::Quiz {
                    items: reply
                        .items
                        .into_iter()
                        .map(|item| item.into_item(difficulty))
                        .collect(),
                }
            }
            ArtifactKind::Flashcards => {
                let reply: FlashcardReply = self.gateway.complete_structured(completion).await?;
                ArtifactItems::FlashcardSet { items: reply.items }
            }
            ArtifactKind::Summary => {
                let reply = self.gateway.complete(completion).await?;
                if reply.text.trim().is_empty() {
                    return Err(ModelError::MalformedOutput("summary reply was empty".into()).into());
                }
                ArtifactItems::Summary { text: reply.text }
            }
        };

        let artifact = StudyArtifact::new(session.id.0.clone(), document.id.clone(), items);
        self.store.put_artifact(artifact.clone()).await?;
        session.artifacts_generated += 1;

        info!(
            artifact_id = %artifact.id,
            kind = artifact.items.kind(),
            items = artifact.items.len(),
            session_id = %session.id,
            "Generated artifact"
        );

        Ok(StudyReply::Artifact { artifact })
    }

    // --- Grading and progress ---

    /// Grade submitted answers against a stored artifact.
    ///
    /// A vanished session or artifact is a state conflict, not a lookup
    /// miss: the client held a reference that stopped being valid.
    pub async fn submit_answers(
        &self,
        user_id: &str,
        session_id: &str,
        artifact_id: &str,
        answers: &[String],
    ) -> Result<SubmissionResult> {
        let mut session = match self.store.get_session(session_id).await? {
            Some(s) if s.user_id == user_id => s,
            _ => {
                return Err(Error::StateConflict(format!(
                    "session '{session_id}' no longer exists"
                )));
            }
        };

        let artifact = match self.store.get_artifact(artifact_id).await? {
            Some(a) if a.session_id == session.id.0 => a,
            _ => {
                return Err(Error::StateConflict(format!(
                    "artifact '{artifact_id}' does not exist in session '{session_id}'"
                )));
            }
        };

        let topic = match self.store.get_document(&artifact.document_id).await? {
            Some(doc) => doc.topic,
            None => "general".to_string(),
        };

        let (report, state) = self
            .progress
            .record_outcome(user_id, &topic, &artifact, answers)
            .await?;

        session.touch(Some(self.free_ttl()));
        self.store.put_session(session).await?;

        Ok(SubmissionResult {
            artifact_id: artifact.id,
            report,
            gamification: ProgressSummary::of(&state, Some(&topic)),
        })
    }

    pub async fn record_study_time(&self, user_id: &str, minutes: u32) -> Result<ProgressSummary> {
        let state = self.progress.record_study_time(user_id, minutes).await?;
        Ok(ProgressSummary::of(&state, None))
    }

    pub async fn progress_state(
        &self,
        user_id: &str,
    ) -> Result<studykit_core::progress::GamificationState> {
        self.progress.state(user_id).await
    }

    // --- Helpers ---

    async fn owned_session(&self, user_id: &str, session_id: &str) -> Result<Session> {
        match self.store.get_session(session_id).await? {
            Some(s) if s.user_id == user_id => Ok(s),
            _ => Err(Error::NotFound(format!("session '{session_id}'"))),
        }
    }

    fn completion(&self, messages: Vec<studykit_core::model::PromptMessage>) -> CompletionRequest {
        CompletionRequest {
            model: self.model_config.chat_model.clone(),
            messages,
            temperature: self.model_config.temperature,
            max_tokens: None,
        }
    }

    fn free_ttl(&self) -> Duration {
        Duration::days(self.session_config.free_ttl_days as i64)
    }
}

fn requested_items(kind: ArtifactKind, requested: Option<usize>) -> usize {
    let default = match kind {
        ArtifactKind::Quiz => DEFAULT_QUIZ_ITEMS,
        ArtifactKind::Flashcards => DEFAULT_FLASHCARD_ITEMS,
        ArtifactKind::Summary => 1,
    };
    requested.unwrap_or(default).clamp(1, MAX_ITEMS)
}
