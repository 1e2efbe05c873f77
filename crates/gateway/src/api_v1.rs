//! HTTP API v1 — the REST surface of the study service.
//!
//! Endpoints:
//!
//! - `POST   /v1/sessions`               — Open a session
//! - `GET    /v1/sessions`               — List the caller's sessions
//! - `GET    /v1/sessions/{id}`          — Get a session with its history
//! - `DELETE /v1/sessions/{id}`          — Delete a session and its document
//! - `POST   /v1/sessions/{id}/document` — Upload study material (raw body)
//! - `POST   /v1/study`                  — Chat or generate a study artifact
//! - `POST   /v1/sessions/{id}/submit`   — Submit quiz answers for grading
//! - `POST   /v1/study-time`             — Log self-reported study minutes
//! - `GET    /v1/progress`               — The caller's gamification state
//!
//! Every error body is `{error, kind}` where `kind` is one of the stable
//! identifiers the service emits; the status code follows from the kind.

use axum::{
    Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use studykit_core::document::{Document, DocumentStatus};
use studykit_core::error::Error;
use studykit_core::progress::ProgressSummary;
use studykit_core::request::{StudyRequest, StudyResponse};
use studykit_core::session::{Role, Session, SessionMode, Tier, Turn};
use studykit_orchestrator::{StudyService, SubmissionResult};

// ── State ─────────────────────────────────────────────────────────────────

pub type SharedState = Arc<StudyService>;

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(service: SharedState) -> Router {
    Router::new()
        .route("/sessions", post(create_session_handler))
        .route("/sessions", get(list_sessions_handler))
        .route("/sessions/{id}", get(get_session_handler))
        .route("/sessions/{id}", axum::routing::delete(delete_session_handler))
        .route("/sessions/{id}/document", post(upload_document_handler))
        .route("/study", post(study_handler))
        .route("/sessions/{id}/submit", post(submit_handler))
        .route("/study-time", post(study_time_handler))
        .route("/progress", get(progress_handler))
        .with_state(service)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

#[derive(Deserialize)]
struct CreateSessionRequest {
    /// "chat" or "study"; defaults to "study".
    #[serde(default)]
    mode: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct SessionView {
    id: String,
    mode: SessionMode,
    tier: Tier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    active_document_id: Option<String>,
    history_turns: usize,
    artifacts_generated: u32,
    created_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.0.clone(),
            mode: session.mode,
            tier: session.tier,
            active_document_id: session.active_document_id.clone(),
            history_turns: session.history.len(),
            artifacts_generated: session.artifacts_generated,
            created_at: session.created_at,
            last_active: session.last_active,
            expires_at: session.expires_at,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct SessionListResponse {
    sessions: Vec<SessionView>,
    count: usize,
}

#[derive(Serialize, Deserialize)]
struct SessionDetailResponse {
    session: SessionView,
    history: Vec<TurnView>,
}

#[derive(Serialize, Deserialize)]
struct TurnView {
    role: Role,
    text: String,
    timestamp: DateTime<Utc>,
}

impl From<&Turn> for TurnView {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role,
            text: turn.text.clone(),
            timestamp: turn.timestamp,
        }
    }
}

#[derive(Deserialize)]
struct UploadParams {
    #[serde(default)]
    filename: Option<String>,
}

/// The stored document without its full text.
#[derive(Serialize, Deserialize)]
struct DocumentView {
    id: String,
    title: String,
    topic: String,
    status: DocumentStatus,
    byte_size: usize,
    ingested_at: DateTime<Utc>,
}

impl From<&Document> for DocumentView {
    fn from(document: &Document) -> Self {
        Self {
            id: document.id.clone(),
            title: document.title.clone(),
            topic: document.topic.clone(),
            status: document.status,
            byte_size: document.byte_size,
            ingested_at: document.ingested_at,
        }
    }
}

#[derive(Deserialize)]
struct SubmitRequest {
    artifact_id: String,
    answers: Vec<String>,
}

#[derive(Deserialize)]
struct StudyTimeRequest {
    minutes: u32,
}

#[derive(Serialize, Deserialize)]
struct ProgressResponse {
    score: u64,
    level: u32,
    streak: u32,
    mastery: BTreeMap<String, u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_activity: Option<NaiveDate>,
}

// ── Identity and error mapping ────────────────────────────────────────────

struct Caller {
    user_id: String,
    tier: Tier,
}

/// Pull the verified subject and tier flag out of the request headers.
///
/// The auth provider upstream terminates authentication; the subject in
/// the bearer slot is trusted here. An absent `X-User-Tier` means free.
fn caller(headers: &HeaderMap) -> Result<Caller, (StatusCode, Json<ErrorResponse>)> {
    let user_id = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Missing bearer identity".into(),
                    kind: "unauthorized".into(),
                }),
            )
        })?;

    let tier = headers
        .get("x-user-tier")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or_default();

    Ok(Caller {
        user_id: user_id.to_string(),
        tier,
    })
}

/// Map a service error to a status code plus `{error, kind}` body.
fn error_response(err: Error) -> (StatusCode, Json<ErrorResponse>) {
    let kind = err.kind();
    let status = match kind {
        "size_exceeded" => StatusCode::PAYLOAD_TOO_LARGE,
        "unsupported_format" => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        "empty_content" | "invalid_request" | "prompt_too_large" | "mode_not_available" => {
            StatusCode::BAD_REQUEST
        }
        "not_found" => StatusCode::NOT_FOUND,
        "state_conflict" => StatusCode::CONFLICT,
        "indexing_incomplete" | "malformed_model_output" => StatusCode::BAD_GATEWAY,
        "model_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!(kind, error = %err, "Request failed");
    }

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            kind: kind.to_string(),
        }),
    )
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
            kind: "invalid_request".into(),
        }),
    )
}

// ── Session handlers ──────────────────────────────────────────────────────

async fn create_session_handler(
    State(service): State<SharedState>,
    headers: HeaderMap,
    payload: Option<Json<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<SessionView>), (StatusCode, Json<ErrorResponse>)> {
    let caller = caller(&headers)?;

    let mode = match payload.and_then(|Json(p)| p.mode) {
        None => SessionMode::Study,
        Some(raw) => raw.parse().map_err(|_| {
            bad_request(format!("Unknown session mode '{raw}'. Use 'chat' or 'study'."))
        })?,
    };

    let session = service
        .create_session(&caller.user_id, caller.tier, mode)
        .await
        .map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(SessionView::from(&session))))
}

async fn list_sessions_handler(
    State(service): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<SessionListResponse>, (StatusCode, Json<ErrorResponse>)> {
    let caller = caller(&headers)?;

    let sessions = service
        .list_sessions(&caller.user_id)
        .await
        .map_err(error_response)?;

    let views: Vec<SessionView> = sessions.iter().map(SessionView::from).collect();
    Ok(Json(SessionListResponse {
        count: views.len(),
        sessions: views,
    }))
}

async fn get_session_handler(
    State(service): State<SharedState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<SessionDetailResponse>, (StatusCode, Json<ErrorResponse>)> {
    let caller = caller(&headers)?;

    let session = service
        .get_session(&caller.user_id, &session_id)
        .await
        .map_err(error_response)?;

    Ok(Json(SessionDetailResponse {
        session: SessionView::from(&session),
        history: session.history.iter().map(TurnView::from).collect(),
    }))
}

async fn delete_session_handler(
    State(service): State<SharedState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let caller = caller(&headers)?;

    service
        .delete_session(&caller.user_id, &session_id)
        .await
        .map_err(error_response)?;

    Ok(StatusCode::NO_CONTENT)
}

// ── Document upload ───────────────────────────────────────────────────────

async fn upload_document_handler(
    State(service): State<SharedState>,
    Path(session_id): Path<String>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<DocumentView>), (StatusCode, Json<ErrorResponse>)> {
    let caller = caller(&headers)?;

    let filename = params.filename.as_deref().unwrap_or("upload");
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    info!(
        session_id = %session_id,
        filename = %filename,
        bytes = body.len(),
        "v1 document upload"
    );

    let document = service
        .upload_document(&caller.user_id, &session_id, filename, content_type, &body)
        .await
        .map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(DocumentView::from(&document))))
}

// ── Study requests ────────────────────────────────────────────────────────

async fn study_handler(
    State(service): State<SharedState>,
    headers: HeaderMap,
    Json(request): Json<StudyRequest>,
) -> Result<Json<StudyResponse>, (StatusCode, Json<ErrorResponse>)> {
    let caller = caller(&headers)?;
    info!(session_id = %request.session_id, mode = %request.mode, "v1 study request");

    let response = service
        .handle(&caller.user_id, caller.tier, request)
        .await
        .map_err(error_response)?;

    Ok(Json(response))
}

async fn submit_handler(
    State(service): State<SharedState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<SubmissionResult>, (StatusCode, Json<ErrorResponse>)> {
    let caller = caller(&headers)?;

    let result = service
        .submit_answers(
            &caller.user_id,
            &session_id,
            &request.artifact_id,
            &request.answers,
        )
        .await
        .map_err(error_response)?;

    Ok(Json(result))
}

// ── Progress ──────────────────────────────────────────────────────────────

async fn study_time_handler(
    State(service): State<SharedState>,
    headers: HeaderMap,
    Json(request): Json<StudyTimeRequest>,
) -> Result<Json<ProgressSummary>, (StatusCode, Json<ErrorResponse>)> {
    let caller = caller(&headers)?;

    let summary = service
        .record_study_time(&caller.user_id, request.minutes)
        .await
        .map_err(error_response)?;

    Ok(Json(summary))
}

async fn progress_handler(
    State(service): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<ProgressResponse>, (StatusCode, Json<ErrorResponse>)> {
    let caller = caller(&headers)?;

    let state = service
        .progress_state(&caller.user_id)
        .await
        .map_err(error_response)?;

    Ok(Json(ProgressResponse {
        score: state.score,
        level: state.level(),
        streak: state.streak,
        mastery: state.mastery,
        last_activity: state.last_activity,
    }))
}
