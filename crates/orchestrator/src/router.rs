//! Mode routing — decides whether a requested mode may run.
//!
//! The mode set is closed, so routing is a pure match over the session
//! state, the requested mode, and the tier. No dispatch tables, no
//! registry: a new mode means a new variant and a new match arm.

use studykit_core::document::Document;
use studykit_core::error::RouteError;
use studykit_core::request::StudyMode;
use studykit_core::session::{Session, SessionMode, Tier};

/// Where a validated request goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineTarget {
    /// Free-form chat, grounded in the active document when one exists.
    Chat,
    /// Structured generation against the active document.
    Artifact(ArtifactKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Quiz,
    Flashcards,
    Summary,
}

/// Validate a mode against the session and pick its pipeline.
///
/// Chat is never gated. Study-tool modes need a study session with an
/// ingested active document, and free sessions stop generating at the
/// per-session artifact cap.
pub fn route(
    session: &Session,
    document: Option<&Document>,
    mode: StudyMode,
    free_artifact_limit: u32,
) -> std::result::Result<PipelineTarget, RouteError> {
    let target = match mode {
        StudyMode::Chat => return Ok(PipelineTarget::Chat),
        StudyMode::GenerateQuiz => PipelineTarget::Artifact(ArtifactKind::Quiz),
        StudyMode::GenerateFlashcards => PipelineTarget::Artifact(ArtifactKind::Flashcards),
        StudyMode::GenerateSummary => PipelineTarget::Artifact(ArtifactKind::Summary),
    };

    if session.mode != SessionMode::Study {
        return Err(not_available(mode, "session was opened in chat-only mode"));
    }

    match document {
        Some(doc) if doc.is_ingested() => {}
        Some(_) => {
            return Err(not_available(
                mode,
                "the uploaded document is not indexed yet; re-upload it",
            ));
        }
        None => {
            return Err(not_available(
                mode,
                "no document uploaded in this session; upload study material first",
            ));
        }
    }

    if session.tier == Tier::Free && session.artifacts_generated >= free_artifact_limit {
        return Err(not_available(
            mode,
            format!(
                "free tier allows {free_artifact_limit} generated artifacts per session; \
                 upgrade or start a new session"
            ),
        ));
    }

    Ok(target)
}

fn not_available(mode: StudyMode, reason: impl Into<String>) -> RouteError {
    RouteError::ModeNotAvailable {
        mode: mode.as_str().to_string(),
        reason: reason.into(),
    }
}
