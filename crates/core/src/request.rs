//! The mode-agnostic request surface.
//!
//! Every study interaction arrives as `{session_id, mode, payload}` and
//! leaves as a reply (text or structured artifact) plus a gamification
//! summary. The mode set is closed: routing is a match, not a registry.

use crate::artifact::StudyArtifact;
use crate::progress::ProgressSummary;
use serde::{Deserialize, Serialize};

/// The closed set of request modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyMode {
    Chat,
    GenerateQuiz,
    GenerateFlashcards,
    GenerateSummary,
}

impl StudyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudyMode::Chat => "chat",
            StudyMode::GenerateQuiz => "generate_quiz",
            StudyMode::GenerateFlashcards => "generate_flashcards",
            StudyMode::GenerateSummary => "generate_summary",
        }
    }

    /// Study-tool modes need an ingested document and count toward the
    /// free-tier generation cap; chat does neither.
    pub fn is_study_tool(&self) -> bool {
        !matches!(self, StudyMode::Chat)
    }
}

impl std::fmt::Display for StudyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mode-specific request parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudyPayload {
    /// The user's message (chat mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Requested number of items (quiz/flashcard modes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_count: Option<usize>,
}

/// One inbound study request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyRequest {
    pub session_id: String,
    pub mode: StudyMode,
    #[serde(default)]
    pub payload: StudyPayload,
}

/// The mode-dependent reply body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StudyReply {
    Text { text: String },
    Artifact { artifact: StudyArtifact },
}

/// One outbound study response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyResponse {
    pub session_id: String,
    pub reply: StudyReply,
    pub gamification: ProgressSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_serialize_snake_case() {
        let json = serde_json::to_string(&StudyMode::GenerateQuiz).unwrap();
        assert_eq!(json, "\"generate_quiz\"");
        let mode: StudyMode = serde_json::from_str("\"generate_flashcards\"").unwrap();
        assert_eq!(mode, StudyMode::GenerateFlashcards);
    }

    #[test]
    fn chat_is_not_a_study_tool() {
        assert!(!StudyMode::Chat.is_study_tool());
        assert!(StudyMode::GenerateQuiz.is_study_tool());
        assert!(StudyMode::GenerateSummary.is_study_tool());
    }

    #[test]
    fn request_deserializes_with_defaulted_payload() {
        let req: StudyRequest =
            serde_json::from_str(r#"{"session_id":"s-1","mode":"chat"}"#).unwrap();
        assert_eq!(req.mode, StudyMode::Chat);
        assert!(req.payload.message.is_none());
    }
}
