//! Study artifact types — the structured outputs of deep-study modes.
//!
//! Artifacts are immutable once generated: regenerating produces a new
//! artifact with a new id, never an in-place edit. The quiz answer key
//! lives here because grading happens against the stored artifact, not
//! against whatever the client echoes back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Question difficulty, used both for generation targets and score weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Score weight of a correctly answered item.
    pub fn weight(&self) -> u32 {
        match self {
            Difficulty::Easy => 1,
            Difficulty::Medium => 2,
            Difficulty::Hard => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

/// One multiple-choice quiz item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizItem {
    pub question: String,

    /// Exactly four options, presented in order as A through D.
    pub options: Vec<String>,

    /// The correct option's full text (must be one of `options`).
    pub answer: String,

    pub difficulty: Difficulty,
}

impl QuizItem {
    /// Whether a submitted answer matches the key.
    ///
    /// Accepts the option letter (A–D, any case) or the full option text,
    /// trimmed and case-insensitive.
    pub fn is_correct(&self, submitted: &str) -> bool {
        let submitted = submitted.trim();
        if submitted.len() == 1 {
            let letter = submitted.to_ascii_uppercase().chars().next();
            if let Some(letter) = letter {
                let idx = (letter as usize).wrapping_sub('A' as usize);
                if let Some(option) = self.options.get(idx) {
                    return option.eq_ignore_ascii_case(self.answer.trim());
                }
            }
            return false;
        }
        submitted.eq_ignore_ascii_case(self.answer.trim())
    }
}

/// One flashcard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
}

/// The mode-specific payload of an artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactItems {
    Quiz { items: Vec<QuizItem> },
    FlashcardSet { items: Vec<Flashcard> },
    Summary { text: String },
}

impl ArtifactItems {
    pub fn kind(&self) -> &'static str {
        match self {
            ArtifactItems::Quiz { .. } => "quiz",
            ArtifactItems::FlashcardSet { .. } => "flashcard_set",
            ArtifactItems::Summary { .. } => "summary",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArtifactItems::Quiz { items } => items.len(),
            ArtifactItems::FlashcardSet { items } => items.len(),
            ArtifactItems::Summary { .. } => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An immutable study artifact generated from a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyArtifact {
    pub id: String,
    pub session_id: String,
    pub document_id: String,
    pub items: ArtifactItems,
    pub generated_at: DateTime<Utc>,
}

impl StudyArtifact {
    pub fn new(
        session_id: impl Into<String>,
        document_id: impl Into<String>,
        items: ArtifactItems,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            document_id: document_id.into(),
            items,
            generated_at: Utc::now(),
        }
    }
}
