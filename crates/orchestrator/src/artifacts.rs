//! Structured reply schemas for the generation modes.
//!
//! Validation runs inside deserialization (`try_from` shadows), so a
//! schema violation fails the parse itself and the gateway's corrective
//! retry covers it the same as broken JSON: a quiz with three options or
//! an answer that matches no option never reaches the caller.

use serde::Deserialize;
use studykit_core::artifact::{Difficulty, Flashcard, QuizItem};

/// A validated quiz reply.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawQuizReply")]
pub struct QuizReply {
    pub items: Vec<ValidatedQuizItem>,
}

/// One quiz item that passed validation; difficulty may still be absent.
#[derive(Debug, Clone)]
pub struct ValidatedQuizItem {
    pub question: String,
    pub options: Vec<String>,
    /// Normalized to the exact text of the matching option.
    pub answer: String,
    pub difficulty: Option<Difficulty>,
}

impl ValidatedQuizItem {
    /// Finish the item, filling a missing difficulty with the target the
    /// prompt asked for.
    pub fn into_item(self, fallback: Difficulty) -> QuizItem {
        QuizItem {
            question: self.question,
            options: self.options,
            answer: self.answer,
            difficulty: self.difficulty.unwrap_or(fallback),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawQuizReply {
    items: Vec<RawQuizItem>,
}

#[derive(Debug, Deserialize)]
struct RawQuizItem {
    question: String,
    options: Vec<String>,
    answer: String,
    #[serde(default)]
    difficulty: Option<Difficulty>,
}

impl TryFrom<RawQuizReply> for QuizReply {
    type Error = String;

    fn try_from(raw: RawQuizReply) -> Result<Self, Self::Error> {
        if raw.items.is_empty() {
            return Err("quiz has no items".into());
        }

        let mut items = Vec::with_capacity(raw.items.len());
        for (i, item) in raw.items.into_iter().enumerate() {
            let n = i + 1;
            if item.question.trim().is_empty() {
                return Err(format!("item {n}: question is empty"));
            }
            if item.options.len() != 4 {
                return Err(format!(
                    "item {n}: expected exactly 4 options, got {}",
                    item.options.len()
                ));
            }
            if item.options.iter().any(|o| o.trim().is_empty()) {
                return Err(format!("item {n}: options must be non-empty"));
            }
            let answer = item.answer.trim();
            let Some(matched) = item
                .options
                .iter()
                .find(|o| o.trim().eq_ignore_ascii_case(answer))
            else {
                return Err(format!(
                    "item {n}: answer {answer:?} is not one of the options"
                ));
            };
            items.push(ValidatedQuizItem {
                question: item.question,
                answer: matched.clone(),
                options: item.options,
                difficulty: item.difficulty,
            });
        }

        Ok(QuizReply { items })
    }
}

/// A validated flashcard reply.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawFlashcardReply")]
pub struct FlashcardReply {
    pub items: Vec<Flashcard>,
}

#[derive(Debug, Deserialize)]
struct RawFlashcardReply {
    items: Vec<RawFlashcard>,
}

#[derive(Debug, Deserialize)]
struct RawFlashcard {
    front: String,
    back: String,
}

impl TryFrom<RawFlashcardReply> for FlashcardReply {
    type Error = String;

    fn try_from(raw: RawFlashcardReply) -> Result<Self, Self::Error> {
        if raw.items.is_empty() {
            return Err("flashcard set has no items".into());
        }

        let mut items = Vec::with_capacity(raw.items.len());
        for (i, card) in raw.items.into_iter().enumerate() {
            if card.front.trim().is_empty() || card.back.trim().is_empty() {
                return Err(format!("card {}: front and back must be non-empty", i + 1));
            }
            items.push(Flashcard {
                front: card.front,
                back: card.back,
            });
        }

        Ok(FlashcardReply { items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz_json(answer: &str, options: usize) -> String {
        let opts: Vec<String> = (0..options).map(|i| format!("\"opt {i}\"")).collect();
        format!(
            r#"{{"items": [{{"question": "Which?", "options": [{}], "answer": "{answer}", "difficulty": "medium"}}]}}"#,
            opts.join(", ")
        )
    }

    #[test]
    fn valid_quiz_parses() {
        let reply: QuizReply = serde_json::from_str(&quiz_json("opt 2", 4)).unwrap();
        assert_eq!(reply.items.len(), 1);
        assert_eq!(reply.items[0].answer, "opt 2");
        assert_eq!(reply.items[0].difficulty, Some(Difficulty::Medium));
    }

    #[test]
    fn answer_is_normalized_to_option_text() {
        let reply: QuizReply = serde_json::from_str(&quiz_json("  OPT 1  ", 4)).unwrap();
        assert_eq!(reply.items[0].answer, "opt 1");
    }

    #[test]
    fn wrong_option_count_fails_parse() {
        let err = serde_json::from_str::<QuizReply>(&quiz_json("opt 0", 3)).unwrap_err();
        assert!(err.to_string().contains("exactly 4 options"));
    }

    #[test]
    fn answer_outside_options_fails_parse() {
        let err = serde_json::from_str::<QuizReply>(&quiz_json("something else", 4)).unwrap_err();
        assert!(err.to_string().contains("not one of the options"));
    }

    #[test]
    fn empty_quiz_fails_parse() {
        let err = serde_json::from_str::<QuizReply>(r#"{"items": []}"#).unwrap_err();
        assert!(err.to_string().contains("no items"));
    }

    #[test]
    fn missing_difficulty_takes_fallback() {
        let json = r#"{"items": [{"question": "Q?", "options": ["a", "b", "c", "d"], "answer": "b"}]}"#;
        let reply: QuizReply = serde_json::from_str(json).unwrap();
        let item = reply.items[0].clone().into_item(Difficulty::Hard);
        assert_eq!(item.difficulty, Difficulty::Hard);
        assert!(item.is_correct("B"));
    }

    #[test]
    fn valid_flashcards_parse() {
        let json = r#"{"items": [{"front": "osmosis", "back": "water diffusion across a membrane"}]}"#;
        let reply: FlashcardReply = serde_json::from_str(json).unwrap();
        assert_eq!(reply.items.len(), 1);
        assert_eq!(reply.items[0].front, "osmosis");
    }

    #[test]
    fn blank_flashcard_fails_parse() {
        let json = r#"{"items": [{"front": "  ", "back": "x"}]}"#;
        let err = serde_json::from_str::<FlashcardReply>(json).unwrap_err();
        assert!(err.to_string().contains("non-empty"));
    }
}
