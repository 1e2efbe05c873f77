//! Prompt composition — layers a request into model-ready messages under
//! a hard token budget.
//!
//! Layer order: mode instruction (with target difficulty for study modes),
//! retrieved excerpts, recent history, the current query. The instruction
//! and query are reserved first; excerpts drop lowest-relevance first and
//! history drops oldest-first when the budget runs short.

use studykit_config::ComposeConfig;
use studykit_core::artifact::Difficulty;
use studykit_core::document::{Document, ScoredChunk};
use studykit_core::error::ComposeError;
use studykit_core::model::PromptMessage;
use studykit_core::session::{Role, Turn};
use studykit_core::token::estimate_turn_tokens;

use crate::router::{ArtifactKind, PipelineTarget};

/// Token overhead per included excerpt (label line plus blank lines).
const CHUNK_FRAMING_TOKENS: usize = 8;

/// Everything the composer reads for one request.
pub struct ComposeInput<'a> {
    pub target: PipelineTarget,
    pub document: Option<&'a Document>,
    pub chunks: &'a [ScoredChunk],
    pub history: &'a [Turn],
    /// The user's mastery of the document topic, 0..=5.
    pub mastery: u8,
    /// The chat message; unused for generation targets.
    pub message: &'a str,
    /// Requested item count for quiz/flashcard targets.
    pub item_count: usize,
}

/// A model-ready prompt plus composition metadata.
#[derive(Debug, Clone)]
pub struct ComposedPrompt {
    pub messages: Vec<PromptMessage>,
    pub plan: PromptPlan,
}

/// What went into the prompt and what was dropped, for logs and tests.
#[derive(Debug, Clone)]
pub struct PromptPlan {
    pub budget: usize,
    pub tokens_used: usize,
    pub chunks_included: usize,
    pub chunks_dropped: usize,
    pub turns_included: usize,
    pub turns_dropped: usize,
}

/// Composes prompts within the configured token budget.
pub struct PromptComposer {
    budget: usize,
    max_history_turns: usize,
}

impl PromptComposer {
    pub fn new(config: &ComposeConfig) -> Self {
        Self {
            budget: config.token_budget,
            max_history_turns: config.max_history_turns,
        }
    }

    /// Compose the prompt for one request.
    ///
    /// Fails with `PromptTooLarge` when the instruction and query alone
    /// blow the budget, or when excerpts were retrieved but not even the
    /// most relevant one fits.
    pub fn compose(&self, input: ComposeInput<'_>) -> Result<ComposedPrompt, ComposeError> {
        let difficulty = difficulty_for_mastery(input.mastery);
        let instruction = self.instruction(&input, difficulty);
        let query = self.query(&input);

        let reserved = estimate_turn_tokens(&instruction) + estimate_turn_tokens(&query);
        if reserved > self.budget {
            return Err(ComposeError::PromptTooLarge {
                required: reserved,
                budget: self.budget,
            });
        }
        let mut used = reserved;

        // Excerpts: the input arrives relevance-descending, so keeping a
        // prefix drops the lowest-relevance chunks first.
        let mut kept_chunks: Vec<&ScoredChunk> = Vec::new();
        for hit in input.chunks {
            let cost = hit.chunk.token_count + CHUNK_FRAMING_TOKENS;
            if used + cost > self.budget {
                break;
            }
            used += cost;
            kept_chunks.push(hit);
        }
        if kept_chunks.is_empty() && !input.chunks.is_empty() {
            let first_cost = input.chunks[0].chunk.token_count + CHUNK_FRAMING_TOKENS;
            return Err(ComposeError::PromptTooLarge {
                required: reserved + first_cost,
                budget: self.budget,
            });
        }
        let chunks_dropped = input.chunks.len() - kept_chunks.len();

        // History rides along for chat only; generation prompts stay clean.
        let history: &[Turn] = match input.target {
            PipelineTarget::Chat => input.history,
            PipelineTarget::Artifact(_) => &[],
        };
        let mut kept_turns: Vec<&Turn> = Vec::new();
        for turn in history.iter().rev() {
            if kept_turns.len() >= self.max_history_turns || used + turn.token_count > self.budget
            {
                break;
            }
            used += turn.token_count;
            kept_turns.push(turn);
        }
        kept_turns.reverse();
        let turns_dropped = history.len() - kept_turns.len();

        let mut system_text = instruction;
        if !kept_chunks.is_empty() {
            system_text.push_str("\n\nStudy material excerpts:");
            for (i, hit) in kept_chunks.iter().enumerate() {
                system_text.push_str(&format!("\n\n[Excerpt {}]\n{}", i + 1, hit.chunk.text));
            }
        }

        let mut messages = Vec::with_capacity(kept_turns.len() + 2);
        messages.push(PromptMessage::system(system_text));
        for turn in &kept_turns {
            messages.push(match turn.role {
                Role::User => PromptMessage::user(&turn.text),
                Role::Assistant => PromptMessage::assistant(&turn.text),
            });
        }
        messages.push(PromptMessage::user(query));

        Ok(ComposedPrompt {
            messages,
            plan: PromptPlan {
                budget: self.budget,
                tokens_used: used,
                chunks_included: kept_chunks.len(),
                chunks_dropped,
                turns_included: kept_turns.len(),
                turns_dropped,
            },
        })
    }

    fn instruction(&self, input: &ComposeInput<'_>, difficulty: Difficulty) -> String {
        match input.target {
            PipelineTarget::Chat => match input.document {
                Some(doc) => format!(
                    "You are StudyKit, a patient study tutor. The student is working \
                     through \"{}\". Ground your answers in the provided excerpts; when \
                     they do not cover the question, say so before answering from general \
                     knowledge. Be concise.",
                    doc.title
                ),
                None => "You are StudyKit, a patient study tutor. No study material is \
                         loaded, so answer from general knowledge and keep answers concise."
                    .to_string(),
            },
            PipelineTarget::Artifact(ArtifactKind::Quiz) => {
                let title = document_title(input.document);
                let diff = difficulty.as_str();
                format!(
                    "You are StudyKit's quiz writer. From the provided excerpts of \
                     \"{title}\", write exactly {count} multiple-choice questions at \
                     {diff} difficulty. Reply with only a JSON object of the form \
                     {{\"items\": [{{\"question\": \"...\", \"options\": [\"...\", \"...\", \
                     \"...\", \"...\"], \"answer\": \"...\", \"difficulty\": \"{diff}\"}}]}}. \
                     Every question has exactly four options and the answer repeats one \
                     option verbatim. No prose, no code fences.",
                    count = input.item_count,
                )
            }
            PipelineTarget::Artifact(ArtifactKind::Flashcards) => {
                let title = document_title(input.document);
                format!(
                    "You are StudyKit's flashcard writer. From the provided excerpts of \
                     \"{title}\", write exactly {count} flashcards at {diff} difficulty. \
                     Reply with only a JSON object of the form {{\"items\": [{{\"front\": \
                     \"...\", \"back\": \"...\"}}]}}. Fronts are prompts or terms, backs \
                     are the answers or definitions. No prose, no code fences.",
                    count = input.item_count,
                    diff = difficulty.as_str(),
                )
            }
            PipelineTarget::Artifact(ArtifactKind::Summary) => format!(
                "You are StudyKit's summarizer. Summarize the provided excerpts of \
                 \"{}\" for revision: core concepts, definitions, and key facts, in \
                 clear prose with short sections. Write nothing but the summary.",
                document_title(input.document),
            ),
        }
    }

    fn query(&self, input: &ComposeInput<'_>) -> String {
        match input.target {
            PipelineTarget::Chat => input.message.to_string(),
            PipelineTarget::Artifact(ArtifactKind::Quiz) => {
                format!("Generate the {} questions now.", input.item_count)
            }
            PipelineTarget::Artifact(ArtifactKind::Flashcards) => {
                format!("Generate the {} flashcards now.", input.item_count)
            }
            PipelineTarget::Artifact(ArtifactKind::Summary) => "Write the summary now.".into(),
        }
    }
}

/// Map topic mastery to a generation difficulty: low mastery gets easy
/// questions, high mastery gets hard ones.
pub fn difficulty_for_mastery(level: u8) -> Difficulty {
    match level {
        0 | 1 => Difficulty::Easy,
        2 | 3 => Difficulty::Medium,
        _ => Difficulty::Hard,
    }
}

fn document_title(document: Option<&Document>) -> &str {
    document.map(|d| d.title.as_str()).unwrap_or("the material")
}
