//! Token estimation.
//!
//! The chunker and the prompt composer both size text against budgets
//! without calling a tokenizer. The heuristic is the usual 4-chars-per-token
//! approximation; it over-counts slightly for dense prose, which errs on
//! the safe side of a hard budget.

/// Estimate the token count of a text.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Estimate tokens for a conversation turn, including per-message framing
/// overhead the chat APIs add around each message.
pub fn estimate_turn_tokens(text: &str) -> usize {
    4 + estimate_tokens(text)
}
