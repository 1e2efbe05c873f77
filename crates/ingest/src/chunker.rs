//! Token-window chunking.
//!
//! Cuts extracted text into retrieval-sized spans on whitespace
//! boundaries. Consecutive chunks overlap so a fact straddling a cut
//! still lands whole in at least one chunk, and ordinals record the
//! original order for tie-breaking at query time.

use studykit_core::Chunk;

pub struct Chunker {
    chunk_tokens: usize,
    overlap_tokens: usize,
}

impl Chunker {
    pub fn new(chunk_tokens: usize, overlap_tokens: usize) -> Self {
        Self {
            chunk_tokens: chunk_tokens.max(1),
            overlap_tokens: overlap_tokens.min(chunk_tokens.max(1).saturating_sub(1)),
        }
    }

    /// Split `text` into overlapping chunks for `document_id`.
    ///
    /// Every word of the input appears in at least one chunk, and each
    /// chunk stays within the configured token size (a single word longer
    /// than the whole window is kept intact rather than split).
    pub fn split(&self, document_id: &str, text: &str) -> Vec<Chunk> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Vec::new();
        }

        // The token estimator is length-based, so budgets convert to
        // characters exactly: one token per four characters.
        let window_chars = self.chunk_tokens * 4;
        let overlap_chars = self.overlap_tokens * 4;

        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut ordinal = 0usize;

        while start < words.len() {
            let mut end = start;
            let mut used = 0usize;
            while end < words.len() {
                let cost = words[end].len() + usize::from(end > start);
                if used + cost > window_chars && end > start {
                    break;
                }
                used += cost;
                end += 1;
            }

            chunks.push(Chunk::new(document_id, ordinal, words[start..end].join(" ")));
            ordinal += 1;

            if end == words.len() {
                break;
            }

            // Walk back from the cut until the overlap is covered,
            // always advancing past the previous start.
            let mut back = 0usize;
            let mut next = end;
            while next > start + 1 && back < overlap_chars {
                next -= 1;
                back += words[next].len() + 1;
            }
            start = next;
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_text(words: usize) -> String {
        (0..words)
            .map(|i| format!("word{i:04}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunker = Chunker::new(500, 50);
        let chunks = chunker.split("doc-1", "Osmosis moves water across membranes.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].ordinal, 0);
        assert_eq!(chunks[0].text, "Osmosis moves water across membranes.");
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunker = Chunker::new(500, 50);
        assert!(chunker.split("doc-1", "").is_empty());
        assert!(chunker.split("doc-1", "   \n\n  ").is_empty());
    }

    #[test]
    fn long_text_splits_with_sequential_ordinals() {
        let chunker = Chunker::new(100, 10);
        let text = sample_text(500);
        let chunks = chunker.split("doc-1", &text);

        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, i);
            assert!(chunk.token_count <= 100, "chunk {i} too large");
        }
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let chunker = Chunker::new(100, 20);
        let text = sample_text(500);
        let chunks = chunker.split("doc-1", &text);
        assert!(chunks.len() > 1);

        for pair in chunks.windows(2) {
            let tail: Vec<&str> = pair[0].text.split_whitespace().rev().take(3).collect();
            // The next chunk starts inside the previous one's tail region.
            let next_first = pair[1].text.split_whitespace().next().unwrap();
            assert!(
                pair[0].text.contains(next_first),
                "chunk {} does not overlap chunk {}",
                pair[0].ordinal,
                pair[1].ordinal
            );
            assert!(!tail.is_empty());
        }
    }

    #[test]
    fn every_word_is_covered() {
        let chunker = Chunker::new(80, 8);
        let text = sample_text(300);
        let all: String = chunker
            .split("doc-1", &text)
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        for i in 0..300 {
            let word = format!("word{i:04}");
            assert!(all.contains(&word), "{word} missing from chunks");
        }
    }

    #[test]
    fn zero_overlap_still_progresses() {
        let chunker = Chunker::new(50, 0);
        let chunks = chunker.split("doc-1", &sample_text(200));
        assert!(chunks.len() > 1);
        // No word shared between adjacent chunks.
        let first_words: Vec<&str> = chunks[1].text.split_whitespace().take(1).collect();
        assert!(!chunks[0].text.ends_with(first_words[0]));
    }

    #[test]
    fn oversized_single_word_kept_whole() {
        let chunker = Chunker::new(4, 1);
        let long_word = "x".repeat(64);
        let chunks = chunker.split("doc-1", &long_word);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, long_word);
    }
}
