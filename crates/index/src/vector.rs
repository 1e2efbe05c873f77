//! Vector similarity and chunk ranking.
//!
//! Pure-Rust cosine similarity plus the ranking rule the retriever
//! relies on: relevance descending, ties broken by chunk ordinal so
//! results are deterministic for a fixed index and query.

use studykit_core::{EmbeddedChunk, ScoredChunk};

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length or empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank chunks by cosine similarity to a query embedding.
///
/// Returns the top `k` chunks sorted by descending similarity. Equal scores
/// fall back to document order (ascending ordinal), which keeps repeated
/// queries stable and favors earlier material on exact ties.
pub fn rank_chunks(chunks: &[EmbeddedChunk], query: &[f32], k: usize) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = chunks
        .iter()
        .map(|c| ScoredChunk {
            chunk: c.chunk.clone(),
            score: cosine_similarity(&c.embedding, query),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.chunk.ordinal.cmp(&b.chunk.ordinal))
    });
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use studykit_core::Chunk;

    fn embedded(ordinal: usize, embedding: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: Chunk::new("doc-1", ordinal, format!("chunk {ordinal}")),
            embedding,
        }
    }

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn cosine_zero_vector() {
        let a = vec![0.0, 0.0, 0.0];
        let b = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn cosine_mismatched_lengths() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn cosine_known_value() {
        // [1,1] · [1,0] = 1, |[1,1]| = sqrt(2), |[1,0]| = 1
        // similarity = 1 / sqrt(2) ≈ 0.7071
        let a = vec![1.0, 1.0];
        let b = vec![1.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!((sim - 0.7071).abs() < 0.001);
    }

    #[test]
    fn ranks_by_similarity() {
        let query = vec![1.0, 0.0, 0.0];
        let chunks = vec![
            embedded(0, vec![0.0, 1.0, 0.0]), // orthogonal = 0
            embedded(1, vec![1.0, 0.0, 0.0]), // identical = 1
            embedded(2, vec![0.5, 0.5, 0.0]), // partial ≈ 0.707
        ];

        let results = rank_chunks(&chunks, &query, 10);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].chunk.ordinal, 1);
        assert_eq!(results[1].chunk.ordinal, 2);
        assert_eq!(results[2].chunk.ordinal, 0);
    }

    #[test]
    fn equal_scores_break_ties_by_ordinal() {
        let query = vec![1.0, 0.0];
        let chunks = vec![
            embedded(3, vec![1.0, 0.0]),
            embedded(0, vec![1.0, 0.0]),
            embedded(7, vec![1.0, 0.0]),
        ];

        let results = rank_chunks(&chunks, &query, 10);
        let ordinals: Vec<usize> = results.iter().map(|s| s.chunk.ordinal).collect();
        assert_eq!(ordinals, vec![0, 3, 7]);
    }

    #[test]
    fn respects_k() {
        let query = vec![1.0, 0.0];
        let chunks: Vec<_> = (0..10)
            .map(|i| embedded(i, vec![1.0, i as f32 * 0.1]))
            .collect();

        let results = rank_chunks(&chunks, &query, 3);
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn empty_index_yields_nothing() {
        let results = rank_chunks(&[], &[1.0, 0.0], 5);
        assert!(results.is_empty());
    }
}
