//! VectorIndex trait — the retrieval seam.
//!
//! An index holds the embedded chunks of fully built documents and answers
//! nearest-neighbor queries. Either an in-process store or an external
//! vector database satisfies this contract; the retriever does not care.

use crate::document::{EmbeddedChunk, ScoredChunk};
use crate::error::IndexError;
use async_trait::async_trait;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Register a fully built document index.
    ///
    /// The chunk set for a document is immutable once stored: calling this
    /// again for the same document replaces the whole set (rebuild), never
    /// patches it.
    async fn store(
        &self,
        document_id: &str,
        chunks: Vec<EmbeddedChunk>,
    ) -> Result<(), IndexError>;

    /// Top-`k` chunks of `document_id` by similarity to `query`,
    /// relevance-descending, ties broken by chunk ordinal.
    ///
    /// An unknown document yields an empty result, not an error: retrieval
    /// without a grounding document is a legal, degenerate case.
    async fn search(
        &self,
        document_id: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, IndexError>;

    /// Drop a document's chunks. Idempotent.
    async fn remove(&self, document_id: &str) -> Result<(), IndexError>;

    /// Whether a document has a built index.
    async fn contains(&self, document_id: &str) -> bool;
}
