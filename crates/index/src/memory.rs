//! In-process vector index.
//!
//! Holds the embedded chunks of each built document in a map keyed by
//! document ID. Storing a document replaces its whole chunk set, so a
//! rebuild can never leave a half-updated index behind.

use crate::vector;
use async_trait::async_trait;
use std::collections::HashMap;
use studykit_core::{EmbeddedChunk, IndexError, ScoredChunk, VectorIndex};
use tokio::sync::RwLock;

pub struct InMemoryIndex {
    documents: RwLock<HashMap<String, Vec<EmbeddedChunk>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
        }
    }

    /// Number of documents with a built index.
    pub async fn document_count(&self) -> usize {
        self.documents.read().await.len()
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn store(
        &self,
        document_id: &str,
        chunks: Vec<EmbeddedChunk>,
    ) -> Result<(), IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::Rejected("empty chunk set".into()));
        }

        let dimension = chunks[0].embedding.len();
        for chunk in &chunks[1..] {
            if chunk.embedding.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    got: chunk.embedding.len(),
                });
            }
        }

        tracing::debug!(document_id, chunks = chunks.len(), "Index built");
        self.documents
            .write()
            .await
            .insert(document_id.to_string(), chunks);
        Ok(())
    }

    async fn search(
        &self,
        document_id: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        let documents = self.documents.read().await;
        let Some(chunks) = documents.get(document_id) else {
            return Ok(Vec::new());
        };
        Ok(vector::rank_chunks(chunks, query, k))
    }

    async fn remove(&self, document_id: &str) -> Result<(), IndexError> {
        self.documents.write().await.remove(document_id);
        Ok(())
    }

    async fn contains(&self, document_id: &str) -> bool {
        self.documents.read().await.contains_key(document_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studykit_core::Chunk;

    fn embedded(document_id: &str, ordinal: usize, embedding: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: Chunk::new(document_id, ordinal, format!("span {ordinal}")),
            embedding,
        }
    }

    #[tokio::test]
    async fn store_and_search() {
        let index = InMemoryIndex::new();
        index
            .store(
                "doc-1",
                vec![
                    embedded("doc-1", 0, vec![1.0, 0.0]),
                    embedded("doc-1", 1, vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        assert!(index.contains("doc-1").await);

        let hits = index.search("doc-1", &[1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.ordinal, 0);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn unknown_document_yields_empty() {
        let index = InMemoryIndex::new();
        let hits = index.search("no-such-doc", &[1.0, 0.0], 5).await.unwrap();
        assert!(hits.is_empty());
        assert!(!index.contains("no-such-doc").await);
    }

    #[tokio::test]
    async fn rebuild_replaces_chunk_set() {
        let index = InMemoryIndex::new();
        index
            .store("doc-1", vec![embedded("doc-1", 0, vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .store(
                "doc-1",
                vec![
                    embedded("doc-1", 0, vec![0.0, 1.0]),
                    embedded("doc-1", 1, vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let hits = index.search("doc-1", &[0.0, 1.0], 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(index.document_count().await, 1);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let index = InMemoryIndex::new();
        index
            .store("doc-1", vec![embedded("doc-1", 0, vec![1.0])])
            .await
            .unwrap();

        index.remove("doc-1").await.unwrap();
        index.remove("doc-1").await.unwrap();
        assert!(!index.contains("doc-1").await);
    }

    #[tokio::test]
    async fn rejects_empty_chunk_set() {
        let index = InMemoryIndex::new();
        let result = index.store("doc-1", Vec::new()).await;
        assert!(matches!(result, Err(IndexError::Rejected(_))));
    }

    #[tokio::test]
    async fn rejects_mixed_dimensions() {
        let index = InMemoryIndex::new();
        let result = index
            .store(
                "doc-1",
                vec![
                    embedded("doc-1", 0, vec![1.0, 0.0]),
                    embedded("doc-1", 1, vec![1.0, 0.0, 0.0]),
                ],
            )
            .await;
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }
}
