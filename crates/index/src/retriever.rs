//! Query-time retrieval: embed the query, rank the document's chunks.

use std::sync::Arc;
use studykit_core::{
    EmbeddingRequest, Error, ModelBackend, Result, ScoredChunk, VectorIndex,
};

/// Fetches the chunks most relevant to a request.
///
/// Retrieval is scoped to a single document. A session without an active
/// document retrieves nothing and the caller proceeds ungrounded; that is
/// a legal state, not an error.
pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    backend: Arc<dyn ModelBackend>,
    embedding_model: String,
    k: usize,
}

impl Retriever {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        backend: Arc<dyn ModelBackend>,
        embedding_model: impl Into<String>,
        k: usize,
    ) -> Self {
        Self {
            index,
            backend,
            embedding_model: embedding_model.into(),
            k,
        }
    }

    /// Top-k chunks of `document_id` relevant to `query`.
    pub async fn retrieve(
        &self,
        document_id: Option<&str>,
        query: &str,
    ) -> Result<Vec<ScoredChunk>> {
        let Some(document_id) = document_id else {
            return Ok(Vec::new());
        };
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        // Skip the embedding round-trip when the document has no index.
        if !self.index.contains(document_id).await {
            tracing::debug!(document_id, "No index for document, retrieving nothing");
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: self.embedding_model.clone(),
            inputs: vec![query.to_string()],
        };
        let response = self.backend.embed(request).await?;
        let embedding = response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::Internal("embedding service returned no vector".into()))?;

        let hits = self.index.search(document_id, &embedding, self.k).await?;
        tracing::debug!(document_id, hits = hits.len(), "Retrieved chunks");
        Ok(hits)
    }
}
