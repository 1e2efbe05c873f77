//! The ingestion pipeline: validate, extract, chunk, embed, publish.
//!
//! A document's index is all-or-nothing. Embeddings are produced in
//! batches, and any batch that still fails after the backend's internal
//! retries aborts the whole build; nothing is published to the index and
//! the document is recorded as failed. Re-uploading identical bytes is a
//! no-op once a build has succeeded.

use crate::chunker::Chunker;
use crate::extract;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use studykit_core::{
    Chunk, Document, DocumentStatus, EmbeddedChunk, EmbeddingRequest, Error, IndexError,
    IngestError, KeyedLocks, ModelBackend, Result, SessionStore, VectorIndex,
};
use studykit_config::IngestConfig;

pub struct IngestPipeline {
    store: Arc<dyn SessionStore>,
    index: Arc<dyn VectorIndex>,
    backend: Arc<dyn ModelBackend>,
    chunker: Chunker,
    config: IngestConfig,
    embedding_model: String,
    /// Serializes concurrent builds of the same upload per user.
    builds: KeyedLocks,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<dyn SessionStore>,
        index: Arc<dyn VectorIndex>,
        backend: Arc<dyn ModelBackend>,
        config: IngestConfig,
        embedding_model: impl Into<String>,
    ) -> Self {
        let chunker = Chunker::new(config.chunk_tokens, config.chunk_overlap);
        Self {
            store,
            index,
            backend,
            chunker,
            config,
            embedding_model: embedding_model.into(),
            builds: KeyedLocks::new(),
        }
    }

    /// Ingest an upload end to end and return the stored document.
    ///
    /// On success the document is `Ingested` and its index is live.
    /// On failure nothing is retrievable: the index never sees a
    /// partially embedded document.
    pub async fn ingest(
        &self,
        user_id: &str,
        filename: &str,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<Document> {
        if bytes.len() > self.config.max_file_size {
            return Err(IngestError::SizeExceeded {
                size: bytes.len(),
                max: self.config.max_file_size,
            }
            .into());
        }
        if bytes.is_empty() {
            return Err(IngestError::EmptyContent.into());
        }

        let content_hash = hex_digest(bytes);
        let _guard = self
            .builds
            .acquire(&format!("{user_id}:{content_hash}"))
            .await;

        // Identical re-upload: hand back the already-built document.
        if let Some(existing) = self
            .store
            .find_document_by_hash(user_id, &content_hash)
            .await?
        {
            if existing.is_ingested() && self.index.contains(&existing.id).await {
                tracing::debug!(document_id = %existing.id, "Re-upload of built document, skipping");
                return Ok(existing);
            }
        }

        let format = extract::detect_format(content_type, filename, bytes)?;
        let raw = extract::extract_text(format, bytes)?;
        let text = extract::normalize(&raw);
        if text.is_empty() {
            return Err(IngestError::EmptyContent.into());
        }

        let mut document = Document::new(user_id, filename);
        document.byte_size = bytes.len();
        document.content_hash = content_hash;
        document.text = text;

        let chunks = self.chunker.split(&document.id, &document.text);
        tracing::info!(
            document_id = %document.id,
            format = format.as_str(),
            bytes = document.byte_size,
            chunks = chunks.len(),
            "Extracted document"
        );

        let embedded = match self.embed_chunks(&chunks).await {
            Ok(embedded) => embedded,
            Err(err) => {
                document.status = DocumentStatus::Failed;
                document.ingested_at = Utc::now();
                if let Err(store_err) = self.store.put_document(document).await {
                    tracing::warn!(error = %store_err, "Could not record failed ingest");
                }
                return Err(err);
            }
        };

        self.index.store(&document.id, embedded).await?;

        document.status = DocumentStatus::Ingested;
        document.ingested_at = Utc::now();
        self.store.put_document(document.clone()).await?;

        tracing::info!(document_id = %document.id, topic = %document.topic, "Document ingested");
        Ok(document)
    }

    /// Embed every chunk, batched. The backend retries transient failures
    /// internally; a failure surfacing here is final for this build.
    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<EmbeddedChunk>> {
        let total = chunks.len();
        let mut out: Vec<EmbeddedChunk> = Vec::with_capacity(total);
        let mut dimension: Option<usize> = None;

        for batch in chunks.chunks(self.config.embed_batch_size.max(1)) {
            let request = EmbeddingRequest {
                model: self.embedding_model.clone(),
                inputs: batch.iter().map(|c| c.text.clone()).collect(),
            };

            let response = match self.backend.embed(request).await {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!(
                        embedded = out.len(),
                        total,
                        error = %err,
                        "Embedding batch failed, discarding build"
                    );
                    return Err(IngestError::IndexingIncomplete {
                        embedded: out.len(),
                        total,
                    }
                    .into());
                }
            };

            if response.embeddings.len() != batch.len() {
                tracing::warn!(
                    expected = batch.len(),
                    got = response.embeddings.len(),
                    "Embedding count mismatch, discarding build"
                );
                return Err(IngestError::IndexingIncomplete {
                    embedded: out.len(),
                    total,
                }
                .into());
            }

            for (chunk, embedding) in batch.iter().zip(response.embeddings) {
                match dimension {
                    Some(expected) if embedding.len() != expected => {
                        return Err(Error::Index(IndexError::DimensionMismatch {
                            expected,
                            got: embedding.len(),
                        }));
                    }
                    None => dimension = Some(embedding.len()),
                    _ => {}
                }
                out.push(EmbeddedChunk {
                    chunk: chunk.clone(),
                    embedding,
                });
            }
        }

        Ok(out)
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
