//! Document and Chunk domain types.
//!
//! A Document is the extracted form of one uploaded file, owned by the
//! session that created it. Chunks are the retrievable spans the index
//! builder cuts it into; they are immutable and never outlive the document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Accepted, extraction/indexing not finished.
    Pending,
    /// Extracted and fully indexed; retrievable.
    Ingested,
    /// Extraction or indexing failed; must be re-uploaded.
    Failed,
}

/// An uploaded document after text extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique document ID
    pub id: String,

    /// The verified user who uploaded it
    pub user_id: String,

    /// Display title, taken from the upload filename
    pub title: String,

    /// Topic label for mastery tracking (one topic per document)
    pub topic: String,

    /// Size of the raw upload in bytes
    pub byte_size: usize,

    /// The extracted plain text, paragraph boundaries preserved
    pub text: String,

    /// SHA-256 of the raw bytes; identical uploads dedupe on this
    pub content_hash: String,

    /// Lifecycle status
    pub status: DocumentStatus,

    /// When ingestion completed (or failed)
    pub ingested_at: DateTime<Utc>,
}

impl Document {
    pub fn new(user_id: impl Into<String>, title: impl Into<String>) -> Self {
        let title = title.into();
        let topic = topic_from_title(&title);
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            title,
            topic,
            byte_size: 0,
            text: String::new(),
            content_hash: String::new(),
            status: DocumentStatus::Pending,
            ingested_at: Utc::now(),
        }
    }

    pub fn is_ingested(&self) -> bool {
        self.status == DocumentStatus::Ingested
    }
}

/// Derive the mastery topic from a document title.
///
/// Default strategy: lowercase the filename stem and collapse
/// non-alphanumeric runs. A deployment with an external classifier
/// overwrites `Document::topic` at ingest time instead.
pub fn topic_from_title(title: &str) -> String {
    let stem = title
        .rsplit_once('.')
        .map(|(stem, _ext)| stem)
        .unwrap_or(title);

    let mut topic = String::with_capacity(stem.len());
    let mut last_was_sep = true;
    for c in stem.chars() {
        if c.is_alphanumeric() {
            topic.extend(c.to_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            topic.push('-');
            last_was_sep = true;
        }
    }
    let topic = topic.trim_end_matches('-').to_string();
    if topic.is_empty() { "general".into() } else { topic }
}

/// A retrievable span of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk ID
    pub id: String,

    /// Parent document
    pub document_id: String,

    /// Position within the document; retrieval ties break on this
    pub ordinal: usize,

    /// The text span
    pub text: String,

    /// Estimated token count of `text`
    pub token_count: usize,
}

impl Chunk {
    pub fn new(document_id: impl Into<String>, ordinal: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        let token_count = crate::token::estimate_tokens(&text);
        Self {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.into(),
            ordinal,
            text,
            token_count,
        }
    }
}

/// A chunk paired with its embedding, ready for the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// A chunk returned from retrieval with its relevance score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}
