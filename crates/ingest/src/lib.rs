//! # StudyKit Ingest
//!
//! Turns an uploaded file into a retrievable document: format sniffing,
//! text extraction (plain text, Markdown, HTML, PDF), token-window
//! chunking, and batched embedding into the vector index.
//!
//! The pipeline is strict about what it accepts — size-capped, known
//! formats only, no empty documents — and atomic about what it
//! publishes: a document is either fully indexed or not indexed at all.

pub mod builder;
pub mod chunker;
pub mod extract;

pub use builder::IngestPipeline;
pub use chunker::Chunker;
pub use extract::{DocumentFormat, detect_format, extract_text, normalize};
