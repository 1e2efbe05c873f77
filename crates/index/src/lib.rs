//! # StudyKit Index
//!
//! The retrieval side of StudyKit: cosine ranking, an in-process vector
//! index, and the query-time retriever.
//!
//! The index contract lives in `studykit-core` (`VectorIndex`); this crate
//! ships the default in-memory implementation. A deployment backed by an
//! external vector database implements the same trait and swaps in.

pub mod memory;
pub mod retriever;
pub mod vector;

pub use memory::InMemoryIndex;
pub use retriever::Retriever;
pub use vector::{cosine_similarity, rank_chunks};
