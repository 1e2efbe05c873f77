//! # StudyKit Store
//!
//! Persistence backends for the storage traits in `studykit-core`:
//!
//! - [`MemoryStore`] — in-process maps; tests and throwaway deployments
//! - [`SqliteStore`] — single-file SQLite with WAL; the default backend
//!
//! Both implement `SessionStore` (sessions, documents, artifacts) and
//! `ProgressStore` (durable gamification state), so a deployment picks
//! one backend for everything or mixes them per concern.

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
