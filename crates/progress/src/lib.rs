//! Grading and gamification for StudyKit.
//!
//! `grading` turns a stored artifact plus submitted answers into a
//! `GradeReport`; `ProgressEngine` folds reports and study time into
//! durable per-user state.

pub mod engine;
pub mod grading;

pub use engine::ProgressEngine;
pub use grading::grade;
