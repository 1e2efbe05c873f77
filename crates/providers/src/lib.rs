//! Model backend implementations for StudyKit.
//!
//! All backends implement the `studykit_core::ModelBackend` trait.
//! `ModelGateway` wraps a backend with retries, backoff, and per-call
//! timeouts; everything else in the system talks to the gateway.

pub mod gateway;
pub mod openai;

pub use gateway::{parse_json_reply, ModelGateway, RetryPolicy};
pub use openai::OpenAiBackend;
