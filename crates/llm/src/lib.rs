//! LLM Provider Abstraction & Prompt Assembly (spec.md §4.D, §4.E)
//!
//! Grounded on the teacher's `voice-agent-llm` crate: a small `LlmError`
//! enum (`crates/llm/src/lib.rs`), an `LlmBackend` trait with one concrete
//! `OllamaBackend` and retry/backoff logic (`crates/llm/src/backend.rs`),
//! and a `PromptBuilder` (`crates/llm/src/prompt.rs`). Generalized here
//! from a single hardcoded backend into a provider table with health-based
//! selection and fallback (spec.md §4.E "Selection algorithm").

pub mod gateway;
pub mod prompt;
pub mod providers;

pub use gateway::{ProviderGateway, ProviderHandle, ProviderStatus};
pub use prompt::{
    PromptAssembler, PromptEnvelope, PromptParams, TaskKind, ValidationIssue, ValidationReport,
};
pub use providers::{Completion, LlmProvider, ProviderKind, TokenUsage};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("provider unavailable")]
    Unavailable,

    #[error("request timed out")]
    Timeout,

    #[error("rate limited")]
    RateLimited,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<LlmError> for shellwright_core::Error {
    fn from(err: LlmError) -> Self {
        shellwright_core::Error::llm_unavailable(err.to_string())
    }
}
