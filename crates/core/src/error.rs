//! Top-level error type
//!
//! Every crate defines its own `thiserror` error enum for the failures it
//! can produce locally, then converts into this workspace-wide [`Error`] at
//! the seams (spec.md §7 "Propagation policy"). [`ErrorKind`] is the closed
//! set of outcomes callers of the HTTP API can observe.

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds exposed to callers, spec.md §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    PolicyDenied,
    LlmUnavailable,
    ExecutionFailed,
    TimedOut,
    Cancelled,
    Internal,
}

impl ErrorKind {
    /// Error code used in the `{success:false, error:{code,...}}` envelope.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::PolicyDenied => "POLICY_DENIED",
            ErrorKind::LlmUnavailable => "LLM_UNAVAILABLE",
            ErrorKind::ExecutionFailed => "EXECUTION_FAILED",
            ErrorKind::TimedOut => "TIMED_OUT",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

#[derive(Debug, ThisError)]
#[error("{kind:?}: {message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn policy_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PolicyDenied, message)
    }

    pub fn llm_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LlmUnavailable, message)
    }

    pub fn execution_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExecutionFailed, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}
