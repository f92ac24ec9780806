//! API error envelope, spec.md §6 "errors follow `{success:false,
//! error:{code, message, details?}, timestamp, requestId}`".
//!
//! Grounded on the teacher's `ServerError` -> `StatusCode` mapping
//! (`crates/server/src/lib.rs`), generalized from a flat error enum into
//! a thin wrapper over `shellwright_core::{Error, ErrorKind}` so every
//! crate's errors funnel through one boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use shellwright_core::{Error as CoreError, ErrorKind};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorBody,
    pub timestamp: chrono::DateTime<Utc>,
    pub request_id: Uuid,
}

/// Wraps [`shellwright_core::Error`] so it can be returned directly from
/// an axum handler.
#[derive(Debug)]
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::PolicyDenied => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::LlmUnavailable => StatusCode::BAD_GATEWAY,
        ErrorKind::ExecutionFailed => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::TimedOut => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Cancelled => StatusCode::CONFLICT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind);
        let body = ErrorEnvelope {
            success: false,
            error: ErrorBody {
                code: self.0.kind.code(),
                message: self.0.message,
                details: None,
            },
            timestamp: Utc::now(),
            request_id: Uuid::new_v4(),
        };
        (status, Json(body)).into_response()
    }
}
