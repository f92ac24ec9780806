//! `POST /api/generate/script`, `/api/scripts/improve`,
//! `/api/scripts/validate`, spec.md §6 "Chat & generation".

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use shellwright_codegen::Script;
use shellwright_core::{Error, Platform};
use shellwright_llm::ValidationReport;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub prompt: String,
    pub platform: Platform,
    #[serde(default)]
    pub context: Option<String>,
}

pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<Script>, ApiError> {
    let persona = state.personas.current();
    let channel = state.channels.current();

    let description = match request.context {
        Some(context) => format!("{}\n\nAdditional context: {context}", request.prompt),
        None => request.prompt,
    };

    let script = state
        .codegen
        .generate(
            &description,
            request.platform,
            &persona,
            &channel,
            &[],
            state.gateway.as_ref(),
            state.settings.memory.context_window,
        )
        .await;

    Ok(Json(script))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImproveRequest {
    pub script: String,
    pub feedback: String,
    pub platform: Platform,
}

pub async fn improve(
    State(state): State<AppState>,
    Json(request): Json<ImproveRequest>,
) -> Result<Json<Script>, ApiError> {
    if request.script.trim().is_empty() {
        return Err(ApiError(Error::validation("script must not be empty")));
    }

    let persona = state.personas.current();
    let channel = state.channels.current();

    let script = state
        .codegen
        .improve(
            &request.script,
            &request.feedback,
            request.platform,
            &persona,
            &channel,
            state.gateway.as_ref(),
        )
        .await;

    Ok(Json(script))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub script: String,
    pub platform: Platform,
}

pub async fn validate(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<ValidationReport>, ApiError> {
    if request.script.trim().is_empty() {
        return Err(ApiError(Error::validation("script must not be empty")));
    }

    let persona = state.personas.current();
    let channel = state.channels.current();

    let report = state
        .codegen
        .validate(&request.script, request.platform, &persona, &channel, state.gateway.as_ref())
        .await;

    Ok(Json(report))
}
