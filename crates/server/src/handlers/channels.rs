//! Channel routes, spec.md §6 "Channel: symmetric set under
//! `/api/channels`."

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use shellwright_config::Channel;
use shellwright_core::Error;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn list(State(state): State<AppState>) -> Json<Vec<Channel>> {
    Json(state.channels.list())
}

pub async fn current(State(state): State<AppState>) -> Json<Channel> {
    Json(state.channels.current())
}

pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Channel>, ApiError> {
    state
        .channels
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError(Error::not_found(format!("channel '{id}' not found"))))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchResult {
    pub ok: bool,
}

pub async fn switch(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<SwitchResult>, ApiError> {
    state
        .channels
        .switch(&id)
        .map(|_| Json(SwitchResult { ok: true }))
        .map_err(|err| ApiError(Error::not_found(err.to_string())))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChannelRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capabilities: std::collections::BTreeSet<String>,
    #[serde(default)]
    pub artifact_types: std::collections::BTreeSet<String>,
    #[serde(default)]
    pub constraints: shellwright_config::ChannelConstraints,
}

pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateChannelRequest>,
) -> Result<Json<Channel>, ApiError> {
    let channel = Channel {
        id: request.id.unwrap_or_default(),
        name: request.name,
        description: request.description,
        capabilities: request.capabilities,
        artifact_types: request.artifact_types,
        constraints: request.constraints,
        custom: false,
    };

    state
        .channels
        .add_custom(channel)
        .map(Json)
        .map_err(|err| ApiError(Error::validation(err.to_string())))
}
