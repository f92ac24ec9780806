//! Persona routes, spec.md §6 "Persona".

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use shellwright_config::Persona;
use shellwright_core::Error;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn list(State(state): State<AppState>) -> Json<Vec<Persona>> {
    Json(state.personas.list())
}

pub async fn current(State(state): State<AppState>) -> Json<Persona> {
    Json(state.personas.current())
}

pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Persona>, ApiError> {
    state
        .personas
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError(Error::not_found(format!("persona '{id}' not found"))))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchResult {
    pub ok: bool,
}

pub async fn switch(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<SwitchResult>, ApiError> {
    state
        .personas
        .switch(&id)
        .map(|_| Json(SwitchResult { ok: true }))
        .map_err(|err| ApiError(Error::not_found(err.to_string())))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePersonaRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub system_prompt: String,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreatePersonaRequest>,
) -> Result<Json<Persona>, ApiError> {
    let persona = Persona {
        id: request.id.unwrap_or_default(),
        name: request.name,
        description: request.description,
        greeting: String::new(),
        system_prompt: request.system_prompt,
        capabilities: Vec::new(),
        channels: request.channels,
        examples: request.examples,
        custom: false,
    };

    state
        .personas
        .add_custom(persona)
        .map(Json)
        .map_err(|err| ApiError(Error::validation(err.to_string())))
}
