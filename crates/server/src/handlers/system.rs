//! `GET /health`, `GET /api/system/status`, spec.md §6 "Configuration".

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessResponse {
    pub ready: bool,
    pub personas_loaded: usize,
    pub channels_loaded: usize,
}

/// Whether the registries have at least one entry and the scheduler is
/// reachable, distinct from liveness (`/health`).
pub async fn ready(State(state): State<AppState>) -> Json<ReadinessResponse> {
    let personas_loaded = state.personas.list().len();
    let channels_loaded = state.channels.list().len();
    Json(ReadinessResponse {
        ready: personas_loaded > 0 && channels_loaded > 0,
        personas_loaded,
        channels_loaded,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    pub healthy: bool,
    pub detail: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub uptime_seconds: u64,
    pub personas: ComponentStatus,
    pub channels: ComponentStatus,
    pub memory: ComponentStatus,
    pub providers: Vec<shellwright_llm::ProviderHandle>,
    pub scheduler: ComponentStatus,
}

/// Component health map, spec.md §6 `GET /api/system/status`.
pub async fn system_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let personas = state.personas.list();
    let channels = state.channels.list();
    let memory_summary = state.memory.summary();
    let stats = state.scheduler.statistics();

    Json(SystemStatus {
        uptime_seconds: state.uptime_seconds(),
        personas: ComponentStatus {
            healthy: !personas.is_empty(),
            detail: format!("{} persona(s) loaded", personas.len()),
        },
        channels: ComponentStatus {
            healthy: !channels.is_empty(),
            detail: format!("{} channel(s) loaded", channels.len()),
        },
        memory: ComponentStatus {
            healthy: true,
            detail: format!(
                "{} conversation(s), {} message(s)",
                memory_summary.conversation_count, memory_summary.total_messages
            ),
        },
        providers: state.gateway.status(),
        scheduler: ComponentStatus {
            healthy: true,
            detail: format!("queue depth {}", stats.queue_depth),
        },
    })
}
