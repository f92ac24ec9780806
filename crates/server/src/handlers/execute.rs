//! `/api/execute/*`, spec.md §6 "Execution".

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use shellwright_core::{Error, Platform, Policy, Priority, TaskId};
use shellwright_exec::{CancelOutcome, ExecutionRequest, ExecutionTask, Statistics, TaskState};

use crate::error::ApiError;
use crate::state::AppState;

fn default_policy() -> Policy {
    Policy::Standard
}

fn default_priority() -> Priority {
    Priority::Normal
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteScriptRequest {
    pub script: String,
    pub platform: Platform,
    #[serde(default = "default_policy")]
    pub policy: Policy,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    /// Required when `policy = elevated` and the scheduler's
    /// `requireConfirmTokenForElevated` flag is set, spec.md §9 open
    /// question on elevated confirmation.
    #[serde(default)]
    pub confirm_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub task_id: TaskId,
    pub state: TaskState,
}

fn check_elevated_confirmation(state: &AppState, request: &ExecuteScriptRequest) -> Result<(), ApiError> {
    if request.policy != Policy::Elevated || !state.settings.scheduler.require_confirm_token_for_elevated {
        return Ok(());
    }

    match (&state.settings.scheduler.confirm_token, &request.confirm_token) {
        (Some(expected), Some(provided)) if expected == provided => Ok(()),
        (None, _) => Err(ApiError(Error::internal(
            "elevated policy requires a confirmation token, but none is configured",
        ))),
        _ => Err(ApiError(Error::validation(
            "elevated policy requires a valid confirmToken",
        ))),
    }
}

pub async fn submit(
    State(state): State<AppState>,
    Json(request): Json<ExecuteScriptRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    check_elevated_confirmation(&state, &request)?;

    let timeout_seconds = request
        .timeout_seconds
        .unwrap_or_else(|| state.settings.scheduler.max_timeout_seconds.min(30));

    let exec_request = ExecutionRequest {
        platform: request.platform,
        script: request.script,
        policy: request.policy,
        working_dir: None,
        env: HashMap::new(),
        timeout_seconds,
        parameters: request.parameters,
    };

    let task_id = state
        .scheduler
        .submit(exec_request, request.priority, None)
        .map_err(ApiError)?;

    let task_state = state
        .scheduler
        .get(task_id)
        .map(|task| task.state)
        .unwrap_or(TaskState::Queued);

    Ok(Json(SubmitResponse {
        task_id,
        state: task_state,
    }))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> Result<Json<ExecutionTask>, ApiError> {
    state
        .scheduler
        .get(id)
        .map(Json)
        .ok_or_else(|| ApiError(Error::not_found(format!("task '{id}' not found"))))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub outcome: &'static str,
}

pub async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> Result<Json<CancelResponse>, ApiError> {
    match state.scheduler.cancel(id) {
        CancelOutcome::Cancelled => Ok(Json(CancelResponse { outcome: "cancelled" })),
        CancelOutcome::AlreadyTerminal => Ok(Json(CancelResponse { outcome: "alreadyTerminal" })),
        CancelOutcome::NotFound => Err(ApiError(Error::not_found(format!("task '{id}' not found")))),
    }
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub tasks: Vec<ExecutionTask>,
    pub total: usize,
}

pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryPage>, ApiError> {
    let status_filter = query
        .status
        .as_deref()
        .map(|raw| {
            serde_json::from_value::<TaskState>(serde_json::Value::String(raw.to_string()))
                .map_err(|_| ApiError(Error::validation(format!("unknown status '{raw}'"))))
        })
        .transpose()?;

    let all = state.scheduler.history(state.settings.scheduler.history_max);
    let filtered: Vec<ExecutionTask> = all
        .into_iter()
        .filter(|task| status_filter.map(|s| task.state == s).unwrap_or(true))
        .collect();

    let total = filtered.len();
    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(50);
    let page = filtered.into_iter().skip(offset).take(limit).collect();

    Ok(Json(HistoryPage { tasks: page, total }))
}

pub async fn statistics(State(state): State<AppState>) -> Json<Statistics> {
    Json(state.scheduler.statistics())
}

pub async fn running(State(state): State<AppState>) -> Json<Vec<ExecutionTask>> {
    Json(state.scheduler.running())
}
