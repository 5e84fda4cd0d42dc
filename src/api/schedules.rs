/// Schedule management REST API endpoints

use crate::api::AppState;
use crate::runtime::result::WorkflowExecutionResult;
use crate::workflow::types::ScheduledWorkflow;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

/// Request body for scheduling a stored workflow
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    pub workflow_id: String,
    pub cron_expression: String,
}

/// Request body for enabling or disabling a schedule
#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub enabled: bool,
}

/// Create schedule management routes
pub fn create_schedule_routes() -> Router<AppState> {
    Router::new()
        .route("/api/schedules", get(list_schedules).post(create_schedule))
        .route("/api/schedules/{id}", delete(delete_schedule))
        .route("/api/schedules/{id}/toggle", post(toggle_schedule))
        .route("/api/schedules/{id}/trigger", post(trigger_schedule))
}

/// GET /api/schedules
async fn list_schedules(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "schedules": state.scheduler.list().await }))
}

/// Schedule a stored workflow
///
/// POST /api/schedules
/// Body: { "workflowId": "...", "cronExpression": "0 0 * * *" }
async fn create_schedule(
    State(state): State<AppState>,
    Json(request): Json<ScheduleRequest>,
) -> Result<Json<ScheduledWorkflow>, StatusCode> {
    let workflow = match state.workflows.get(&request.workflow_id).await {
        Ok(Some(workflow)) => workflow,
        Ok(None) => return Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to load workflow {}: {}", request.workflow_id, e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    if request.cron_expression.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    Ok(Json(
        state
            .scheduler
            .schedule(&workflow, &request.cron_expression)
            .await,
    ))
}

/// DELETE /api/schedules/{id}
async fn delete_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    if state.scheduler.unschedule(&id).await {
        Ok(Json(json!({ "message": "Schedule removed" })))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

/// POST /api/schedules/{id}/toggle
/// Body: { "enabled": true }
async fn toggle_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ToggleRequest>,
) -> Result<Json<ScheduledWorkflow>, StatusCode> {
    if !state.scheduler.toggle(&id, request.enabled).await {
        return Err(StatusCode::NOT_FOUND);
    }
    state.scheduler.get(&id).await.map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// Run a schedule's workflow now
///
/// POST /api/schedules/{id}/trigger
async fn trigger_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowExecutionResult>, StatusCode> {
    if state.scheduler.get(&id).await.is_none() {
        return Err(StatusCode::NOT_FOUND);
    }
    // A missing workflow is recorded on the schedule and reported as 404
    state
        .scheduler
        .trigger(&id)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
