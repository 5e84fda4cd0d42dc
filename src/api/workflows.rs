/// Workflow management REST API endpoints
///
/// CRUD over the workflow store, dry-run validation, on-demand execution and
/// the cooperative stop switch. Definitions are validated before they are
/// stored; the executor validates again before every run.

use crate::api::AppState;
use crate::runtime::observer::TracingObserver;
use crate::runtime::result::WorkflowExecutionResult;
use crate::workflow::{types::Workflow, validator::ValidationResult};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Response for workflow creation/update operations
#[derive(Debug, Serialize)]
pub struct WorkflowResponse {
    pub id: String,
    pub message: String,
    /// Warnings and suggestions from validation
    pub validation: ValidationResult,
}

/// Request body for workflow creation and update
#[derive(Debug, Deserialize)]
pub struct CreateWorkflowRequest {
    pub workflow: Workflow,
}

/// Optional body of an execute request
#[derive(Debug, Default, Deserialize)]
pub struct ExecuteRequest {
    /// Payload handed to trigger nodes
    #[serde(default)]
    pub input: Option<Value>,
}

type RejectedWorkflow = (StatusCode, Json<Value>);

/// Create workflow management routes
pub fn create_workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workflows", post(create_workflow).get(list_workflows))
        .route("/api/workflows/validate", post(validate_workflow))
        .route(
            "/api/workflows/{id}",
            get(get_workflow).put(update_workflow).delete(delete_workflow),
        )
        .route("/api/workflows/{id}/execute", post(execute_workflow))
        .route("/api/executions/stop", post(stop_execution))
}

fn rejected(status: StatusCode, message: impl Into<String>) -> RejectedWorkflow {
    (status, Json(json!({ "error": message.into() })))
}

/// Validate and store, shared by create and update
async fn store_validated(
    state: &AppState,
    workflow: &Workflow,
) -> Result<ValidationResult, RejectedWorkflow> {
    let validation = state.executor.validator().validate(workflow);
    if !validation.valid {
        tracing::warn!(
            "❌ Rejecting invalid workflow '{}': {} errors",
            workflow.id,
            validation.errors.len()
        );
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "Workflow validation failed", "validation": validation })),
        ));
    }

    state.workflows.save(workflow).await.map_err(|e| {
        tracing::error!("Failed to save workflow {}: {}", workflow.id, e);
        rejected(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save workflow")
    })?;

    Ok(validation)
}

/// Create a new workflow
///
/// POST /api/workflows
/// Body: { "workflow": { "id": "...", "name": "...", "nodes": [...], "edges": [...] } }
async fn create_workflow(
    State(state): State<AppState>,
    Json(payload): Json<CreateWorkflowRequest>,
) -> Result<Json<WorkflowResponse>, RejectedWorkflow> {
    let workflow = payload.workflow;

    match state.workflows.get(&workflow.id).await {
        Ok(Some(_)) => {
            return Err(rejected(
                StatusCode::CONFLICT,
                format!("Workflow '{}' already exists", workflow.id),
            ))
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!("Failed to look up workflow {}: {}", workflow.id, e);
            return Err(rejected(StatusCode::INTERNAL_SERVER_ERROR, "Storage error"));
        }
    }

    let validation = store_validated(&state, &workflow).await?;
    tracing::info!("🔥 Created workflow: {} ({})", workflow.id, workflow.name);

    Ok(Json(WorkflowResponse {
        id: workflow.id.clone(),
        message: format!("Workflow '{}' created successfully", workflow.name),
        validation,
    }))
}

/// List all workflows
///
/// GET /api/workflows
async fn list_workflows(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    match state.workflows.list().await {
        Ok(workflows) => Ok(Json(json!({ "workflows": workflows }))),
        Err(e) => {
            tracing::error!("Failed to list workflows: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Get a specific workflow by ID
///
/// GET /api/workflows/{id}
async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Workflow>, StatusCode> {
    match state.workflows.get(&id).await {
        Ok(Some(workflow)) => Ok(Json(workflow)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to get workflow {}: {}", id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Update an existing workflow
///
/// PUT /api/workflows/{id}
/// Body: { "workflow": { ... } }; the id in the path wins
async fn update_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<CreateWorkflowRequest>,
) -> Result<Json<WorkflowResponse>, RejectedWorkflow> {
    let mut workflow = payload.workflow;
    workflow.id = id.clone();

    match state.workflows.get(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return Err(rejected(
                StatusCode::NOT_FOUND,
                format!("Workflow '{}' not found", id),
            ))
        }
        Err(e) => {
            tracing::error!("Failed to look up workflow {}: {}", id, e);
            return Err(rejected(StatusCode::INTERNAL_SERVER_ERROR, "Storage error"));
        }
    }

    let validation = store_validated(&state, &workflow).await?;
    tracing::info!("🔥 Updated workflow: {} ({})", workflow.id, workflow.name);

    Ok(Json(WorkflowResponse {
        id: workflow.id.clone(),
        message: format!("Workflow '{}' updated successfully", workflow.name),
        validation,
    }))
}

/// Delete a workflow and every schedule pointing at it
///
/// DELETE /api/workflows/{id}
async fn delete_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let mut unscheduled = 0;
    for entry in state.scheduler.list().await {
        if entry.workflow_id == id && state.scheduler.unschedule(&entry.id).await {
            unscheduled += 1;
        }
    }

    match state.workflows.delete(&id).await {
        Ok(true) => {
            tracing::info!("🗑️ Deleted workflow: {} ({} schedules removed)", id, unscheduled);
            Ok(Json(json!({
                "message": "Workflow deleted successfully",
                "unscheduled": unscheduled,
            })))
        }
        Ok(false) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to delete workflow: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Validate a workflow without storing it
///
/// POST /api/workflows/validate
/// Body: a workflow document
async fn validate_workflow(
    State(state): State<AppState>,
    Json(workflow): Json<Workflow>,
) -> Json<ValidationResult> {
    let validation = state.executor.validator().validate(&workflow);
    tracing::debug!(
        "🔍 Validated '{}': {} errors, {} warnings",
        workflow.id,
        validation.errors.len(),
        validation.warnings.len()
    );
    Json(validation)
}

/// Execute a stored workflow
///
/// POST /api/workflows/{id}/execute
/// Body (optional): { "input": <trigger payload> }
async fn execute_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: String,
) -> Result<Json<WorkflowExecutionResult>, StatusCode> {
    tracing::info!("📥 Execute request received: {}", id);

    let request: ExecuteRequest = if body.trim().is_empty() {
        ExecuteRequest::default()
    } else {
        serde_json::from_str(&body).map_err(|e| {
            tracing::warn!("❌ Invalid execute payload for {}: {}", id, e);
            StatusCode::BAD_REQUEST
        })?
    };

    let workflow = match state.workflows.get(&id).await {
        Ok(Some(workflow)) => workflow,
        Ok(None) => {
            tracing::warn!("❌ Execute called for unknown workflow: {}", id);
            return Err(StatusCode::NOT_FOUND);
        }
        Err(e) => {
            tracing::error!("Failed to load workflow {}: {}", id, e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let result = state
        .executor
        .execute_with_input(&workflow, request.input, &TracingObserver)
        .await;
    Ok(Json(result))
}

/// Ask the running workflow to stop before its next node
///
/// POST /api/executions/stop
async fn stop_execution(State(state): State<AppState>) -> Json<Value> {
    let stopped = state.executor.stop();
    Json(json!({ "stopped": stopped }))
}
