//! Workflow definition, trigger, and instance endpoints.

use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use pressroom_types::job::Job;
use pressroom_types::workflow::{
    InstanceStatus, WorkflowDefinition, WorkflowInstance, WorkflowSpec, WorkflowStepExecution,
};

use crate::http::error::AppError;
use crate::http::extractors::auth::Authenticated;
use crate::http::response::ApiResponse;
use crate::state::AppState;

fn request_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// POST /api/v1/workflows - Save a new definition version and activate it.
pub async fn apply_workflow(
    State(state): State<AppState>,
    _auth: Authenticated,
    Json(spec): Json<WorkflowSpec>,
) -> Result<Json<ApiResponse<WorkflowDefinition>>, AppError> {
    let start = Instant::now();
    let def = state.definitions.apply(spec).await?;
    let link = format!("/api/v1/workflows/{}", def.id);
    Ok(Json(
        ApiResponse::success(def, request_id(), start.elapsed().as_millis() as u64)
            .with_link("self", &link),
    ))
}

#[derive(Debug, Deserialize, Default)]
pub struct ListWorkflowsQuery {
    #[serde(default)]
    pub active_only: bool,
}

/// GET /api/v1/workflows - List definition versions.
pub async fn list_workflows(
    State(state): State<AppState>,
    Query(query): Query<ListWorkflowsQuery>,
    _auth: Authenticated,
) -> Result<Json<ApiResponse<Vec<WorkflowDefinition>>>, AppError> {
    let start = Instant::now();
    let defs = state.definitions.list(query.active_only).await?;
    Ok(Json(ApiResponse::success(
        defs,
        request_id(),
        start.elapsed().as_millis() as u64,
    )))
}

/// GET /api/v1/workflows/{id} - Fetch one definition version.
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    _auth: Authenticated,
) -> Result<Json<ApiResponse<WorkflowDefinition>>, AppError> {
    let start = Instant::now();
    let def = state.definitions.get(&id).await?;
    Ok(Json(ApiResponse::success(
        def,
        request_id(),
        start.elapsed().as_millis() as u64,
    )))
}

/// DELETE /api/v1/workflows/{id} - Deactivate a definition version.
pub async fn deactivate_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    _auth: Authenticated,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    state.definitions.deactivate(&id).await?;
    Ok(Json(ApiResponse::success(
        serde_json::json!({"deactivated": id}),
        request_id(),
        start.elapsed().as_millis() as u64,
    )))
}

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    #[serde(rename = "type")]
    pub trigger_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Scope the trigger to a workspace; global definitions always match.
    #[serde(default)]
    pub workspace_id: Option<Uuid>,
}

/// POST /api/v1/triggers - Dispatch a business trigger.
///
/// Fan-out: one dispatch job per active definition subscribed to the exact
/// trigger type. No match returns an empty list, not an error.
pub async fn dispatch_trigger(
    State(state): State<AppState>,
    _auth: Authenticated,
    Json(req): Json<TriggerRequest>,
) -> Result<Json<ApiResponse<Vec<Job>>>, AppError> {
    let start = Instant::now();
    let jobs = state
        .dispatcher
        .dispatch(&req.trigger_type, req.payload, req.workspace_id)
        .await?;
    Ok(Json(ApiResponse::success(
        jobs,
        request_id(),
        start.elapsed().as_millis() as u64,
    )))
}

#[derive(Debug, Deserialize, Default)]
pub struct RunRequest {
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// POST /api/v1/workflows/{id}/run - Start one instance of this version
/// on demand, bypassing trigger matching.
pub async fn run_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    _auth: Authenticated,
    Json(req): Json<RunRequest>,
) -> Result<Json<ApiResponse<Job>>, AppError> {
    let start = Instant::now();
    let job = state.dispatcher.run(&id, req.payload).await?;
    Ok(Json(ApiResponse::success(
        job,
        request_id(),
        start.elapsed().as_millis() as u64,
    )))
}

#[derive(Debug, Deserialize, Default)]
pub struct ListInstancesQuery {
    pub workflow_key: Option<String>,
    pub status: Option<InstanceStatus>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

/// GET /api/v1/instances - List instances, newest first.
pub async fn list_instances(
    State(state): State<AppState>,
    Query(query): Query<ListInstancesQuery>,
    _auth: Authenticated,
) -> Result<Json<ApiResponse<Vec<WorkflowInstance>>>, AppError> {
    let start = Instant::now();
    let instances = state
        .runner
        .list_instances(query.workflow_key.as_deref(), query.status, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(
        instances,
        request_id(),
        start.elapsed().as_millis() as u64,
    )))
}

/// GET /api/v1/instances/{id} - Fetch one instance.
pub async fn get_instance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    _auth: Authenticated,
) -> Result<Json<ApiResponse<WorkflowInstance>>, AppError> {
    let start = Instant::now();
    let instance = state.runner.get_instance(&id).await?;
    let link = format!("/api/v1/instances/{id}/steps");
    Ok(Json(
        ApiResponse::success(instance, request_id(), start.elapsed().as_millis() as u64)
            .with_link("steps", &link),
    ))
}

/// GET /api/v1/instances/{id}/steps - Step execution audit trail.
pub async fn instance_steps(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    _auth: Authenticated,
) -> Result<Json<ApiResponse<Vec<WorkflowStepExecution>>>, AppError> {
    let start = Instant::now();
    let steps = state.runner.step_executions(&id).await?;
    Ok(Json(ApiResponse::success(
        steps,
        request_id(),
        start.elapsed().as_millis() as u64,
    )))
}
