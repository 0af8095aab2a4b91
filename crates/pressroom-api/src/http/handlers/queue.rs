//! Queue administration endpoints.
//!
//! Listing, stats, job inspection, enqueue, pause/resume, purge, and the
//! per-queue health report from the monitor.

use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use pressroom_types::job::{Job, JobOptions, JobState, QueueStats};

use crate::http::error::AppError;
use crate::http::extractors::auth::Authenticated;
use crate::http::response::ApiResponse;
use crate::state::AppState;

fn request_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// GET /api/v1/queues - Stats for every known queue.
pub async fn list_queues(
    State(state): State<AppState>,
    _auth: Authenticated,
) -> Result<Json<ApiResponse<Vec<QueueStats>>>, AppError> {
    let start = Instant::now();
    let stats = state.queue_service.all_stats().await?;
    Ok(Json(
        ApiResponse::success(stats, request_id(), start.elapsed().as_millis() as u64)
            .with_link("self", "/api/v1/queues"),
    ))
}

/// GET /api/v1/queues/schemas - JSON Schemas for all registered job names.
pub async fn job_schemas(
    State(state): State<AppState>,
    _auth: Authenticated,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let schemas: serde_json::Map<String, serde_json::Value> = state
        .schemas
        .schemas()
        .into_iter()
        .map(|(name, schema)| (name.to_string(), serde_json::to_value(schema).unwrap_or_default()))
        .collect();
    Ok(Json(ApiResponse::success(
        serde_json::Value::Object(schemas),
        request_id(),
        start.elapsed().as_millis() as u64,
    )))
}

/// GET /api/v1/queues/{queue} - Stats for one queue.
pub async fn queue_stats(
    State(state): State<AppState>,
    Path(queue): Path<String>,
    _auth: Authenticated,
) -> Result<Json<ApiResponse<QueueStats>>, AppError> {
    let start = Instant::now();
    let stats = state.queue_service.stats(&queue).await?;
    Ok(Json(
        ApiResponse::success(stats, request_id(), start.elapsed().as_millis() as u64)
            .with_link("self", &format!("/api/v1/queues/{queue}"))
            .with_link("jobs", &format!("/api/v1/queues/{queue}/jobs")),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub state: Option<JobState>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

/// GET /api/v1/queues/{queue}/jobs - List jobs, newest first.
pub async fn list_jobs(
    State(state): State<AppState>,
    Path(queue): Path<String>,
    Query(query): Query<ListJobsQuery>,
    _auth: Authenticated,
) -> Result<Json<ApiResponse<Vec<Job>>>, AppError> {
    let start = Instant::now();
    let jobs = state
        .queue_service
        .list_jobs(&queue, query.state, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(
        jobs,
        request_id(),
        start.elapsed().as_millis() as u64,
    )))
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub name: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub options: JobOptions,
}

/// POST /api/v1/queues/{queue}/jobs - Validate and enqueue a job.
pub async fn enqueue_job(
    State(state): State<AppState>,
    Path(queue): Path<String>,
    _auth: Authenticated,
    Json(req): Json<EnqueueRequest>,
) -> Result<Json<ApiResponse<Job>>, AppError> {
    let start = Instant::now();
    let job = state
        .queue_service
        .enqueue(&queue, &req.name, req.payload, req.options)
        .await?;
    let link = format!("/api/v1/queues/{queue}/jobs/{}", job.id);
    Ok(Json(
        ApiResponse::success(job, request_id(), start.elapsed().as_millis() as u64)
            .with_link("self", &link),
    ))
}

/// GET /api/v1/queues/{queue}/jobs/{id} - Fetch one job.
pub async fn get_job(
    State(state): State<AppState>,
    Path((queue, id)): Path<(String, String)>,
    _auth: Authenticated,
) -> Result<Json<ApiResponse<Job>>, AppError> {
    let start = Instant::now();
    let job = state
        .queue_service
        .get_job(&queue, &id)
        .await?
        .ok_or_else(|| AppError::Queue(pressroom_types::error::QueueError::NotFound(id)))?;
    Ok(Json(ApiResponse::success(
        job,
        request_id(),
        start.elapsed().as_millis() as u64,
    )))
}

/// POST /api/v1/queues/{queue}/pause - Stop claiming from a queue.
pub async fn pause_queue(
    State(state): State<AppState>,
    Path(queue): Path<String>,
    _auth: Authenticated,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    state.queue_service.pause(&queue);
    Ok(Json(ApiResponse::success(
        serde_json::json!({"queue": queue, "paused": true}),
        request_id(),
        start.elapsed().as_millis() as u64,
    )))
}

/// POST /api/v1/queues/{queue}/resume - Resume claiming from a queue.
pub async fn resume_queue(
    State(state): State<AppState>,
    Path(queue): Path<String>,
    _auth: Authenticated,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    state.queue_service.resume(&queue);
    Ok(Json(ApiResponse::success(
        serde_json::json!({"queue": queue, "paused": false}),
        request_id(),
        start.elapsed().as_millis() as u64,
    )))
}

#[derive(Debug, Deserialize, Default)]
pub struct PurgeRequest {
    /// Purge drops every pending job; require explicit acknowledgement.
    #[serde(default)]
    pub confirm: bool,
}

/// POST /api/v1/queues/{queue}/purge - Drop all pending jobs.
pub async fn purge_queue(
    State(state): State<AppState>,
    Path(queue): Path<String>,
    _auth: Authenticated,
    Json(req): Json<PurgeRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    if !req.confirm {
        return Err(AppError::Validation(
            "Purge is irreversible. Pass {\"confirm\": true} to drop all pending jobs.".to_string(),
        ));
    }
    let removed = state.queue_service.purge(&queue).await?;
    Ok(Json(ApiResponse::success(
        serde_json::json!({"queue": queue, "removed": removed}),
        request_id(),
        start.elapsed().as_millis() as u64,
    )))
}

/// GET /api/v1/queues/{queue}/health - Rolling health for one queue.
pub async fn queue_health(
    State(state): State<AppState>,
    Path(queue): Path<String>,
    _auth: Authenticated,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let health = state.monitor.health(&queue).await;
    let data = match health {
        Some(h) => serde_json::to_value(h)
            .map_err(|e| AppError::Internal(format!("serialize health: {e}")))?,
        None => serde_json::json!({"queue": queue, "status": "unknown", "samples": 0}),
    };
    Ok(Json(ApiResponse::success(
        data,
        request_id(),
        start.elapsed().as_millis() as u64,
    )))
}

/// GET /api/v1/monitor - Health for every observed queue.
pub async fn all_health(
    State(state): State<AppState>,
    _auth: Authenticated,
) -> Result<Json<ApiResponse<Vec<pressroom_core::monitor::QueueHealth>>>, AppError> {
    let start = Instant::now();
    let health = state.monitor.all_health().await;
    Ok(Json(ApiResponse::success(
        health,
        request_id(),
        start.elapsed().as_millis() as u64,
    )))
}
