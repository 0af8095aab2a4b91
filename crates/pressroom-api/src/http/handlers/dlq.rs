//! Dead-letter queue endpoints.
//!
//! Browsing, single and bulk replay, delete, and filtered purge. An
//! unfiltered purge wipes the whole DLQ and must carry the confirmation
//! token; the service itself never asks.

use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use pressroom_types::dlq::{DlqBulkResult, DlqEntry, DlqFilter};
use pressroom_types::job::Job;

use crate::http::error::AppError;
use crate::http::extractors::auth::Authenticated;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Confirmation token required to purge the DLQ without a filter.
pub const PURGE_ALL_TOKEN: &str = "PURGE-DLQ";

fn request_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

#[derive(Debug, Deserialize, Default)]
pub struct DlqListQuery {
    pub queue: Option<String>,
    pub job_name: Option<String>,
    pub failed_after: Option<DateTime<Utc>>,
    pub failed_before: Option<DateTime<Utc>>,
    pub min_replays: Option<u32>,
    /// Substring match over error message and original job id.
    pub search: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

impl DlqListQuery {
    fn filter(&self) -> DlqFilter {
        DlqFilter {
            queue: self.queue.clone(),
            job_name: self.job_name.clone(),
            failed_after: self.failed_after,
            failed_before: self.failed_before,
            min_replays: self.min_replays,
            search: self.search.clone(),
        }
    }
}

/// GET /api/v1/dlq - List dead-letter entries, most recent failure first.
pub async fn list_entries(
    State(state): State<AppState>,
    Query(query): Query<DlqListQuery>,
    _auth: Authenticated,
) -> Result<Json<ApiResponse<Vec<DlqEntry>>>, AppError> {
    let start = Instant::now();
    let entries = state
        .dlq_service
        .list(&query.filter(), query.limit, query.offset)
        .await?;
    Ok(Json(
        ApiResponse::success(entries, request_id(), start.elapsed().as_millis() as u64)
            .with_link("self", "/api/v1/dlq"),
    ))
}

/// GET /api/v1/dlq/{id} - Fetch one entry.
pub async fn get_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    _auth: Authenticated,
) -> Result<Json<ApiResponse<DlqEntry>>, AppError> {
    let start = Instant::now();
    let entry = state.dlq_service.get(&id).await?;
    Ok(Json(ApiResponse::success(
        entry,
        request_id(),
        start.elapsed().as_millis() as u64,
    )))
}

/// POST /api/v1/dlq/{id}/replay - Re-enqueue one dead-lettered job.
pub async fn replay_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    _auth: Authenticated,
) -> Result<Json<ApiResponse<Job>>, AppError> {
    let start = Instant::now();
    let job = state.dlq_service.replay(&id).await?;
    Ok(Json(ApiResponse::success(
        job,
        request_id(),
        start.elapsed().as_millis() as u64,
    )))
}

#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    pub ids: Vec<Uuid>,
}

/// POST /api/v1/dlq/replay - Bulk replay; per-id results, never all-or-nothing.
pub async fn replay_many(
    State(state): State<AppState>,
    _auth: Authenticated,
    Json(req): Json<BulkRequest>,
) -> Result<Json<ApiResponse<Vec<DlqBulkResult>>>, AppError> {
    let start = Instant::now();
    let results = state.dlq_service.replay_many(&req.ids).await;
    Ok(Json(ApiResponse::success(
        results,
        request_id(),
        start.elapsed().as_millis() as u64,
    )))
}

/// DELETE /api/v1/dlq/{id} - Drop one entry.
pub async fn delete_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    _auth: Authenticated,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    state.dlq_service.delete(&id).await?;
    Ok(Json(ApiResponse::success(
        serde_json::json!({"deleted": id}),
        request_id(),
        start.elapsed().as_millis() as u64,
    )))
}

/// POST /api/v1/dlq/delete - Bulk delete; per-id results.
pub async fn delete_many(
    State(state): State<AppState>,
    _auth: Authenticated,
    Json(req): Json<BulkRequest>,
) -> Result<Json<ApiResponse<Vec<DlqBulkResult>>>, AppError> {
    let start = Instant::now();
    let results = state.dlq_service.delete_many(&req.ids).await;
    Ok(Json(ApiResponse::success(
        results,
        request_id(),
        start.elapsed().as_millis() as u64,
    )))
}

#[derive(Debug, Deserialize, Default)]
pub struct PurgeDlqRequest {
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default)]
    pub failed_after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failed_before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub min_replays: Option<u32>,
    #[serde(default)]
    pub search: Option<String>,
    /// Must equal `PURGE-DLQ` when no filter criteria are set.
    #[serde(default)]
    pub confirm: Option<String>,
}

/// POST /api/v1/dlq/purge - Delete all entries matching the filter.
pub async fn purge_entries(
    State(state): State<AppState>,
    _auth: Authenticated,
    Json(req): Json<PurgeDlqRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let filter = DlqFilter {
        queue: req.queue,
        job_name: req.job_name,
        failed_after: req.failed_after,
        failed_before: req.failed_before,
        min_replays: req.min_replays,
        search: req.search,
    };
    if filter.is_empty() && req.confirm.as_deref() != Some(PURGE_ALL_TOKEN) {
        return Err(AppError::Validation(format!(
            "Purging the entire DLQ is irreversible. Pass {{\"confirm\": \"{PURGE_ALL_TOKEN}\"}} to proceed."
        )));
    }
    let removed = state.dlq_service.purge(&filter).await?;
    Ok(Json(ApiResponse::success(
        serde_json::json!({"removed": removed}),
        request_id(),
        start.elapsed().as_millis() as u64,
    )))
}
