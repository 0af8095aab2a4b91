//! Dashboard statistics endpoint.
//!
//! GET /api/v1/stats - Aggregate counts for the operations dashboard.

use std::time::Instant;

use axum::extract::State;
use axum::Json;
use sqlx::Row;

use crate::http::error::AppError;
use crate::http::extractors::auth::Authenticated;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// GET /api/v1/stats - Aggregate dashboard statistics.
///
/// Returns job counts by state across all queues, the DLQ depth, and
/// workflow instance counts by status. Uses efficient COUNT(*) SQL
/// queries directly on the database pool for performance.
pub async fn get_stats(
    State(state): State<AppState>,
    _auth: Authenticated,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();

    // Job counts by state (single query with conditional counts)
    let job_row = sqlx::query(
        r#"SELECT
            COUNT(*) as total_jobs,
            SUM(CASE WHEN state = 'pending' THEN 1 ELSE 0 END) as pending_jobs,
            SUM(CASE WHEN state = 'active' THEN 1 ELSE 0 END) as active_jobs,
            SUM(CASE WHEN state = 'completed' THEN 1 ELSE 0 END) as completed_jobs,
            SUM(CASE WHEN state = 'failed' THEN 1 ELSE 0 END) as failed_jobs
        FROM jobs"#,
    )
    .fetch_one(&state.db_pool.reader)
    .await
    .map_err(|e| AppError::Internal(format!("Failed to query job stats: {e}")))?;

    let total_jobs: i64 = job_row.try_get("total_jobs").unwrap_or(0);
    let pending_jobs: i64 = job_row.try_get("pending_jobs").unwrap_or(0);
    let active_jobs: i64 = job_row.try_get("active_jobs").unwrap_or(0);
    let completed_jobs: i64 = job_row.try_get("completed_jobs").unwrap_or(0);
    let failed_jobs: i64 = job_row.try_get("failed_jobs").unwrap_or(0);

    let queue_row = sqlx::query("SELECT COUNT(DISTINCT queue) as cnt FROM jobs")
        .fetch_one(&state.db_pool.reader)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to count queues: {e}")))?;
    let queues: i64 = queue_row.try_get("cnt").unwrap_or(0);

    let dlq_row = sqlx::query("SELECT COUNT(*) as cnt FROM dlq_entries")
        .fetch_one(&state.db_pool.reader)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to query DLQ depth: {e}")))?;
    let dlq_entries: i64 = dlq_row.try_get("cnt").unwrap_or(0);

    // Workflow instance counts by status
    let instance_row = sqlx::query(
        r#"SELECT
            COUNT(*) as total_instances,
            SUM(CASE WHEN status = 'running' THEN 1 ELSE 0 END) as running_instances,
            SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END) as completed_instances,
            SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END) as failed_instances,
            SUM(CASE WHEN status = 'rollback' THEN 1 ELSE 0 END) as rollback_instances
        FROM workflow_instances"#,
    )
    .fetch_one(&state.db_pool.reader)
    .await
    .map_err(|e| AppError::Internal(format!("Failed to query instance stats: {e}")))?;

    let total_instances: i64 = instance_row.try_get("total_instances").unwrap_or(0);
    let running_instances: i64 = instance_row.try_get("running_instances").unwrap_or(0);
    let completed_instances: i64 = instance_row.try_get("completed_instances").unwrap_or(0);
    let failed_instances: i64 = instance_row.try_get("failed_instances").unwrap_or(0);
    let rollback_instances: i64 = instance_row.try_get("rollback_instances").unwrap_or(0);

    let active_workflows_row =
        sqlx::query("SELECT COUNT(*) as cnt FROM workflows WHERE is_active = 1")
            .fetch_one(&state.db_pool.reader)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to count workflows: {e}")))?;
    let active_workflows: i64 = active_workflows_row.try_get("cnt").unwrap_or(0);

    let elapsed = start.elapsed().as_millis() as u64;

    let data = serde_json::json!({
        "queues": queues,
        "total_jobs": total_jobs,
        "pending_jobs": pending_jobs,
        "active_jobs": active_jobs,
        "completed_jobs": completed_jobs,
        "failed_jobs": failed_jobs,
        "dlq_entries": dlq_entries,
        "active_workflows": active_workflows,
        "total_instances": total_instances,
        "running_instances": running_instances,
        "completed_instances": completed_instances,
        "failed_instances": failed_instances,
        "rollback_instances": rollback_instances,
    });

    let resp = ApiResponse::success(data, request_id, elapsed)
        .with_link("self", "/api/v1/stats")
        .with_link("queues", "/api/v1/queues")
        .with_link("dlq", "/api/v1/dlq");

    Ok(Json(resp))
}
