//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use pressroom_types::error::{DlqError, QueueError, RepositoryError, WorkflowError};

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Queue service errors.
    Queue(QueueError),
    /// Dead-letter queue errors.
    Dlq(DlqError),
    /// Workflow engine errors.
    Workflow(WorkflowError),
    /// Authentication failure.
    Unauthorized(String),
    /// Validation error.
    Validation(String),
    /// Generic internal error.
    Internal(String),
}

impl From<QueueError> for AppError {
    fn from(e: QueueError) -> Self {
        AppError::Queue(e)
    }
}

impl From<DlqError> for AppError {
    fn from(e: DlqError) -> Self {
        AppError::Dlq(e)
    }
}

impl From<WorkflowError> for AppError {
    fn from(e: WorkflowError) -> Self {
        AppError::Workflow(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Queue(QueueError::Validation { .. }) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", self_message(&self))
            }
            AppError::Queue(QueueError::UnknownJobName(name)) => (
                StatusCode::BAD_REQUEST,
                "UNKNOWN_JOB_NAME",
                format!("No schema registered for job '{name}'"),
            ),
            AppError::Queue(QueueError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                "JOB_NOT_FOUND",
                format!("Job '{id}' not found"),
            ),
            AppError::Queue(QueueError::Storage(e)) => storage_response(e),
            AppError::Dlq(DlqError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                "DLQ_ENTRY_NOT_FOUND",
                format!("Dead-letter entry '{id}' not found"),
            ),
            AppError::Dlq(DlqError::ReplayLimitExceeded { .. }) => {
                (StatusCode::CONFLICT, "REPLAY_LIMIT_EXCEEDED", self_message(&self))
            }
            AppError::Dlq(DlqError::Requeue(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "REPLAY_FAILED", self_message(&self))
            }
            AppError::Dlq(DlqError::Storage(e)) => storage_response(e),
            AppError::Workflow(WorkflowError::DefinitionNotFound(key)) => (
                StatusCode::NOT_FOUND,
                "WORKFLOW_NOT_FOUND",
                format!("Workflow '{key}' not found"),
            ),
            AppError::Workflow(WorkflowError::InstanceNotFound(id)) => (
                StatusCode::NOT_FOUND,
                "INSTANCE_NOT_FOUND",
                format!("Workflow instance '{id}' not found"),
            ),
            AppError::Workflow(WorkflowError::InvalidDefinition(_)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", self_message(&self))
            }
            AppError::Workflow(WorkflowError::Terminal { .. }) => {
                (StatusCode::CONFLICT, "INSTANCE_TERMINAL", self_message(&self))
            }
            AppError::Workflow(WorkflowError::Queue(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "QUEUE_ERROR", self_message(&self))
            }
            AppError::Workflow(WorkflowError::Storage(e)) => storage_response(e),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
        };

        let body = json!({
            "data": null,
            "meta": {
                "request_id": "",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "response_time_ms": 0
            },
            "errors": [{
                "code": code,
                "message": message,
            }]
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}

fn self_message(err: &AppError) -> String {
    match err {
        AppError::Queue(e) => e.to_string(),
        AppError::Dlq(e) => e.to_string(),
        AppError::Workflow(e) => e.to_string(),
        AppError::Unauthorized(m) | AppError::Validation(m) | AppError::Internal(m) => m.clone(),
    }
}

fn storage_response(e: &RepositoryError) -> (StatusCode, &'static str, String) {
    match e {
        RepositoryError::NotFound => {
            (StatusCode::NOT_FOUND, "NOT_FOUND", "Resource not found".to_string())
        }
        RepositoryError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        other => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", other.to_string()),
    }
}
