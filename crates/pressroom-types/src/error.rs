//! Error taxonomy shared across the workspace.
//!
//! Storage failures surface as `RepositoryError` and are wrapped by the
//! service-level enums. Handler code distinguishes retryable from fatal
//! failures with `StepFailure`; the queue only sees an opaque error string.

use thiserror::Error;
use uuid::Uuid;

/// Storage-layer failure, independent of backend.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection failed: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Queue service failures.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Payload rejected before admission.
    #[error("invalid payload for job '{job}': {reason}")]
    Validation { job: String, reason: String },

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("unknown job name: {0}")]
    UnknownJobName(String),

    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

/// Dead-letter queue failures.
#[derive(Debug, Error)]
pub enum DlqError {
    #[error("dead-letter entry not found: {0}")]
    NotFound(Uuid),

    #[error("replay limit reached ({replay_count}/{max_replays})")]
    ReplayLimitExceeded { replay_count: u32, max_replays: u32 },

    /// Re-enqueue of the replayed job failed; the entry was left in place.
    #[error("replay re-enqueue failed: {0}")]
    Requeue(String),

    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

/// Workflow engine failures.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("workflow definition not found: {0}")]
    DefinitionNotFound(String),

    #[error("workflow instance not found: {0}")]
    InstanceNotFound(Uuid),

    #[error("invalid workflow definition: {0}")]
    InvalidDefinition(String),

    /// The instance already reached a terminal status.
    #[error("instance {instance} is terminal ({status})")]
    Terminal { instance: Uuid, status: String },

    #[error("queue error: {0}")]
    Queue(String),

    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

/// Outcome classification a step or job handler reports on failure.
///
/// `Retryable` consumes an attempt and may run again; `Fatal` stops the
/// retry loop immediately regardless of attempts remaining.
#[derive(Debug, Error)]
pub enum StepFailure {
    #[error("{0}")]
    Retryable(String),

    #[error("{0}")]
    Fatal(String),
}

impl StepFailure {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StepFailure::Fatal(_))
    }

    pub fn message(&self) -> &str {
        match self {
            StepFailure::Retryable(m) | StepFailure::Fatal(m) => m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = QueueError::Validation {
            job: "article.publish".to_string(),
            reason: "missing field `article_id`".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid payload for job 'article.publish': missing field `article_id`"
        );

        let err = DlqError::ReplayLimitExceeded {
            replay_count: 5,
            max_replays: 5,
        };
        assert_eq!(err.to_string(), "replay limit reached (5/5)");

        let id = Uuid::now_v7();
        let err = WorkflowError::Terminal {
            instance: id,
            status: "completed".to_string(),
        };
        assert_eq!(err.to_string(), format!("instance {id} is terminal (completed)"));
    }

    #[test]
    fn storage_wrapping_preserves_message() {
        let inner = RepositoryError::Query("no such table: jobs".to_string());
        let err: QueueError = inner.into();
        assert_eq!(err.to_string(), "query failed: no such table: jobs");
    }

    #[test]
    fn step_failure_classification() {
        let retryable = StepFailure::Retryable("503 from upstream".to_string());
        assert!(!retryable.is_fatal());
        assert_eq!(retryable.message(), "503 from upstream");

        let fatal = StepFailure::Fatal("payload schema mismatch".to_string());
        assert!(fatal.is_fatal());
    }
}
