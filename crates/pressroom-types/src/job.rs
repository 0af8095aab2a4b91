//! Queue job types.
//!
//! A `Job` is one unit of background work: a named payload on a named queue
//! with retry bookkeeping. Jobs move through `JobState` under the queue
//! service and workers; the row in `jobs` is the single source of truth.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Delay policy between retry attempts of a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Retry immediately.
    None,
    /// Constant delay between attempts.
    Fixed { delay_ms: u64 },
    /// Delay grows linearly with the attempt number.
    Linear { delay_ms: u64 },
}

impl BackoffPolicy {
    /// Delay before the next attempt, given how many attempts already ran.
    pub fn delay_for(&self, attempts_made: u32) -> std::time::Duration {
        let ms = match self {
            BackoffPolicy::None => 0,
            BackoffPolicy::Fixed { delay_ms } => *delay_ms,
            BackoffPolicy::Linear { delay_ms } => delay_ms.saturating_mul(attempts_made as u64),
        };
        std::time::Duration::from_millis(ms)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Linear { delay_ms: 1_000 }
    }
}

// ---------------------------------------------------------------------------
// Job state
// ---------------------------------------------------------------------------

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting to be claimed (possibly not before `run_at`).
    Pending,
    /// Claimed by a worker and executing.
    Active,
    /// Finished successfully. Terminal.
    Completed,
    /// Exhausted all attempts and was moved to the dead-letter queue. Terminal.
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A queued unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Caller-supplied idempotency key, or a generated UUIDv7 string.
    pub id: String,
    /// Queue this job belongs to.
    pub queue: String,
    /// Job name; selects the payload schema and the processor.
    pub name: String,
    /// Validated payload, stored as JSON.
    pub payload: serde_json::Value,
    /// Maximum attempts before dead-lettering.
    pub attempts: u32,
    /// Retry delay policy.
    pub backoff: BackoffPolicy,
    /// Higher runs first among due jobs.
    pub priority: i32,
    /// Earliest time a worker may claim this job.
    pub run_at: DateTime<Utc>,
    pub state: JobState,
    /// Attempts consumed so far.
    pub attempts_made: u32,
    /// Times this job has been replayed from the dead-letter queue.
    #[serde(default)]
    pub replay_count: u32,
    /// Error message from the most recent failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Set while a worker holds the claim; used for stall detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Whether another attempt remains after a failure.
    pub fn has_attempts_left(&self) -> bool {
        self.attempts_made < self.attempts
    }
}

/// Per-enqueue options; everything is defaulted for the common case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobOptions {
    /// Maximum attempts. None uses the queue default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    /// Retry delay policy. None uses linear 1s.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff: Option<BackoffPolicy>,
    #[serde(default)]
    pub priority: i32,
    /// Delay before the job becomes claimable, in milliseconds.
    #[serde(default)]
    pub delay_ms: u64,
    /// Explicit idempotency key. A duplicate id on the same queue is a no-op.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Queue stats
// ---------------------------------------------------------------------------

/// Point-in-time counters for one queue.
///
/// Per-state counts come from storage; the rate fields are derived from the
/// monitor's rolling sample window and are absent until the queue has seen
/// job outcomes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue: String,
    pub pending: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    /// Dead-letter entries originating from this queue.
    pub dead_lettered: u64,
    pub paused: bool,
    /// Jobs completed over the last minute.
    #[serde(default)]
    pub throughput_per_min: u64,
    /// Mean processing time of recently completed jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_processing_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_rate: Option<f64>,
    /// When these counters were computed.
    pub collected_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn backoff_delay_schedule() {
        let linear = BackoffPolicy::Linear { delay_ms: 1_000 };
        assert_eq!(linear.delay_for(1).as_millis(), 1_000);
        assert_eq!(linear.delay_for(2).as_millis(), 2_000);
        assert_eq!(linear.delay_for(3).as_millis(), 3_000);

        let fixed = BackoffPolicy::Fixed { delay_ms: 500 };
        assert_eq!(fixed.delay_for(1).as_millis(), 500);
        assert_eq!(fixed.delay_for(7).as_millis(), 500);

        assert_eq!(BackoffPolicy::None.delay_for(4).as_millis(), 0);
    }

    #[test]
    fn backoff_default_is_linear_one_second() {
        assert_eq!(
            BackoffPolicy::default(),
            BackoffPolicy::Linear { delay_ms: 1_000 }
        );
    }

    #[test]
    fn backoff_tagged_serde() {
        let encoded = serde_json::to_value(BackoffPolicy::Linear { delay_ms: 250 }).unwrap();
        assert_eq!(encoded, json!({"type": "linear", "delay_ms": 250}));
        let decoded: BackoffPolicy =
            serde_json::from_value(json!({"type": "fixed", "delay_ms": 10})).unwrap();
        assert_eq!(decoded, BackoffPolicy::Fixed { delay_ms: 10 });
    }

    #[test]
    fn job_state_terminality() {
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Active.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
    }

    #[test]
    fn job_json_roundtrip() {
        let job = Job {
            id: "article-42-publish".to_string(),
            queue: "publishing".to_string(),
            name: "article.publish".to_string(),
            payload: json!({"article_id": "42"}),
            attempts: 3,
            backoff: BackoffPolicy::default(),
            priority: 5,
            run_at: Utc::now(),
            state: JobState::Pending,
            attempts_made: 0,
            replay_count: 0,
            last_error: None,
            locked_at: None,
            created_at: Utc::now(),
            finished_at: None,
        };
        let encoded = serde_json::to_string(&job).unwrap();
        let decoded: Job = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.id, "article-42-publish");
        assert_eq!(decoded.state, JobState::Pending);
        assert!(decoded.has_attempts_left());
    }

    #[test]
    fn job_options_default_shape() {
        let opts = JobOptions::default();
        assert!(opts.attempts.is_none());
        assert!(opts.backoff.is_none());
        assert_eq!(opts.priority, 0);
        assert_eq!(opts.delay_ms, 0);
        assert!(opts.job_id.is_none());
    }
}
