//! Dead-letter queue types.
//!
//! When a job exhausts its attempts it is copied into `dlq_entries` with the
//! failure captured. Entries are keyed by the original queue and job id so a
//! replayed job that exhausts again re-joins its entry, preserving the
//! replay count.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One dead-lettered job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    /// UUIDv7 entry ID.
    pub id: Uuid,
    /// Queue the job failed on.
    pub original_queue: String,
    /// The job's id at failure time; reused on replay so downstream
    /// idempotency keys keep working.
    pub original_job_id: String,
    pub job_name: String,
    pub payload: serde_json::Value,
    /// Error from the final failed attempt.
    pub error: String,
    /// Attempts the job consumed before dead-lettering.
    pub attempts_made: u32,
    /// How many times this entry has been replayed.
    pub replay_count: u32,
    pub failed_at: DateTime<Utc>,
}

impl DlqEntry {
    /// Whether another replay is allowed under the given bound.
    pub fn can_replay(&self, max_replays: u32) -> bool {
        self.replay_count < max_replays
    }
}

/// Filter for listing or purging dead-letter entries. Empty matches all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DlqFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    /// Only entries that failed at or after this time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_after: Option<DateTime<Utc>>,
    /// Only entries that failed at or before this time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_before: Option<DateTime<Utc>>,
    /// Only entries replayed at least this many times.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replays: Option<u32>,
    /// Substring match over the error message and the original job id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl DlqFilter {
    /// True when no criteria are set, i.e. the filter matches everything.
    pub fn is_empty(&self) -> bool {
        self.queue.is_none()
            && self.job_name.is_none()
            && self.failed_after.is_none()
            && self.failed_before.is_none()
            && self.min_replays.is_none()
            && self.search.is_none()
    }
}

/// Outcome of one entry in a bulk replay or bulk delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqBulkResult {
    pub id: Uuid,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
