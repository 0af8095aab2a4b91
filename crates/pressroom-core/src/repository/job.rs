//! Job repository trait definition.
//!
//! Storage interface for the `jobs` table. The infrastructure layer
//! (pressroom-infra) implements this trait with SQLite persistence.
//!
//! Uses native async fn in traits (Rust 2024 edition, no async_trait macro).

use chrono::{DateTime, Utc};
use pressroom_types::error::RepositoryError;
use pressroom_types::job::{Job, JobState, QueueStats};

/// Repository trait for queue job persistence.
pub trait JobRepository: Send + Sync {
    /// Insert a job. Returns `false` without writing when a job with the
    /// same id already exists on the same queue (idempotent enqueue).
    fn insert_job(
        &self,
        job: &Job,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Atomically claim the next due pending job on a queue, marking it
    /// active and setting `locked_at`. Among due jobs, higher priority wins,
    /// then earlier `run_at`.
    fn claim_next(
        &self,
        queue: &str,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Option<Job>, RepositoryError>> + Send;

    /// Mark an active job completed.
    fn complete_job(
        &self,
        queue: &str,
        job_id: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Return a failed attempt to pending with a future `run_at`, recording
    /// the attempt count and error. Clears the claim.
    fn reschedule_job(
        &self,
        queue: &str,
        job_id: &str,
        run_at: DateTime<Utc>,
        attempts_made: u32,
        last_error: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Mark a job failed (terminal) with its final error.
    fn fail_job(
        &self,
        queue: &str,
        job_id: &str,
        attempts_made: u32,
        last_error: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Reset a terminal job back to pending for a dead-letter replay,
    /// restoring its attempt budget. Returns `false` when the job row no
    /// longer exists.
    fn revive_job(
        &self,
        queue: &str,
        job_id: &str,
        replay_count: u32,
        run_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Get a job by queue and id.
    fn get_job(
        &self,
        queue: &str,
        job_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Job>, RepositoryError>> + Send;

    /// List jobs on a queue, newest first, optionally filtered by state.
    fn list_jobs(
        &self,
        queue: &str,
        state: Option<JobState>,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<Job>, RepositoryError>> + Send;

    /// Delete all pending jobs on a queue. Returns the number removed.
    fn purge_queue(
        &self,
        queue: &str,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Return active jobs whose claim is older than `locked_before` to
    /// pending without consuming an attempt. Returns the reset job ids.
    fn reset_stalled(
        &self,
        queue: &str,
        locked_before: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Vec<String>, RepositoryError>> + Send;

    /// Delete completed jobs that finished before the cutoff.
    fn delete_completed_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Per-state counters for one queue.
    fn queue_stats(
        &self,
        queue: &str,
    ) -> impl std::future::Future<Output = Result<QueueStats, RepositoryError>> + Send;

    /// Distinct queue names that have ever held a job.
    fn list_queues(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<String>, RepositoryError>> + Send;
}
