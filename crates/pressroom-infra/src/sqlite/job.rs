//! SQLite job repository implementation.
//!
//! Implements `JobRepository` from `pressroom-core` using sqlx with split
//! read/write pools. Claims are a single `UPDATE ... RETURNING` statement
//! on the writer pool, so two workers can never take the same job.

use chrono::{DateTime, Utc};
use pressroom_core::repository::JobRepository;
use pressroom_types::error::RepositoryError;
use pressroom_types::job::{BackoffPolicy, Job, JobState, QueueStats};
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_err};

/// SQLite-backed implementation of `JobRepository`.
pub struct SqliteJobRepository {
    pool: DatabasePool,
}

impl SqliteJobRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row type
// ---------------------------------------------------------------------------

struct JobRow {
    queue: String,
    id: String,
    name: String,
    payload: String,
    attempts: i64,
    backoff: String,
    priority: i64,
    run_at: String,
    state: String,
    attempts_made: i64,
    replay_count: i64,
    last_error: Option<String>,
    locked_at: Option<String>,
    created_at: String,
    finished_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            queue: row.try_get("queue")?,
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            payload: row.try_get("payload")?,
            attempts: row.try_get("attempts")?,
            backoff: row.try_get("backoff")?,
            priority: row.try_get("priority")?,
            run_at: row.try_get("run_at")?,
            state: row.try_get("state")?,
            attempts_made: row.try_get("attempts_made")?,
            replay_count: row.try_get("replay_count")?,
            last_error: row.try_get("last_error")?,
            locked_at: row.try_get("locked_at")?,
            created_at: row.try_get("created_at")?,
            finished_at: row.try_get("finished_at")?,
        })
    }

    fn into_job(self) -> Result<Job, RepositoryError> {
        let payload: serde_json::Value = serde_json::from_str(&self.payload)
            .map_err(|e| RepositoryError::Query(format!("invalid job payload JSON: {e}")))?;
        let backoff: BackoffPolicy = serde_json::from_str(&self.backoff)
            .map_err(|e| RepositoryError::Query(format!("invalid backoff JSON: {e}")))?;
        let state: JobState =
            serde_json::from_value(serde_json::Value::String(self.state.clone()))
                .map_err(|_| RepositoryError::Query(format!("invalid job state: {}", self.state)))?;

        Ok(Job {
            id: self.id,
            queue: self.queue,
            name: self.name,
            payload,
            attempts: self.attempts as u32,
            backoff,
            priority: self.priority as i32,
            run_at: parse_datetime(&self.run_at)?,
            state,
            attempts_made: self.attempts_made as u32,
            replay_count: self.replay_count as u32,
            last_error: self.last_error,
            locked_at: self.locked_at.as_deref().map(parse_datetime).transpose()?,
            created_at: parse_datetime(&self.created_at)?,
            finished_at: self.finished_at.as_deref().map(parse_datetime).transpose()?,
        })
    }
}

const JOB_COLUMNS: &str = "queue, id, name, payload, attempts, backoff, priority, run_at, state, \
                           attempts_made, replay_count, last_error, locked_at, created_at, finished_at";

// ---------------------------------------------------------------------------
// JobRepository impl
// ---------------------------------------------------------------------------

impl JobRepository for SqliteJobRepository {
    async fn insert_job(&self, job: &Job) -> Result<bool, RepositoryError> {
        let payload_json = serde_json::to_string(&job.payload)
            .map_err(|e| RepositoryError::Query(format!("serialize payload: {e}")))?;
        let backoff_json = serde_json::to_string(&job.backoff)
            .map_err(|e| RepositoryError::Query(format!("serialize backoff: {e}")))?;

        let result = sqlx::query(
            r#"INSERT OR IGNORE INTO jobs
               (queue, id, name, payload, attempts, backoff, priority, run_at, state,
                attempts_made, replay_count, last_error, locked_at, created_at, finished_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&job.queue)
        .bind(&job.id)
        .bind(&job.name)
        .bind(&payload_json)
        .bind(job.attempts as i64)
        .bind(&backoff_json)
        .bind(job.priority as i64)
        .bind(format_datetime(&job.run_at))
        .bind(job.state.as_str())
        .bind(job.attempts_made as i64)
        .bind(job.replay_count as i64)
        .bind(&job.last_error)
        .bind(job.locked_at.as_ref().map(format_datetime))
        .bind(format_datetime(&job.created_at))
        .bind(job.finished_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn claim_next(
        &self,
        queue: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>, RepositoryError> {
        let now_str = format_datetime(&now);
        let row = sqlx::query(&format!(
            r#"UPDATE jobs SET state = 'active', locked_at = ?
               WHERE queue = ? AND id = (
                   SELECT id FROM jobs
                   WHERE queue = ? AND state = 'pending' AND run_at <= ?
                   ORDER BY priority DESC, run_at ASC, created_at ASC
                   LIMIT 1
               )
               RETURNING {JOB_COLUMNS}"#
        ))
        .bind(&now_str)
        .bind(queue)
        .bind(queue)
        .bind(&now_str)
        .fetch_optional(&self.pool.writer)
        .await
        .map_err(query_err)?;

        match row {
            Some(row) => {
                let r = JobRow::from_row(&row).map_err(query_err)?;
                Ok(Some(r.into_job()?))
            }
            None => Ok(None),
        }
    }

    async fn complete_job(&self, queue: &str, job_id: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE jobs SET state = 'completed', locked_at = NULL, finished_at = ? \
             WHERE queue = ? AND id = ?",
        )
        .bind(format_datetime(&Utc::now()))
        .bind(queue)
        .bind(job_id)
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    async fn reschedule_job(
        &self,
        queue: &str,
        job_id: &str,
        run_at: DateTime<Utc>,
        attempts_made: u32,
        last_error: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE jobs SET state = 'pending', run_at = ?, attempts_made = ?, \
             last_error = ?, locked_at = NULL WHERE queue = ? AND id = ?",
        )
        .bind(format_datetime(&run_at))
        .bind(attempts_made as i64)
        .bind(last_error)
        .bind(queue)
        .bind(job_id)
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    async fn fail_job(
        &self,
        queue: &str,
        job_id: &str,
        attempts_made: u32,
        last_error: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE jobs SET state = 'failed', attempts_made = ?, last_error = ?, \
             locked_at = NULL, finished_at = ? WHERE queue = ? AND id = ?",
        )
        .bind(attempts_made as i64)
        .bind(last_error)
        .bind(format_datetime(&Utc::now()))
        .bind(queue)
        .bind(job_id)
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    async fn revive_job(
        &self,
        queue: &str,
        job_id: &str,
        replay_count: u32,
        run_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE jobs SET state = 'pending', attempts_made = 0, replay_count = ?, \
             run_at = ?, last_error = NULL, locked_at = NULL, finished_at = NULL \
             WHERE queue = ? AND id = ?",
        )
        .bind(replay_count as i64)
        .bind(format_datetime(&run_at))
        .bind(queue)
        .bind(job_id)
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_job(&self, queue: &str, job_id: &str) -> Result<Option<Job>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE queue = ? AND id = ?"
        ))
        .bind(queue)
        .bind(job_id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_err)?;

        match row {
            Some(row) => {
                let r = JobRow::from_row(&row).map_err(query_err)?;
                Ok(Some(r.into_job()?))
            }
            None => Ok(None),
        }
    }

    async fn list_jobs(
        &self,
        queue: &str,
        state: Option<JobState>,
        limit: u32,
    ) -> Result<Vec<Job>, RepositoryError> {
        let rows = match state {
            Some(state) => {
                sqlx::query(&format!(
                    "SELECT {JOB_COLUMNS} FROM jobs WHERE queue = ? AND state = ? \
                     ORDER BY created_at DESC LIMIT ?"
                ))
                .bind(queue)
                .bind(state.as_str())
                .bind(limit as i64)
                .fetch_all(&self.pool.reader)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {JOB_COLUMNS} FROM jobs WHERE queue = ? \
                     ORDER BY created_at DESC LIMIT ?"
                ))
                .bind(queue)
                .bind(limit as i64)
                .fetch_all(&self.pool.reader)
                .await
            }
        }
        .map_err(query_err)?;

        rows.iter()
            .map(|row| {
                JobRow::from_row(row)
                    .map_err(query_err)
                    .and_then(JobRow::into_job)
            })
            .collect()
    }

    async fn purge_queue(&self, queue: &str) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM jobs WHERE queue = ? AND state = 'pending'")
            .bind(queue)
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;
        Ok(result.rows_affected())
    }

    async fn reset_stalled(
        &self,
        queue: &str,
        locked_before: DateTime<Utc>,
    ) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query(
            "UPDATE jobs SET state = 'pending', locked_at = NULL \
             WHERE queue = ? AND state = 'active' AND locked_at < ? \
             RETURNING id",
        )
        .bind(queue)
        .bind(format_datetime(&locked_before))
        .fetch_all(&self.pool.writer)
        .await
        .map_err(query_err)?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("id").map_err(query_err))
            .collect()
    }

    async fn delete_completed_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM jobs WHERE state = 'completed' AND finished_at < ?",
        )
        .bind(format_datetime(&cutoff))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;
        Ok(result.rows_affected())
    }

    async fn queue_stats(&self, queue: &str) -> Result<QueueStats, RepositoryError> {
        let rows = sqlx::query(
            "SELECT state, COUNT(*) AS n FROM jobs WHERE queue = ? GROUP BY state",
        )
        .bind(queue)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        let mut stats = QueueStats {
            queue: queue.to_string(),
            ..Default::default()
        };
        for row in &rows {
            let state: String = row.try_get("state").map_err(query_err)?;
            let n: i64 = row.try_get("n").map_err(query_err)?;
            match state.as_str() {
                "pending" => stats.pending = n as u64,
                "active" => stats.active = n as u64,
                "completed" => stats.completed = n as u64,
                "failed" => stats.failed = n as u64,
                other => {
                    return Err(RepositoryError::Query(format!("invalid job state: {other}")));
                }
            }
        }

        let dead: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM dlq_entries WHERE original_queue = ?")
                .bind(queue)
                .fetch_one(&self.pool.reader)
                .await
                .map_err(query_err)?;
        stats.dead_lettered = dead.0 as u64;

        Ok(stats)
    }

    async fn list_queues(&self) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query("SELECT DISTINCT queue FROM jobs ORDER BY queue")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("queue").map_err(query_err))
            .collect()
    }
}
