//! SQLite dead-letter repository implementation.

use pressroom_core::repository::DlqRepository;
use pressroom_types::dlq::{DlqEntry, DlqFilter};
use pressroom_types::error::RepositoryError;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_uuid, query_err};

/// SQLite-backed implementation of `DlqRepository`.
pub struct SqliteDlqRepository {
    pool: DatabasePool,
}

impl SqliteDlqRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct DlqRow {
    id: String,
    original_queue: String,
    original_job_id: String,
    job_name: String,
    payload: String,
    error: String,
    attempts_made: i64,
    replay_count: i64,
    failed_at: String,
}

impl DlqRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            original_queue: row.try_get("original_queue")?,
            original_job_id: row.try_get("original_job_id")?,
            job_name: row.try_get("job_name")?,
            payload: row.try_get("payload")?,
            error: row.try_get("error")?,
            attempts_made: row.try_get("attempts_made")?,
            replay_count: row.try_get("replay_count")?,
            failed_at: row.try_get("failed_at")?,
        })
    }

    fn into_entry(self) -> Result<DlqEntry, RepositoryError> {
        let payload: serde_json::Value = serde_json::from_str(&self.payload)
            .map_err(|e| RepositoryError::Query(format!("invalid DLQ payload JSON: {e}")))?;
        Ok(DlqEntry {
            id: parse_uuid(&self.id)?,
            original_queue: self.original_queue,
            original_job_id: self.original_job_id,
            job_name: self.job_name,
            payload,
            error: self.error,
            attempts_made: self.attempts_made as u32,
            replay_count: self.replay_count as u32,
            failed_at: parse_datetime(&self.failed_at)?,
        })
    }
}

/// Builds the WHERE clause and bind values for a filter. An empty filter
/// produces a clause matching every row.
fn filter_clause(filter: &DlqFilter) -> (String, Vec<String>) {
    let mut clauses = Vec::new();
    let mut binds = Vec::new();
    if let Some(queue) = &filter.queue {
        clauses.push("original_queue = ?");
        binds.push(queue.clone());
    }
    if let Some(name) = &filter.job_name {
        clauses.push("job_name = ?");
        binds.push(name.clone());
    }
    if let Some(after) = &filter.failed_after {
        clauses.push("failed_at >= ?");
        binds.push(format_datetime(after));
    }
    if let Some(before) = &filter.failed_before {
        clauses.push("failed_at <= ?");
        binds.push(format_datetime(before));
    }
    if let Some(min) = filter.min_replays {
        // Text bind; SQLite coerces it against the INTEGER column.
        clauses.push("replay_count >= ?");
        binds.push(min.to_string());
    }
    if let Some(search) = &filter.search {
        clauses.push("(error LIKE ? OR original_job_id LIKE ?)");
        let pattern = format!("%{search}%");
        binds.push(pattern.clone());
        binds.push(pattern);
    }
    if clauses.is_empty() {
        ("1 = 1".to_string(), binds)
    } else {
        (clauses.join(" AND "), binds)
    }
}

impl DlqRepository for SqliteDlqRepository {
    async fn upsert_entry(&self, entry: &DlqEntry) -> Result<DlqEntry, RepositoryError> {
        let payload_json = serde_json::to_string(&entry.payload)
            .map_err(|e| RepositoryError::Query(format!("serialize payload: {e}")))?;

        // A re-exhausted replay joins its existing entry: the stored id is
        // kept, failure details are refreshed, and the replay count never
        // goes backwards.
        let row = sqlx::query(
            r#"INSERT INTO dlq_entries
               (id, original_queue, original_job_id, job_name, payload, error,
                attempts_made, replay_count, failed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(original_queue, original_job_id) DO UPDATE SET
                   job_name = excluded.job_name,
                   payload = excluded.payload,
                   error = excluded.error,
                   attempts_made = excluded.attempts_made,
                   replay_count = MAX(dlq_entries.replay_count, excluded.replay_count),
                   failed_at = excluded.failed_at
               RETURNING id, original_queue, original_job_id, job_name, payload, error,
                         attempts_made, replay_count, failed_at"#,
        )
        .bind(entry.id.to_string())
        .bind(&entry.original_queue)
        .bind(&entry.original_job_id)
        .bind(&entry.job_name)
        .bind(&payload_json)
        .bind(&entry.error)
        .bind(entry.attempts_made as i64)
        .bind(entry.replay_count as i64)
        .bind(format_datetime(&entry.failed_at))
        .fetch_one(&self.pool.writer)
        .await
        .map_err(query_err)?;

        DlqRow::from_row(&row).map_err(query_err)?.into_entry()
    }

    async fn get_entry(&self, id: &Uuid) -> Result<Option<DlqEntry>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, original_queue, original_job_id, job_name, payload, error, \
             attempts_made, replay_count, failed_at FROM dlq_entries WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_err)?;

        match row {
            Some(row) => Ok(Some(DlqRow::from_row(&row).map_err(query_err)?.into_entry()?)),
            None => Ok(None),
        }
    }

    async fn list_entries(
        &self,
        filter: &DlqFilter,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<DlqEntry>, RepositoryError> {
        let (clause, binds) = filter_clause(filter);
        let sql = format!(
            "SELECT id, original_queue, original_job_id, job_name, payload, error, \
             attempts_made, replay_count, failed_at FROM dlq_entries \
             WHERE {clause} ORDER BY failed_at DESC LIMIT ? OFFSET ?"
        );
        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        let rows = query
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        rows.iter()
            .map(|row| {
                DlqRow::from_row(row)
                    .map_err(query_err)
                    .and_then(DlqRow::into_entry)
            })
            .collect()
    }

    async fn delete_entry(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM dlq_entries WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_entries(&self, filter: &DlqFilter) -> Result<u64, RepositoryError> {
        let (clause, binds) = filter_clause(filter);
        let sql = format!("DELETE FROM dlq_entries WHERE {clause}");
        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        let result = query.execute(&self.pool.writer).await.map_err(query_err)?;
        Ok(result.rows_affected())
    }

    async fn count_for_queue(&self, queue: &str) -> Result<u64, RepositoryError> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM dlq_entries WHERE original_queue = ?")
                .bind(queue)
                .fetch_one(&self.pool.reader)
                .await
                .map_err(query_err)?;
        Ok(count.0 as u64)
    }
}
