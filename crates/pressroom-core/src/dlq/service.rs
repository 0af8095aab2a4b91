//! Dead-letter queue service.
//!
//! Jobs land here after exhausting their attempts. Entries carry the final
//! failure and a replay counter; replaying revives the original job row
//! (same id, restored attempt budget) and removes the entry. A job that
//! exhausts again after a replay re-joins the dead-letter queue with its
//! replay count intact, so the replay bound holds across round trips.

use std::sync::Arc;

use chrono::Utc;
use pressroom_types::dlq::{DlqBulkResult, DlqEntry, DlqFilter};
use pressroom_types::error::DlqError;
use pressroom_types::event::QueueEvent;
use pressroom_types::job::Job;
use uuid::Uuid;

use crate::event::EventBus;
use crate::repository::{DlqRepository, JobRepository};

pub struct DlqService<D: DlqRepository, J: JobRepository> {
    entries: Arc<D>,
    jobs: Arc<J>,
    bus: EventBus,
    max_replays: u32,
}

impl<D: DlqRepository, J: JobRepository> DlqService<D, J> {
    pub fn new(entries: Arc<D>, jobs: Arc<J>, bus: EventBus, max_replays: u32) -> Self {
        Self {
            entries,
            jobs,
            bus,
            max_replays,
        }
    }

    pub fn max_replays(&self) -> u32 {
        self.max_replays
    }

    /// Record an exhausted job. Called by workers after the final attempt.
    ///
    /// The entry is keyed by the job's queue and id, so a replayed job that
    /// fails again updates its existing entry instead of creating a second
    /// one; its replay count carries over via the job row.
    pub async fn push_from_job(&self, job: &Job, error: &str) -> Result<DlqEntry, DlqError> {
        let entry = DlqEntry {
            id: Uuid::now_v7(),
            original_queue: job.queue.clone(),
            original_job_id: job.id.clone(),
            job_name: job.name.clone(),
            payload: job.payload.clone(),
            error: error.to_string(),
            attempts_made: job.attempts_made,
            replay_count: job.replay_count,
            failed_at: Utc::now(),
        };
        let stored = self.entries.upsert_entry(&entry).await?;
        self.bus.publish(QueueEvent::DlqAdded {
            queue: stored.original_queue.clone(),
            job_id: stored.original_job_id.clone(),
            entry_id: stored.id,
            at: stored.failed_at,
        });
        Ok(stored)
    }

    pub async fn get(&self, id: &Uuid) -> Result<DlqEntry, DlqError> {
        self.entries
            .get_entry(id)
            .await?
            .ok_or(DlqError::NotFound(*id))
    }

    pub async fn list(
        &self,
        filter: &DlqFilter,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<DlqEntry>, DlqError> {
        Ok(self.entries.list_entries(filter, limit, offset).await?)
    }

    /// Put a dead-lettered job back on its original queue.
    ///
    /// The job keeps its original id so downstream idempotency keys still
    /// hold. Fails hard once the entry has been replayed `max_replays`
    /// times. On success the entry is removed.
    pub async fn replay(&self, id: &Uuid) -> Result<Job, DlqError> {
        let entry = self.get(id).await?;
        if !entry.can_replay(self.max_replays) {
            return Err(DlqError::ReplayLimitExceeded {
                replay_count: entry.replay_count,
                max_replays: self.max_replays,
            });
        }

        let replay_count = entry.replay_count + 1;
        let now = Utc::now();
        let revived = self
            .jobs
            .revive_job(&entry.original_queue, &entry.original_job_id, replay_count, now)
            .await
            .map_err(|e| DlqError::Requeue(e.to_string()))?;

        if !revived {
            // The job row was cleaned up; recreate it from the entry.
            let job = Job {
                id: entry.original_job_id.clone(),
                queue: entry.original_queue.clone(),
                name: entry.job_name.clone(),
                payload: entry.payload.clone(),
                attempts: entry.attempts_made.max(1),
                backoff: Default::default(),
                priority: 0,
                run_at: now,
                state: pressroom_types::job::JobState::Pending,
                attempts_made: 0,
                replay_count,
                last_error: None,
                locked_at: None,
                created_at: now,
                finished_at: None,
            };
            self.jobs
                .insert_job(&job)
                .await
                .map_err(|e| DlqError::Requeue(e.to_string()))?;
        }

        self.entries.delete_entry(id).await?;
        self.bus.publish(QueueEvent::DlqReplayed {
            queue: entry.original_queue.clone(),
            job_id: entry.original_job_id.clone(),
            entry_id: entry.id,
            replay_count,
            at: now,
        });

        let job = self
            .jobs
            .get_job(&entry.original_queue, &entry.original_job_id)
            .await
            .map_err(|e| DlqError::Requeue(e.to_string()))?
            .ok_or_else(|| DlqError::Requeue("revived job disappeared".to_string()))?;
        Ok(job)
    }

    /// Replay a batch, reporting the outcome per entry.
    pub async fn replay_many(&self, ids: &[Uuid]) -> Vec<DlqBulkResult> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let outcome = self.replay(id).await;
            results.push(DlqBulkResult {
                id: *id,
                ok: outcome.is_ok(),
                error: outcome.err().map(|e| e.to_string()),
            });
        }
        results
    }

    /// Discard one entry without replaying it.
    pub async fn delete(&self, id: &Uuid) -> Result<(), DlqError> {
        if !self.entries.delete_entry(id).await? {
            return Err(DlqError::NotFound(*id));
        }
        self.bus.publish(QueueEvent::DlqDeleted {
            entry_id: *id,
            at: Utc::now(),
        });
        Ok(())
    }

    pub async fn delete_many(&self, ids: &[Uuid]) -> Vec<DlqBulkResult> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let outcome = self.delete(id).await;
            results.push(DlqBulkResult {
                id: *id,
                ok: outcome.is_ok(),
                error: outcome.err().map(|e| e.to_string()),
            });
        }
        results
    }

    /// Discard every entry matching the filter.
    ///
    /// Callers must confirm unfiltered purges at their own boundary before
    /// invoking this with an empty filter.
    pub async fn purge(&self, filter: &DlqFilter) -> Result<u64, DlqError> {
        let removed = self.entries.purge_entries(filter).await?;
        self.bus.publish(QueueEvent::DlqPurged {
            removed,
            at: Utc::now(),
        });
        Ok(removed)
    }

    pub async fn count_for_queue(&self, queue: &str) -> Result<u64, DlqError> {
        Ok(self.entries.count_for_queue(queue).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{InMemoryDlq, InMemoryJobs};
    use pressroom_types::job::{BackoffPolicy, JobState};
    use serde_json::json;

    fn failed_job(id: &str) -> Job {
        Job {
            id: id.to_string(),
            queue: "publishing".to_string(),
            name: "article.publish".to_string(),
            payload: json!({"article_id": "42"}),
            attempts: 3,
            backoff: BackoffPolicy::default(),
            priority: 0,
            run_at: Utc::now(),
            state: JobState::Failed,
            attempts_made: 3,
            replay_count: 0,
            last_error: Some("upstream 503".to_string()),
            locked_at: None,
            created_at: Utc::now(),
            finished_at: Some(Utc::now()),
        }
    }

    fn service() -> DlqService<InMemoryDlq, InMemoryJobs> {
        DlqService::new(
            Arc::new(InMemoryDlq::default()),
            Arc::new(InMemoryJobs::default()),
            EventBus::new(64),
            5,
        )
    }

    #[tokio::test]
    async fn push_and_list() {
        let svc = service();
        let entry = svc.push_from_job(&failed_job("j1"), "upstream 503").await.unwrap();
        assert_eq!(entry.replay_count, 0);

        let listed = svc.list(&DlqFilter::default(), 10, 0).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].original_job_id, "j1");
    }

    #[tokio::test]
    async fn filtered_list_by_queue() {
        let svc = service();
        svc.push_from_job(&failed_job("j1"), "e").await.unwrap();
        let mut other = failed_job("j2");
        other.queue = "notifications".to_string();
        svc.push_from_job(&other, "e").await.unwrap();

        let filter = DlqFilter {
            queue: Some("notifications".to_string()),
            ..Default::default()
        };
        let listed = svc.list(&filter, 10, 0).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].original_queue, "notifications");
    }

    #[tokio::test]
    async fn replay_revives_original_job_and_removes_entry() {
        let svc = service();
        let job = failed_job("j1");
        svc.jobs.insert_job(&job).await.unwrap();
        let entry = svc.push_from_job(&job, "upstream 503").await.unwrap();

        let revived = svc.replay(&entry.id).await.unwrap();
        assert_eq!(revived.id, "j1");
        assert_eq!(revived.state, JobState::Pending);
        assert_eq!(revived.attempts_made, 0);
        assert_eq!(revived.replay_count, 1);

        assert!(matches!(svc.get(&entry.id).await, Err(DlqError::NotFound(_))));
    }

    #[tokio::test]
    async fn replay_recreates_job_when_row_is_gone() {
        let svc = service();
        let entry = svc.push_from_job(&failed_job("j1"), "upstream 503").await.unwrap();

        let revived = svc.replay(&entry.id).await.unwrap();
        assert_eq!(revived.id, "j1");
        assert_eq!(revived.replay_count, 1);
    }

    #[tokio::test]
    async fn replay_limit_is_a_hard_error() {
        let svc = service();
        let mut job = failed_job("j1");
        job.replay_count = 5;
        let entry = svc.push_from_job(&job, "still failing").await.unwrap();

        let err = svc.replay(&entry.id).await.unwrap_err();
        assert!(matches!(
            err,
            DlqError::ReplayLimitExceeded { replay_count: 5, max_replays: 5 }
        ));
        // The entry stays for inspection.
        assert!(svc.get(&entry.id).await.is_ok());
    }

    #[tokio::test]
    async fn re_exhausted_replay_joins_existing_entry() {
        let svc = service();
        let job = failed_job("j1");
        svc.jobs.insert_job(&job).await.unwrap();
        let entry = svc.push_from_job(&job, "first failure").await.unwrap();
        let revived = svc.replay(&entry.id).await.unwrap();

        // The revived job exhausts again.
        let second = svc.push_from_job(&revived, "second failure").await.unwrap();
        assert_eq!(second.replay_count, 1);
        assert_eq!(second.error, "second failure");
        assert_eq!(svc.list(&DlqFilter::default(), 10, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn bulk_replay_reports_per_entry() {
        let svc = service();
        let entry = svc.push_from_job(&failed_job("j1"), "e").await.unwrap();
        let missing = Uuid::now_v7();

        let results = svc.replay_many(&[entry.id, missing]).await;
        assert!(results[0].ok);
        assert!(!results[1].ok);
        assert!(results[1].error.as_deref().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn purge_with_filter() {
        let svc = service();
        svc.push_from_job(&failed_job("j1"), "e").await.unwrap();
        let mut other = failed_job("j2");
        other.queue = "notifications".to_string();
        svc.push_from_job(&other, "e").await.unwrap();

        let filter = DlqFilter {
            queue: Some("publishing".to_string()),
            ..Default::default()
        };
        assert_eq!(svc.purge(&filter).await.unwrap(), 1);
        assert_eq!(svc.list(&DlqFilter::default(), 10, 0).await.unwrap().len(), 1);
    }
}
