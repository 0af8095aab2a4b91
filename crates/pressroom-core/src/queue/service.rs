//! Queue service: admission, control, and stats.
//!
//! The service owns everything that happens to a job outside a worker's
//! claim: validated enqueue with idempotent ids, pause/resume, purge, and
//! cached per-queue counters. Workers call back into the service so every
//! state transition publishes its lifecycle event from one place.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use pressroom_types::error::QueueError;
use pressroom_types::event::QueueEvent;
use pressroom_types::job::{Job, JobOptions, JobState, QueueStats};
use uuid::Uuid;

use crate::event::EventBus;
use crate::monitor::QueueMonitor;
use crate::queue::schema::SchemaRegistry;
use crate::repository::JobRepository;

/// Tunables the service reads from global configuration.
#[derive(Debug, Clone)]
pub struct QueueDefaults {
    /// Attempt budget for jobs that do not set their own.
    pub default_attempts: u32,
    /// Stats cache lifetime.
    pub stats_ttl: Duration,
}

impl Default for QueueDefaults {
    fn default() -> Self {
        Self {
            default_attempts: 3,
            stats_ttl: Duration::from_secs(10),
        }
    }
}

struct CachedStats {
    at: Instant,
    stats: QueueStats,
}

/// Service facade over the job repository.
pub struct QueueService<J: JobRepository> {
    repo: Arc<J>,
    schemas: Arc<SchemaRegistry>,
    bus: EventBus,
    defaults: QueueDefaults,
    monitor: Option<Arc<QueueMonitor>>,
    paused: DashMap<String, ()>,
    stats_cache: DashMap<String, CachedStats>,
}

impl<J: JobRepository> QueueService<J> {
    pub fn new(
        repo: Arc<J>,
        schemas: Arc<SchemaRegistry>,
        bus: EventBus,
        defaults: QueueDefaults,
    ) -> Self {
        Self {
            repo,
            schemas,
            bus,
            defaults,
            monitor: None,
            paused: DashMap::new(),
            stats_cache: DashMap::new(),
        }
    }

    /// Attach the monitor whose rolling window enriches `stats`.
    pub fn with_monitor(mut self, monitor: Arc<QueueMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    // -----------------------------------------------------------------------
    // Admission
    // -----------------------------------------------------------------------

    /// Validate and enqueue a job.
    ///
    /// A caller-supplied `job_id` acts as an idempotency key: if a job with
    /// that id already exists on the queue, nothing is written and the
    /// existing job is returned.
    pub async fn enqueue(
        &self,
        queue: &str,
        name: &str,
        payload: serde_json::Value,
        opts: JobOptions,
    ) -> Result<Job, QueueError> {
        self.schemas.validate(name, &payload)?;

        let now = Utc::now();
        let job = Job {
            id: opts
                .job_id
                .unwrap_or_else(|| Uuid::now_v7().to_string()),
            queue: queue.to_string(),
            name: name.to_string(),
            payload,
            attempts: opts.attempts.unwrap_or(self.defaults.default_attempts).max(1),
            backoff: opts.backoff.unwrap_or_default(),
            priority: opts.priority,
            run_at: now + chrono::Duration::milliseconds(opts.delay_ms as i64),
            state: JobState::Pending,
            attempts_made: 0,
            replay_count: 0,
            last_error: None,
            locked_at: None,
            created_at: now,
            finished_at: None,
        };

        let inserted = self.repo.insert_job(&job).await?;
        if !inserted {
            tracing::debug!(queue, job_id = %job.id, "duplicate job id, enqueue is a no-op");
            let existing = self
                .repo
                .get_job(queue, &job.id)
                .await?
                .ok_or_else(|| QueueError::NotFound(job.id.clone()))?;
            return Ok(existing);
        }

        self.bus.publish(QueueEvent::JobEnqueued {
            queue: queue.to_string(),
            job_id: job.id.clone(),
            name: name.to_string(),
            at: now,
        });
        Ok(job)
    }

    pub async fn get_job(&self, queue: &str, job_id: &str) -> Result<Option<Job>, QueueError> {
        Ok(self.repo.get_job(queue, job_id).await?)
    }

    pub async fn list_jobs(
        &self,
        queue: &str,
        state: Option<JobState>,
        limit: u32,
    ) -> Result<Vec<Job>, QueueError> {
        Ok(self.repo.list_jobs(queue, state, limit).await?)
    }

    // -----------------------------------------------------------------------
    // Worker callbacks
    // -----------------------------------------------------------------------

    /// Claim the next due job, if the queue is not paused.
    pub async fn claim(&self, queue: &str) -> Result<Option<Job>, QueueError> {
        if self.is_paused(queue) {
            return Ok(None);
        }
        let claimed = self.repo.claim_next(queue, Utc::now()).await?;
        if let Some(job) = &claimed {
            self.bus.publish(QueueEvent::JobStarted {
                queue: queue.to_string(),
                job_id: job.id.clone(),
                attempt: job.attempts_made + 1,
                at: Utc::now(),
            });
        }
        Ok(claimed)
    }

    pub async fn complete(&self, job: &Job, duration: Duration) -> Result<(), QueueError> {
        self.repo.complete_job(&job.queue, &job.id).await?;
        self.bus.publish(QueueEvent::JobCompleted {
            queue: job.queue.clone(),
            job_id: job.id.clone(),
            duration_ms: duration.as_millis() as u64,
            at: Utc::now(),
        });
        Ok(())
    }

    /// Return a failed attempt to pending, delayed by the job's backoff.
    pub async fn retry(
        &self,
        job: &Job,
        attempts_made: u32,
        error: &str,
    ) -> Result<(), QueueError> {
        let delay = job.backoff.delay_for(attempts_made);
        let run_at = Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);
        self.repo
            .reschedule_job(&job.queue, &job.id, run_at, attempts_made, error)
            .await?;
        self.bus.publish(QueueEvent::JobRetried {
            queue: job.queue.clone(),
            job_id: job.id.clone(),
            attempt: attempts_made,
            delay_ms: delay.as_millis() as u64,
            error: error.to_string(),
            at: Utc::now(),
        });
        Ok(())
    }

    /// Mark a job failed for good. The caller dead-letters it next.
    pub async fn fail(&self, job: &Job, attempts_made: u32, error: &str) -> Result<(), QueueError> {
        self.repo
            .fail_job(&job.queue, &job.id, attempts_made, error)
            .await?;
        self.bus.publish(QueueEvent::JobFailed {
            queue: job.queue.clone(),
            job_id: job.id.clone(),
            attempts_made,
            error: error.to_string(),
            at: Utc::now(),
        });
        Ok(())
    }

    /// Return stalled claims to pending without consuming an attempt.
    pub async fn reset_stalled(
        &self,
        queue: &str,
        stall_timeout: Duration,
    ) -> Result<Vec<String>, QueueError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(stall_timeout).unwrap_or(chrono::Duration::zero());
        let ids = self.repo.reset_stalled(queue, cutoff).await?;
        for job_id in &ids {
            self.bus.publish(QueueEvent::JobStalled {
                queue: queue.to_string(),
                job_id: job_id.clone(),
                at: Utc::now(),
            });
        }
        Ok(ids)
    }

    /// Drop completed jobs that finished before the cutoff.
    pub async fn delete_completed_before(
        &self,
        cutoff: chrono::DateTime<Utc>,
    ) -> Result<u64, QueueError> {
        Ok(self.repo.delete_completed_before(cutoff).await?)
    }

    // -----------------------------------------------------------------------
    // Control
    // -----------------------------------------------------------------------

    pub fn is_paused(&self, queue: &str) -> bool {
        self.paused.contains_key(queue)
    }

    /// Stop workers from claiming new jobs on a queue. In-flight jobs finish.
    pub fn pause(&self, queue: &str) {
        if self.paused.insert(queue.to_string(), ()).is_none() {
            self.bus.publish(QueueEvent::QueuePaused {
                queue: queue.to_string(),
                at: Utc::now(),
            });
        }
    }

    pub fn resume(&self, queue: &str) {
        if self.paused.remove(queue).is_some() {
            self.bus.publish(QueueEvent::QueueResumed {
                queue: queue.to_string(),
                at: Utc::now(),
            });
        }
    }

    /// Delete all pending jobs on a queue. Active jobs are untouched.
    pub async fn purge(&self, queue: &str) -> Result<u64, QueueError> {
        let removed = self.repo.purge_queue(queue).await?;
        self.stats_cache.remove(queue);
        self.bus.publish(QueueEvent::QueuePurged {
            queue: queue.to_string(),
            removed,
            at: Utc::now(),
        });
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    /// Per-queue counters plus monitor-derived rates, cached for the
    /// configured TTL.
    pub async fn stats(&self, queue: &str) -> Result<QueueStats, QueueError> {
        if let Some(cached) = self.stats_cache.get(queue) {
            if cached.at.elapsed() < self.defaults.stats_ttl {
                return Ok(cached.stats.clone());
            }
        }
        let mut stats = self.repo.queue_stats(queue).await?;
        stats.paused = self.is_paused(queue);
        if let Some(monitor) = &self.monitor {
            if let Some(health) = monitor.health(queue).await {
                stats.throughput_per_min = health.throughput_per_min;
                stats.avg_processing_ms = health.avg_processing_ms;
                stats.success_rate = Some(health.success_rate);
                stats.error_rate = Some(health.failure_rate);
            }
        }
        stats.collected_at = Some(Utc::now());
        self.stats_cache.insert(
            queue.to_string(),
            CachedStats {
                at: Instant::now(),
                stats: stats.clone(),
            },
        );
        Ok(stats)
    }

    /// Stats for every queue that has ever held a job.
    pub async fn all_stats(&self) -> Result<Vec<QueueStats>, QueueError> {
        let mut out = Vec::new();
        for queue in self.repo.list_queues().await? {
            out.push(self.stats(&queue).await?);
        }
        Ok(out)
    }

    pub async fn list_queues(&self) -> Result<Vec<String>, QueueError> {
        Ok(self.repo.list_queues().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dlq::DlqService;
    use crate::testutil::{InMemoryDlq, InMemoryJobs, test_schemas};
    use pressroom_types::dlq::DlqFilter;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn service() -> QueueService<InMemoryJobs> {
        QueueService::new(
            Arc::new(InMemoryJobs::default()),
            Arc::new(test_schemas()),
            EventBus::new(64),
            QueueDefaults::default(),
        )
    }

    #[tokio::test]
    async fn enqueue_validates_and_stores() {
        let svc = service();
        let mut rx = svc.bus().subscribe();

        let job = svc
            .enqueue("publishing", "article.publish", json!({"article_id": "42"}), JobOptions::default())
            .await
            .unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 3);

        assert!(matches!(rx.recv().await.unwrap(), QueueEvent::JobEnqueued { .. }));
    }

    #[tokio::test]
    async fn enqueue_rejects_bad_payload() {
        let svc = service();
        let err = svc
            .enqueue("publishing", "article.publish", json!({"wrong": 1}), JobOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Validation { .. }));
    }

    #[tokio::test]
    async fn duplicate_job_id_is_a_noop() {
        let svc = service();
        let opts = JobOptions {
            job_id: Some("article-42-publish".to_string()),
            ..Default::default()
        };
        let first = svc
            .enqueue("publishing", "article.publish", json!({"article_id": "42"}), opts.clone())
            .await
            .unwrap();
        let second = svc
            .enqueue("publishing", "article.publish", json!({"article_id": "42"}), opts)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(svc.list_jobs("publishing", None, 100).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn paused_queue_claims_nothing() {
        let svc = service();
        svc.enqueue("publishing", "article.publish", json!({"article_id": "42"}), JobOptions::default())
            .await
            .unwrap();

        svc.pause("publishing");
        assert!(svc.claim("publishing").await.unwrap().is_none());

        svc.resume("publishing");
        assert!(svc.claim("publishing").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delayed_job_is_not_claimable_before_run_at() {
        let svc = service();
        let opts = JobOptions {
            delay_ms: 60_000,
            ..Default::default()
        };
        svc.enqueue("publishing", "article.publish", json!({"article_id": "42"}), opts)
            .await
            .unwrap();
        assert!(svc.claim("publishing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn priority_orders_claims() {
        let svc = service();
        for (id, priority) in [("low", 0), ("high", 9), ("mid", 5)] {
            let opts = JobOptions {
                job_id: Some(id.to_string()),
                priority,
                ..Default::default()
            };
            svc.enqueue("publishing", "article.publish", json!({"article_id": "42"}), opts)
                .await
                .unwrap();
        }
        assert_eq!(svc.claim("publishing").await.unwrap().unwrap().id, "high");
        assert_eq!(svc.claim("publishing").await.unwrap().unwrap().id, "mid");
        assert_eq!(svc.claim("publishing").await.unwrap().unwrap().id, "low");
    }

    #[tokio::test]
    async fn purge_removes_pending_only() {
        let svc = service();
        for id in ["a", "b"] {
            let opts = JobOptions {
                job_id: Some(id.to_string()),
                ..Default::default()
            };
            svc.enqueue("publishing", "article.publish", json!({"article_id": "42"}), opts)
                .await
                .unwrap();
        }
        let active = svc.claim("publishing").await.unwrap().unwrap();

        let removed = svc.purge("publishing").await.unwrap();
        assert_eq!(removed, 1);
        let remaining = svc.list_jobs("publishing", None, 100).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, active.id);
    }

    #[tokio::test]
    async fn purge_leaves_dead_letter_entries_untouched() {
        let jobs = Arc::new(InMemoryJobs::default());
        let bus = EventBus::new(64);
        let svc = QueueService::new(
            jobs.clone(),
            Arc::new(test_schemas()),
            bus.clone(),
            QueueDefaults::default(),
        );
        let dlq = DlqService::new(Arc::new(InMemoryDlq::default()), jobs, bus, 3);

        let exhausted = svc
            .enqueue("publishing", "article.publish", json!({"article_id": "42"}), JobOptions::default())
            .await
            .unwrap();
        dlq.push_from_job(&exhausted, "boom").await.unwrap();
        svc.enqueue("publishing", "article.publish", json!({"article_id": "43"}), JobOptions::default())
            .await
            .unwrap();

        svc.purge("publishing").await.unwrap();
        assert!(svc.list_jobs("publishing", None, 100).await.unwrap().is_empty());
        assert_eq!(dlq.count_for_queue("publishing").await.unwrap(), 1);
        assert_eq!(dlq.list(&DlqFilter::default(), 100, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stats_carry_monitor_derived_rates() {
        let bus = EventBus::new(64);
        let monitor = QueueMonitor::spawn(bus.clone(), CancellationToken::new());
        let svc = QueueService::new(
            Arc::new(InMemoryJobs::default()),
            Arc::new(test_schemas()),
            bus,
            QueueDefaults::default(),
        )
        .with_monitor(monitor);

        svc.enqueue("publishing", "article.publish", json!({"article_id": "42"}), JobOptions::default())
            .await
            .unwrap();
        let job = svc.claim("publishing").await.unwrap().unwrap();
        svc.complete(&job, Duration::from_millis(40)).await.unwrap();

        // Give the monitor's bus consumer a beat to fold the events in.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let stats = svc.stats("publishing").await.unwrap();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.throughput_per_min, 1);
        assert_eq!(stats.avg_processing_ms, Some(40.0));
        assert_eq!(stats.success_rate, Some(1.0));
        assert_eq!(stats.error_rate, Some(0.0));
    }

    #[tokio::test]
    async fn stats_are_cached_within_ttl() {
        let svc = service();
        svc.enqueue("publishing", "article.publish", json!({"article_id": "42"}), JobOptions::default())
            .await
            .unwrap();

        let first = svc.stats("publishing").await.unwrap();
        assert_eq!(first.pending, 1);

        // A write after the snapshot is invisible until the TTL lapses.
        svc.enqueue("publishing", "article.publish", json!({"article_id": "43"}), JobOptions::default())
            .await
            .unwrap();
        let second = svc.stats("publishing").await.unwrap();
        assert_eq!(second.pending, 1);
        assert_eq!(second.collected_at, first.collected_at);
    }
}
