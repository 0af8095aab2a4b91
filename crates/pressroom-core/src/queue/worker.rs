//! Queue workers.
//!
//! Each queue gets a pool of claim loops plus one stall sweeper. A claim
//! loop pulls the next due job, routes it to the processor registered for
//! the job name, and settles the outcome: complete, retry with backoff, or
//! fail and dead-letter. Shutdown is cooperative via `CancellationToken`;
//! an in-flight job finishes before its worker exits.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use pressroom_types::error::StepFailure;
use pressroom_types::job::Job;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dlq::DlqService;
use crate::queue::service::QueueService;
use crate::registry::ProcessorMap;
use crate::repository::{DlqRepository, JobRepository};

/// Worker timing, taken from global configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Claim loops per queue.
    pub workers: u32,
    /// Sleep between claims when the queue is empty or paused.
    pub poll_interval: Duration,
    /// Claim age after which an active job counts as stalled.
    pub stall_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval: Duration::from_millis(500),
            stall_timeout: Duration::from_secs(300),
        }
    }
}

/// Worker pool for a single queue.
pub struct QueueWorkers<J: JobRepository + 'static, D: DlqRepository + 'static> {
    queue: String,
    service: Arc<QueueService<J>>,
    dlq: Arc<DlqService<D, J>>,
    processors: ProcessorMap,
    config: WorkerConfig,
    cancel: CancellationToken,
}

impl<J: JobRepository + 'static, D: DlqRepository + 'static> QueueWorkers<J, D> {
    pub fn new(
        queue: impl Into<String>,
        service: Arc<QueueService<J>>,
        dlq: Arc<DlqService<D, J>>,
        processors: ProcessorMap,
        config: WorkerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue: queue.into(),
            service,
            dlq,
            processors,
            config,
            cancel,
        }
    }

    /// Spawn the claim loops and the stall sweeper.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(self.config.workers as usize + 1);
        for n in 0..self.config.workers {
            let queue = self.queue.clone();
            let service = self.service.clone();
            let dlq = self.dlq.clone();
            let processors = self.processors.clone();
            let poll = self.config.poll_interval;
            let cancel = self.cancel.clone();
            handles.push(tokio::spawn(async move {
                info!(queue, worker = n, "queue worker started");
                claim_loop(&queue, service, dlq, processors, poll, cancel).await;
                info!(queue, worker = n, "queue worker stopped");
            }));
        }
        handles.push(tokio::spawn(stall_sweeper(
            self.queue,
            self.service,
            self.config.stall_timeout,
            self.cancel,
        )));
        handles
    }
}

async fn claim_loop<J: JobRepository, D: DlqRepository>(
    queue: &str,
    service: Arc<QueueService<J>>,
    dlq: Arc<DlqService<D, J>>,
    processors: ProcessorMap,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let job = match service.claim(queue).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => continue,
                }
            }
            Err(e) => {
                error!(queue, error = %e, "claim failed");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => continue,
                }
            }
        };
        process_one(queue, &job, &service, &dlq, &processors).await;
    }
}

/// Run one claimed job to a settled state.
async fn process_one<J: JobRepository, D: DlqRepository>(
    queue: &str,
    job: &Job,
    service: &QueueService<J>,
    dlq: &DlqService<D, J>,
    processors: &ProcessorMap,
) {
    let started = Instant::now();
    let result = match processors.get(&job.name) {
        Some(processor) => processor.process(job).await,
        None => Err(StepFailure::Fatal(format!(
            "no processor registered for job '{}'",
            job.name
        ))),
    };

    match result {
        Ok(()) => {
            debug!(queue, job_id = %job.id, "job completed");
            if let Err(e) = service.complete(job, started.elapsed()).await {
                error!(queue, job_id = %job.id, error = %e, "failed to mark job completed");
            }
        }
        Err(failure) => {
            let attempts_made = job.attempts_made + 1;
            let exhausted = failure.is_fatal() || attempts_made >= job.attempts;
            if exhausted {
                warn!(
                    queue, job_id = %job.id, attempts_made,
                    fatal = failure.is_fatal(), error = %failure,
                    "job exhausted, dead-lettering"
                );
                if let Err(e) = service.fail(job, attempts_made, failure.message()).await {
                    error!(queue, job_id = %job.id, error = %e, "failed to mark job failed");
                    return;
                }
                let mut settled = job.clone();
                settled.attempts_made = attempts_made;
                if let Err(e) = dlq.push_from_job(&settled, failure.message()).await {
                    error!(queue, job_id = %job.id, error = %e, "dead-letter push failed");
                }
            } else {
                debug!(queue, job_id = %job.id, attempts_made, error = %failure, "job retried");
                if let Err(e) = service.retry(job, attempts_made, failure.message()).await {
                    error!(queue, job_id = %job.id, error = %e, "failed to reschedule job");
                }
            }
        }
    }
}

/// Periodically return stalled claims to pending.
///
/// A stalled claim does not consume an attempt; the worker that held it is
/// presumed dead, not the job.
async fn stall_sweeper<J: JobRepository>(
    queue: String,
    service: Arc<QueueService<J>>,
    stall_timeout: Duration,
    cancel: CancellationToken,
) {
    let sweep_interval = (stall_timeout / 2).max(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(sweep_interval) => {}
        }
        match service.reset_stalled(&queue, stall_timeout).await {
            Ok(ids) => {
                for job_id in ids {
                    warn!(queue, job_id, "stalled job reset to pending");
                }
            }
            Err(e) => error!(queue, error = %e, "stall sweep failed"),
        }
    }
}

/// Periodically drop completed jobs older than the retention window.
pub fn spawn_retention_sweeper<J: JobRepository + 'static>(
    service: Arc<QueueService<J>>,
    retention: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = Duration::from_secs(3600).min(retention);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            let cutoff = Utc::now() - chrono::Duration::from_std(retention).unwrap_or_default();
            match service.delete_completed_before(cutoff).await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "expired completed jobs removed"),
                Err(e) => error!(error = %e, "retention sweep failed"),
            }
        }
    })
}
