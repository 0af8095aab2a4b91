//! Per-queue health monitoring.
//!
//! Each queue gets its own actor over an mpsc channel. The monitor consumes
//! the event bus, folds job outcomes into a rolling sample window, tracks
//! backlog and pause state, and scores the queue 0 to 100. Crossing a
//! health boundary publishes a `HealthAlert` back onto the bus.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use pressroom_types::event::{HealthStatus, QueueEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::event::EventBus;

/// Rolling window size per queue.
const MAX_SAMPLES: usize = 1000;

/// Score below which a queue is critical.
const CRITICAL_BELOW: u8 = 40;

/// Score below which a queue is degraded.
const WARNING_BELOW: u8 = 70;

/// Mean processing time above which a queue counts as slow.
const SLOW_AVG_MS: f64 = 30_000.0;

/// Backlog depth above which waiting jobs count against the score.
const BACKLOG_THRESHOLD: u64 = 500;

const PENALTY_SLOW: f64 = 15.0;
const PENALTY_BACKLOG: f64 = 15.0;
const PENALTY_PAUSED: f64 = 10.0;
const PENALTY_LOW_SUCCESS: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Retried,
    Failed,
    Stalled,
}

/// One settled job attempt in the rolling window.
#[derive(Debug, Clone, Copy)]
struct Sample {
    outcome: Outcome,
    /// Processing time; only completions report one.
    duration_ms: Option<u64>,
    at: DateTime<Utc>,
}

/// One queue-scoped fact folded out of a bus event.
enum Observation {
    Enqueued,
    Started,
    Completed { duration_ms: u64 },
    Retried,
    Failed,
    Stalled,
    Paused,
    Resumed,
    Purged,
}

/// Point-in-time health snapshot for one queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueHealth {
    pub queue: String,
    pub status: HealthStatus,
    /// 100 is perfectly healthy, 0 is fully failing.
    pub score: u8,
    pub samples: usize,
    pub success_rate: f64,
    pub failure_rate: f64,
    pub retry_rate: f64,
    /// Jobs completed over the last minute.
    pub throughput_per_min: u64,
    /// Mean processing time of completed samples in the window.
    pub avg_processing_ms: Option<f64>,
    /// Approximate pending depth, folded from lifecycle events.
    pub backlog: u64,
    pub paused: bool,
    pub updated_at: DateTime<Utc>,
}

enum MonitorMsg {
    Record(Observation),
    Snapshot(oneshot::Sender<QueueHealth>),
}

struct QueueActor {
    queue: String,
    samples: VecDeque<Sample>,
    backlog: u64,
    paused: bool,
    last_status: HealthStatus,
    bus: EventBus,
}

impl QueueActor {
    fn new(queue: String, bus: EventBus) -> Self {
        Self {
            queue,
            samples: VecDeque::with_capacity(MAX_SAMPLES),
            backlog: 0,
            paused: false,
            last_status: HealthStatus::Healthy,
            bus,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<MonitorMsg>, cancel: CancellationToken) {
        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => break,
                msg = rx.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };
            match msg {
                MonitorMsg::Record(obs) => {
                    self.record(obs);
                    self.check_transition();
                }
                MonitorMsg::Snapshot(reply) => {
                    let _ = reply.send(self.health());
                }
            }
        }
        debug!(queue = %self.queue, "queue monitor actor stopped");
    }

    fn record(&mut self, obs: Observation) {
        match obs {
            Observation::Enqueued => self.backlog += 1,
            Observation::Started => self.backlog = self.backlog.saturating_sub(1),
            Observation::Completed { duration_ms } => {
                self.push_sample(Outcome::Completed, Some(duration_ms));
            }
            Observation::Retried => {
                self.backlog += 1;
                self.push_sample(Outcome::Retried, None);
            }
            Observation::Failed => self.push_sample(Outcome::Failed, None),
            Observation::Stalled => {
                self.backlog += 1;
                self.push_sample(Outcome::Stalled, None);
            }
            Observation::Paused => self.paused = true,
            Observation::Resumed => self.paused = false,
            Observation::Purged => self.backlog = 0,
        }
    }

    fn push_sample(&mut self, outcome: Outcome, duration_ms: Option<u64>) {
        if self.samples.len() == MAX_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample {
            outcome,
            duration_ms,
            at: Utc::now(),
        });
    }

    fn health(&self) -> QueueHealth {
        let total = self.samples.len();
        let count =
            |o: Outcome| self.samples.iter().filter(|s| s.outcome == o).count() as f64;
        let (success_rate, failure_rate, retry_rate, stall_rate) = if total == 0 {
            (1.0, 0.0, 0.0, 0.0)
        } else {
            let t = total as f64;
            (
                count(Outcome::Completed) / t,
                count(Outcome::Failed) / t,
                count(Outcome::Retried) / t,
                count(Outcome::Stalled) / t,
            )
        };

        let durations: Vec<u64> = self
            .samples
            .iter()
            .filter_map(|s| s.duration_ms)
            .collect();
        let avg_processing_ms = if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<u64>() as f64 / durations.len() as f64)
        };

        let minute_ago = Utc::now() - chrono::Duration::minutes(1);
        let throughput_per_min = self
            .samples
            .iter()
            .filter(|s| s.outcome == Outcome::Completed && s.at >= minute_ago)
            .count() as u64;

        let mut penalty = failure_rate * 80.0 + retry_rate * 30.0 + stall_rate * 40.0;
        if avg_processing_ms.is_some_and(|ms| ms > SLOW_AVG_MS) {
            penalty += PENALTY_SLOW;
        }
        if self.backlog >= BACKLOG_THRESHOLD {
            penalty += PENALTY_BACKLOG;
        }
        if self.paused {
            penalty += PENALTY_PAUSED;
        }
        if total > 0 && success_rate < 0.5 {
            penalty += PENALTY_LOW_SUCCESS;
        }
        let score = (100.0 - penalty).clamp(0.0, 100.0).round() as u8;

        QueueHealth {
            queue: self.queue.clone(),
            status: status_for(score),
            score,
            samples: total,
            success_rate,
            failure_rate,
            retry_rate,
            throughput_per_min,
            avg_processing_ms,
            backlog: self.backlog,
            paused: self.paused,
            updated_at: Utc::now(),
        }
    }

    fn check_transition(&mut self) {
        let health = self.health();
        if health.status == self.last_status {
            return;
        }
        self.last_status = health.status;
        self.bus.publish(QueueEvent::HealthAlert {
            queue: self.queue.clone(),
            status: health.status,
            score: health.score,
            reason: format!(
                "failure rate {:.2}, retry rate {:.2} over last {} jobs, backlog {}",
                health.failure_rate, health.retry_rate, health.samples, health.backlog
            ),
            at: Utc::now(),
        });
    }
}

fn status_for(score: u8) -> HealthStatus {
    if score < CRITICAL_BELOW {
        HealthStatus::Critical
    } else if score < WARNING_BELOW {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    }
}

/// Handle to the per-queue monitor actors.
///
/// `spawn` starts a bus consumer that lazily creates one actor per queue it
/// sees events for. Snapshots go through the actor's mailbox, so they are
/// consistent with the sample stream without shared locks.
pub struct QueueMonitor {
    actors: DashMap<String, mpsc::Sender<MonitorMsg>>,
    bus: EventBus,
    cancel: CancellationToken,
}

impl QueueMonitor {
    pub fn spawn(bus: EventBus, cancel: CancellationToken) -> std::sync::Arc<Self> {
        let monitor = std::sync::Arc::new(Self {
            actors: DashMap::new(),
            bus: bus.clone(),
            cancel: cancel.clone(),
        });
        let consumer = monitor.clone();
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = rx.recv() => match event {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "monitor lagged behind event bus");
                            continue;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                };
                consumer.observe(&event).await;
            }
        });
        monitor
    }

    /// Fold one bus event into the owning queue's actor.
    async fn observe(&self, event: &QueueEvent) {
        let obs = match event {
            QueueEvent::JobEnqueued { .. } => Observation::Enqueued,
            QueueEvent::JobStarted { .. } => Observation::Started,
            QueueEvent::JobCompleted { duration_ms, .. } => Observation::Completed {
                duration_ms: *duration_ms,
            },
            QueueEvent::JobRetried { .. } => Observation::Retried,
            QueueEvent::JobFailed { .. } => Observation::Failed,
            QueueEvent::JobStalled { .. } => Observation::Stalled,
            QueueEvent::QueuePaused { .. } => Observation::Paused,
            QueueEvent::QueueResumed { .. } => Observation::Resumed,
            QueueEvent::QueuePurged { .. } => Observation::Purged,
            _ => return,
        };
        let Some(queue) = event.queue() else { return };
        let tx = self.actor_for(queue);
        let _ = tx.send(MonitorMsg::Record(obs)).await;
    }

    fn actor_for(&self, queue: &str) -> mpsc::Sender<MonitorMsg> {
        self.actors
            .entry(queue.to_string())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::channel(256);
                let actor = QueueActor::new(queue.to_string(), self.bus.clone());
                tokio::spawn(actor.run(rx, self.cancel.clone()));
                tx
            })
            .clone()
    }

    /// Health snapshot for one queue. `None` until the queue has events.
    pub async fn health(&self, queue: &str) -> Option<QueueHealth> {
        let tx = self.actors.get(queue)?.clone();
        let (reply, rx) = oneshot::channel();
        tx.send(MonitorMsg::Snapshot(reply)).await.ok()?;
        rx.await.ok()
    }

    /// Health snapshots for every monitored queue.
    pub async fn all_health(&self) -> Vec<QueueHealth> {
        let queues: Vec<String> = self.actors.iter().map(|e| e.key().clone()).collect();
        let mut out = Vec::with_capacity(queues.len());
        for queue in queues {
            if let Some(health) = self.health(&queue).await {
                out.push(health);
            }
        }
        out.sort_by(|a, b| a.queue.cmp(&b.queue));
        out
    }
}
