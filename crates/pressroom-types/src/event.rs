//! Lifecycle events published on the in-process event bus.
//!
//! Every significant queue, dead-letter, and workflow transition emits one
//! `QueueEvent`. Subscribers (WebSocket streams, the CLI, the monitor) get a
//! broadcast copy; publishing never blocks on slow consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse severity used by log sinks and the events stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Info,
    Warning,
    Error,
}

/// Queue health classification derived from the monitor's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

/// A lifecycle event on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    // ---- Job lifecycle ----
    JobEnqueued {
        queue: String,
        job_id: String,
        name: String,
        at: DateTime<Utc>,
    },
    JobStarted {
        queue: String,
        job_id: String,
        attempt: u32,
        at: DateTime<Utc>,
    },
    JobCompleted {
        queue: String,
        job_id: String,
        duration_ms: u64,
        at: DateTime<Utc>,
    },
    JobRetried {
        queue: String,
        job_id: String,
        attempt: u32,
        delay_ms: u64,
        error: String,
        at: DateTime<Utc>,
    },
    JobFailed {
        queue: String,
        job_id: String,
        attempts_made: u32,
        error: String,
        at: DateTime<Utc>,
    },
    JobStalled {
        queue: String,
        job_id: String,
        at: DateTime<Utc>,
    },

    // ---- Dead-letter queue ----
    DlqAdded {
        queue: String,
        job_id: String,
        entry_id: Uuid,
        at: DateTime<Utc>,
    },
    DlqReplayed {
        queue: String,
        job_id: String,
        entry_id: Uuid,
        replay_count: u32,
        at: DateTime<Utc>,
    },
    DlqDeleted {
        entry_id: Uuid,
        at: DateTime<Utc>,
    },
    DlqPurged {
        removed: u64,
        at: DateTime<Utc>,
    },

    // ---- Queue control ----
    QueuePaused {
        queue: String,
        at: DateTime<Utc>,
    },
    QueueResumed {
        queue: String,
        at: DateTime<Utc>,
    },
    QueuePurged {
        queue: String,
        removed: u64,
        at: DateTime<Utc>,
    },

    // ---- Monitor ----
    HealthAlert {
        queue: String,
        status: HealthStatus,
        score: u8,
        reason: String,
        at: DateTime<Utc>,
    },

    // ---- Workflow lifecycle ----
    InstanceStarted {
        instance_id: Uuid,
        workflow_key: String,
        trigger_type: String,
        at: DateTime<Utc>,
    },
    StepStarted {
        instance_id: Uuid,
        step_key: String,
        step_index: u32,
        at: DateTime<Utc>,
    },
    StepCompleted {
        instance_id: Uuid,
        step_key: String,
        attempts: u32,
        at: DateTime<Utc>,
    },
    StepSkipped {
        instance_id: Uuid,
        step_key: String,
        at: DateTime<Utc>,
    },
    StepFailed {
        instance_id: Uuid,
        step_key: String,
        attempts: u32,
        error: String,
        at: DateTime<Utc>,
    },
    InstanceCompleted {
        instance_id: Uuid,
        workflow_key: String,
        at: DateTime<Utc>,
    },
    InstanceFailed {
        instance_id: Uuid,
        workflow_key: String,
        rolled_back: bool,
        error: String,
        at: DateTime<Utc>,
    },
}

impl QueueEvent {
    /// The queue this event concerns, when it concerns one.
    pub fn queue(&self) -> Option<&str> {
        match self {
            QueueEvent::JobEnqueued { queue, .. }
            | QueueEvent::JobStarted { queue, .. }
            | QueueEvent::JobCompleted { queue, .. }
            | QueueEvent::JobRetried { queue, .. }
            | QueueEvent::JobFailed { queue, .. }
            | QueueEvent::JobStalled { queue, .. }
            | QueueEvent::DlqAdded { queue, .. }
            | QueueEvent::DlqReplayed { queue, .. }
            | QueueEvent::QueuePaused { queue, .. }
            | QueueEvent::QueueResumed { queue, .. }
            | QueueEvent::QueuePurged { queue, .. }
            | QueueEvent::HealthAlert { queue, .. } => Some(queue),
            _ => None,
        }
    }

    /// The job this event concerns, when it concerns one.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            QueueEvent::JobEnqueued { job_id, .. }
            | QueueEvent::JobStarted { job_id, .. }
            | QueueEvent::JobCompleted { job_id, .. }
            | QueueEvent::JobRetried { job_id, .. }
            | QueueEvent::JobFailed { job_id, .. }
            | QueueEvent::JobStalled { job_id, .. }
            | QueueEvent::DlqAdded { job_id, .. }
            | QueueEvent::DlqReplayed { job_id, .. } => Some(job_id),
            _ => None,
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            QueueEvent::JobFailed { .. }
            | QueueEvent::InstanceFailed { .. }
            | QueueEvent::DlqAdded { .. } => EventSeverity::Error,
            QueueEvent::JobRetried { .. }
            | QueueEvent::JobStalled { .. }
            | QueueEvent::StepFailed { .. } => EventSeverity::Warning,
            QueueEvent::HealthAlert { status, .. } => match status {
                HealthStatus::Critical => EventSeverity::Error,
                HealthStatus::Warning => EventSeverity::Warning,
                HealthStatus::Healthy => EventSeverity::Info,
            },
            _ => EventSeverity::Info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_serde_roundtrip() {
        let events = vec![
            QueueEvent::JobEnqueued {
                queue: "publishing".to_string(),
                job_id: "j1".to_string(),
                name: "article.publish".to_string(),
                at: Utc::now(),
            },
            QueueEvent::JobRetried {
                queue: "publishing".to_string(),
                job_id: "j1".to_string(),
                attempt: 2,
                delay_ms: 2_000,
                error: "timeout".to_string(),
                at: Utc::now(),
            },
            QueueEvent::DlqReplayed {
                queue: "publishing".to_string(),
                job_id: "j1".to_string(),
                entry_id: Uuid::now_v7(),
                replay_count: 1,
                at: Utc::now(),
            },
            QueueEvent::HealthAlert {
                queue: "notifications".to_string(),
                status: HealthStatus::Critical,
                score: 22,
                reason: "failure rate 0.61".to_string(),
                at: Utc::now(),
            },
            QueueEvent::StepSkipped {
                instance_id: Uuid::now_v7(),
                step_key: "suggest-metadata".to_string(),
                at: Utc::now(),
            },
        ];
        for event in events {
            let encoded = serde_json::to_string(&event).unwrap();
            let decoded: QueueEvent = serde_json::from_str(&encoded).unwrap();
            assert_eq!(
                serde_json::to_value(&decoded).unwrap(),
                serde_json::to_value(&event).unwrap()
            );
        }
    }

    #[test]
    fn tag_names_are_snake_case() {
        let encoded = serde_json::to_value(QueueEvent::QueuePaused {
            queue: "q".to_string(),
            at: Utc::now(),
        })
        .unwrap();
        assert_eq!(encoded["type"], "queue_paused");
    }

    #[test]
    fn queue_and_job_accessors() {
        let event = QueueEvent::JobFailed {
            queue: "publishing".to_string(),
            job_id: "j9".to_string(),
            attempts_made: 3,
            error: "boom".to_string(),
            at: Utc::now(),
        };
        assert_eq!(event.queue(), Some("publishing"));
        assert_eq!(event.job_id(), Some("j9"));
        assert_eq!(event.severity(), EventSeverity::Error);

        let event = QueueEvent::InstanceCompleted {
            instance_id: Uuid::now_v7(),
            workflow_key: "article-review".to_string(),
            at: Utc::now(),
        };
        assert_eq!(event.queue(), None);
        assert_eq!(event.job_id(), None);
        assert_eq!(event.severity(), EventSeverity::Info);
    }

    #[test]
    fn health_alert_severity_tracks_status() {
        let alert = |status| QueueEvent::HealthAlert {
            queue: "q".to_string(),
            status,
            score: 50,
            reason: String::new(),
            at: Utc::now(),
        };
        assert_eq!(alert(HealthStatus::Healthy).severity(), EventSeverity::Info);
        assert_eq!(alert(HealthStatus::Warning).severity(), EventSeverity::Warning);
        assert_eq!(alert(HealthStatus::Critical).severity(), EventSeverity::Error);
    }
}
