//! In-memory repository implementations for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use pressroom_types::dlq::{DlqEntry, DlqFilter};
use pressroom_types::error::RepositoryError;
use pressroom_types::job::{Job, JobState, QueueStats};
use pressroom_types::workflow::{
    InstanceStatus, WorkflowDefinition, WorkflowInstance, WorkflowStepExecution,
};
use schemars::JsonSchema;
use serde::Deserialize;
use uuid::Uuid;

use crate::queue::schema::SchemaRegistry;
use crate::repository::{DlqRepository, JobRepository, WorkflowRepository};

#[derive(Deserialize, JsonSchema)]
pub struct PublishPayload {
    #[allow(dead_code)]
    pub article_id: String,
}

/// Registry with the job names the tests enqueue.
pub fn test_schemas() -> SchemaRegistry {
    SchemaRegistry::new()
        .register::<PublishPayload>("article.publish")
        .register::<serde_json::Value>("test.any")
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryJobs {
    jobs: Mutex<Vec<Job>>,
}

impl InMemoryJobs {
    fn with<R>(&self, f: impl FnOnce(&mut Vec<Job>) -> R) -> R {
        f(&mut self.jobs.lock().unwrap())
    }
}

impl JobRepository for InMemoryJobs {
    async fn insert_job(&self, job: &Job) -> Result<bool, RepositoryError> {
        Ok(self.with(|jobs| {
            if jobs.iter().any(|j| j.queue == job.queue && j.id == job.id) {
                false
            } else {
                jobs.push(job.clone());
                true
            }
        }))
    }

    async fn claim_next(
        &self,
        queue: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>, RepositoryError> {
        Ok(self.with(|jobs| {
            let mut due: Vec<&mut Job> = jobs
                .iter_mut()
                .filter(|j| j.queue == queue && j.state == JobState::Pending && j.run_at <= now)
                .collect();
            due.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.run_at.cmp(&b.run_at)));
            due.into_iter().next().map(|job| {
                job.state = JobState::Active;
                job.locked_at = Some(now);
                job.clone()
            })
        }))
    }

    async fn complete_job(&self, queue: &str, job_id: &str) -> Result<(), RepositoryError> {
        self.with(|jobs| {
            for job in jobs.iter_mut() {
                if job.queue == queue && job.id == job_id {
                    job.state = JobState::Completed;
                    job.locked_at = None;
                    job.finished_at = Some(Utc::now());
                }
            }
        });
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
        self.with(|jobs| {
            for job in jobs.iter_mut() {
                if job.queue == queue && job.id == job_id {
                    job.state = JobState::Pending;
                    job.run_at = run_at;
                    job.attempts_made = attempts_made;
                    job.last_error = Some(last_error.to_string());
                    job.locked_at = None;
                }
            }
        });
        Ok(())
    }

    async fn fail_job(
        &self,
        queue: &str,
        job_id: &str,
        attempts_made: u32,
        last_error: &str,
    ) -> Result<(), RepositoryError> {
        self.with(|jobs| {
            for job in jobs.iter_mut() {
                if job.queue == queue && job.id == job_id {
                    job.state = JobState::Failed;
                    job.attempts_made = attempts_made;
                    job.last_error = Some(last_error.to_string());
                    job.locked_at = None;
                    job.finished_at = Some(Utc::now());
                }
            }
        });
        Ok(())
    }

    async fn revive_job(
        &self,
        queue: &str,
        job_id: &str,
        replay_count: u32,
        run_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        Ok(self.with(|jobs| {
            for job in jobs.iter_mut() {
                if job.queue == queue && job.id == job_id {
                    job.state = JobState::Pending;
                    job.attempts_made = 0;
                    job.replay_count = replay_count;
                    job.run_at = run_at;
                    job.last_error = None;
                    job.locked_at = None;
                    job.finished_at = None;
                    return true;
                }
            }
            false
        }))
    }

    async fn get_job(&self, queue: &str, job_id: &str) -> Result<Option<Job>, RepositoryError> {
        Ok(self.with(|jobs| {
            jobs.iter()
                .find(|j| j.queue == queue && j.id == job_id)
                .cloned()
        }))
    }

    async fn list_jobs(
        &self,
        queue: &str,
        state: Option<JobState>,
        limit: u32,
    ) -> Result<Vec<Job>, RepositoryError> {
        Ok(self.with(|jobs| {
            let mut out: Vec<Job> = jobs
                .iter()
                .filter(|j| j.queue == queue && state.is_none_or(|s| j.state == s))
                .cloned()
                .collect();
            out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            out.truncate(limit as usize);
            out
        }))
    }

    async fn purge_queue(&self, queue: &str) -> Result<u64, RepositoryError> {
        Ok(self.with(|jobs| {
            let before = jobs.len();
            jobs.retain(|j| !(j.queue == queue && j.state == JobState::Pending));
            (before - jobs.len()) as u64
        }))
    }

    async fn reset_stalled(
        &self,
        queue: &str,
        locked_before: DateTime<Utc>,
    ) -> Result<Vec<String>, RepositoryError> {
        Ok(self.with(|jobs| {
            let mut reset = Vec::new();
            for job in jobs.iter_mut() {
                if job.queue == queue
                    && job.state == JobState::Active
                    && job.locked_at.is_some_and(|at| at < locked_before)
                {
                    job.state = JobState::Pending;
                    job.locked_at = None;
                    reset.push(job.id.clone());
                }
            }
            reset
        }))
    }

    async fn delete_completed_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        Ok(self.with(|jobs| {
            let before = jobs.len();
            jobs.retain(|j| {
                !(j.state == JobState::Completed && j.finished_at.is_some_and(|at| at < cutoff))
            });
            (before - jobs.len()) as u64
        }))
    }

    async fn queue_stats(&self, queue: &str) -> Result<QueueStats, RepositoryError> {
        Ok(self.with(|jobs| {
            let mut stats = QueueStats {
                queue: queue.to_string(),
                ..Default::default()
            };
            for job in jobs.iter().filter(|j| j.queue == queue) {
                match job.state {
                    JobState::Pending => stats.pending += 1,
                    JobState::Active => stats.active += 1,
                    JobState::Completed => stats.completed += 1,
                    JobState::Failed => stats.failed += 1,
                }
            }
            stats
        }))
    }

    async fn list_queues(&self) -> Result<Vec<String>, RepositoryError> {
        Ok(self.with(|jobs| {
            let mut queues: Vec<String> = jobs.iter().map(|j| j.queue.clone()).collect();
            queues.sort();
            queues.dedup();
            queues
        }))
    }
}

// ---------------------------------------------------------------------------
// Dead-letter entries
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryDlq {
    entries: Mutex<Vec<DlqEntry>>,
}

fn matches_filter(entry: &DlqEntry, filter: &DlqFilter) -> bool {
    filter.queue.as_deref().is_none_or(|q| entry.original_queue == q)
        && filter.job_name.as_deref().is_none_or(|n| entry.job_name == n)
        && filter.failed_after.is_none_or(|t| entry.failed_at >= t)
        && filter.failed_before.is_none_or(|t| entry.failed_at <= t)
}

impl DlqRepository for InMemoryDlq {
    async fn upsert_entry(&self, entry: &DlqEntry) -> Result<DlqEntry, RepositoryError> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(existing) = entries.iter_mut().find(|e| {
            e.original_queue == entry.original_queue && e.original_job_id == entry.original_job_id
        }) {
            existing.job_name = entry.job_name.clone();
            existing.payload = entry.payload.clone();
            existing.error = entry.error.clone();
            existing.attempts_made = entry.attempts_made;
            existing.replay_count = entry.replay_count;
            existing.failed_at = entry.failed_at;
            Ok(existing.clone())
        } else {
            entries.push(entry.clone());
            Ok(entry.clone())
        }
    }

    async fn get_entry(&self, id: &Uuid) -> Result<Option<DlqEntry>, RepositoryError> {
        Ok(self.entries.lock().unwrap().iter().find(|e| e.id == *id).cloned())
    }

    async fn list_entries(
        &self,
        filter: &DlqFilter,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<DlqEntry>, RepositoryError> {
        let mut out: Vec<DlqEntry> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches_filter(e, filter))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.failed_at.cmp(&a.failed_at));
        Ok(out
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn delete_entry(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| e.id != *id);
        Ok(entries.len() < before)
    }

    async fn purge_entries(&self, filter: &DlqFilter) -> Result<u64, RepositoryError> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| !matches_filter(e, filter));
        Ok((before - entries.len()) as u64)
    }

    async fn count_for_queue(&self, queue: &str) -> Result<u64, RepositoryError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.original_queue == queue)
            .count() as u64)
    }
}

// ---------------------------------------------------------------------------
// Workflows
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryWorkflows {
    definitions: Mutex<Vec<WorkflowDefinition>>,
    instances: Mutex<HashMap<Uuid, WorkflowInstance>>,
    executions: Mutex<Vec<WorkflowStepExecution>>,
}

impl WorkflowRepository for InMemoryWorkflows {
    async fn save_definition(&self, def: &WorkflowDefinition) -> Result<(), RepositoryError> {
        let mut defs = self.definitions.lock().unwrap();
        if def.is_active {
            for other in defs.iter_mut().filter(|d| d.key == def.key) {
                other.is_active = false;
            }
        }
        defs.push(def.clone());
        Ok(())
    }

    async fn get_definition(
        &self,
        id: &Uuid,
    ) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        Ok(self
            .definitions
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.id == *id)
            .cloned())
    }

    async fn get_active_definition(
        &self,
        key: &str,
    ) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        Ok(self
            .definitions
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.key == key && d.is_active)
            .cloned())
    }

    async fn latest_version(&self, key: &str) -> Result<Option<u32>, RepositoryError> {
        Ok(self
            .definitions
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.key == key)
            .map(|d| d.version)
            .max())
    }

    async fn list_definitions(
        &self,
        active_only: bool,
    ) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
        Ok(self
            .definitions
            .lock()
            .unwrap()
            .iter()
            .filter(|d| !active_only || d.is_active)
            .cloned()
            .collect())
    }

    async fn find_by_trigger(
        &self,
        trigger_type: &str,
    ) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
        Ok(self
            .definitions
            .lock()
            .unwrap()
            .iter()
            .filter(|d| {
                d.is_active && d.triggers.iter().any(|t| t.trigger_type == trigger_type)
            })
            .cloned()
            .collect())
    }

    async fn deactivate_definition(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let mut defs = self.definitions.lock().unwrap();
        match defs.iter_mut().find(|d| d.id == *id) {
            Some(def) => {
                def.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_instance(&self, instance: &WorkflowInstance) -> Result<(), RepositoryError> {
        self.instances
            .lock()
            .unwrap()
            .insert(instance.id, instance.clone());
        Ok(())
    }

    async fn get_instance(&self, id: &Uuid) -> Result<Option<WorkflowInstance>, RepositoryError> {
        Ok(self.instances.lock().unwrap().get(id).cloned())
    }

    async fn update_instance(&self, instance: &WorkflowInstance) -> Result<(), RepositoryError> {
        self.instances
            .lock()
            .unwrap()
            .insert(instance.id, instance.clone());
        Ok(())
    }

    async fn list_instances(
        &self,
        workflow_key: Option<&str>,
        status: Option<InstanceStatus>,
        limit: u32,
    ) -> Result<Vec<WorkflowInstance>, RepositoryError> {
        let mut out: Vec<WorkflowInstance> = self
            .instances
            .lock()
            .unwrap()
            .values()
            .filter(|i| {
                workflow_key.is_none_or(|k| i.workflow_key == k)
                    && status.is_none_or(|s| i.status == s)
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        out.truncate(limit as usize);
        Ok(out)
    }

    async fn insert_step_execution(
        &self,
        exec: &WorkflowStepExecution,
    ) -> Result<(), RepositoryError> {
        self.executions.lock().unwrap().push(exec.clone());
        Ok(())
    }

    async fn update_step_execution(
        &self,
        exec: &WorkflowStepExecution,
    ) -> Result<(), RepositoryError> {
        let mut execs = self.executions.lock().unwrap();
        for existing in execs.iter_mut() {
            if existing.id == exec.id {
                *existing = exec.clone();
            }
        }
        Ok(())
    }

    async fn list_step_executions(
        &self,
        instance_id: &Uuid,
    ) -> Result<Vec<WorkflowStepExecution>, RepositoryError> {
        let mut out: Vec<WorkflowStepExecution> = self
            .executions
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.instance_id == *instance_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(out)
    }
}
