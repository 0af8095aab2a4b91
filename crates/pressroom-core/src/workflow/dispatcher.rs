//! Trigger dispatcher.
//!
//! Fans a business trigger out to every active definition subscribed to its
//! exact type. Fan-out happens through the queue: one `workflow.dispatch`
//! job per matched definition, so a trigger burst is absorbed by workers
//! instead of blocking the caller.

use std::sync::Arc;

use pressroom_types::error::WorkflowError;
use pressroom_types::job::{Job, JobOptions};
use uuid::Uuid;

use crate::queue::QueueService;
use crate::repository::{JobRepository, WorkflowRepository};
use crate::workflow::{DispatchJobPayload, JOB_DISPATCH, WORKFLOW_QUEUE};

/// Trigger type recorded for on-demand runs.
pub const MANUAL_TRIGGER: &str = "manual";

pub struct TriggerDispatcher<W: WorkflowRepository, J: JobRepository> {
    workflows: Arc<W>,
    queue: Arc<QueueService<J>>,
}

impl<W: WorkflowRepository, J: JobRepository> TriggerDispatcher<W, J> {
    pub fn new(workflows: Arc<W>, queue: Arc<QueueService<J>>) -> Self {
        Self { workflows, queue }
    }

    /// Dispatch a trigger. Returns the enqueued jobs, one per matched
    /// definition; no match is not an error, just an empty result.
    ///
    /// A workspace-scoped trigger sees global definitions plus its own;
    /// a trigger without a workspace sees only global definitions.
    pub async fn dispatch(
        &self,
        trigger_type: &str,
        trigger_payload: serde_json::Value,
        workspace_id: Option<Uuid>,
    ) -> Result<Vec<Job>, WorkflowError> {
        let mut matched = self.workflows.find_by_trigger(trigger_type).await?;
        matched.retain(|d| d.workspace_id.is_none() || d.workspace_id == workspace_id);
        if matched.is_empty() {
            tracing::debug!(trigger_type, "no workflow subscribed to trigger");
            return Ok(Vec::new());
        }

        let mut jobs = Vec::with_capacity(matched.len());
        for def in matched {
            let job = self
                .enqueue_dispatch(&def.id, trigger_type, trigger_payload.clone())
                .await?;
            tracing::info!(
                trigger_type,
                workflow_key = %def.key,
                job_id = %job.id,
                "trigger dispatched"
            );
            jobs.push(job);
        }
        Ok(jobs)
    }

    /// Start one instance of a specific definition version on demand,
    /// bypassing trigger matching. The definition does not have to be the
    /// active version.
    pub async fn run(
        &self,
        workflow_id: &Uuid,
        trigger_payload: serde_json::Value,
    ) -> Result<Job, WorkflowError> {
        let def = self
            .workflows
            .get_definition(workflow_id)
            .await?
            .ok_or_else(|| WorkflowError::DefinitionNotFound(workflow_id.to_string()))?;

        let job = self
            .enqueue_dispatch(&def.id, MANUAL_TRIGGER, trigger_payload)
            .await?;
        tracing::info!(
            workflow_key = %def.key,
            version = def.version,
            job_id = %job.id,
            "manual run dispatched"
        );
        Ok(job)
    }

    async fn enqueue_dispatch(
        &self,
        workflow_id: &Uuid,
        trigger_type: &str,
        trigger_payload: serde_json::Value,
    ) -> Result<Job, WorkflowError> {
        let payload = DispatchJobPayload {
            workflow_id: *workflow_id,
            trigger_type: trigger_type.to_string(),
            trigger_payload,
        };
        let payload =
            serde_json::to_value(&payload).map_err(|e| WorkflowError::Queue(e.to_string()))?;
        self.queue
            .enqueue(WORKFLOW_QUEUE, JOB_DISPATCH, payload, JobOptions::default())
            .await
            .map_err(|e| WorkflowError::Queue(e.to_string()))
    }

    /// Trigger types any active definition is subscribed to.
    pub async fn registered_triggers(&self) -> Result<Vec<String>, WorkflowError> {
        let mut triggers: Vec<String> = self
            .workflows
            .list_definitions(true)
            .await?
            .into_iter()
            .flat_map(|d| d.triggers.into_iter().map(|t| t.trigger_type))
            .collect();
        triggers.sort();
        triggers.dedup();
        Ok(triggers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventBus;
    use crate::queue::service::QueueDefaults;
    use crate::testutil::{InMemoryJobs, InMemoryWorkflows};
    use crate::workflow::definition::DefinitionService;
    use crate::workflow::register_engine_schemas;
    use pressroom_types::workflow::{StepAction, StepDefinition, TriggerDescriptor, WorkflowSpec};
    use serde_json::json;
    use std::collections::HashMap;

    fn spec(key: &str, trigger: &str) -> WorkflowSpec {
        WorkflowSpec {
            key: key.to_string(),
            name: key.to_string(),
            triggers: vec![TriggerDescriptor::new(trigger)],
            steps: vec![StepDefinition {
                key: "notify".to_string(),
                action: StepAction::Notify,
                payload: HashMap::new(),
                timeout_ms: 0,
                retries: 0,
                retry_delay_ms: 0,
                condition: None,
                rollback_to: None,
            }],
            workspace_id: None,
        }
    }

    async fn fixture() -> (
        TriggerDispatcher<InMemoryWorkflows, InMemoryJobs>,
        DefinitionService<InMemoryWorkflows>,
        Arc<QueueService<InMemoryJobs>>,
    ) {
        let workflows = Arc::new(InMemoryWorkflows::default());
        let queue = Arc::new(QueueService::new(
            Arc::new(InMemoryJobs::default()),
            Arc::new(register_engine_schemas(crate::queue::SchemaRegistry::new())),
            EventBus::new(64),
            QueueDefaults::default(),
        ));
        (
            TriggerDispatcher::new(workflows.clone(), queue.clone()),
            DefinitionService::new(workflows),
            queue,
        )
    }

    #[tokio::test]
    async fn exact_match_fans_out_one_job_per_definition() {
        let (dispatcher, defs, _queue) = fixture().await;
        defs.apply(spec("article-review", "article.submitted_for_review")).await.unwrap();
        defs.apply(spec("review-audit", "article.submitted_for_review")).await.unwrap();
        defs.apply(spec("publish-fanout", "article.published")).await.unwrap();

        let jobs = dispatcher
            .dispatch("article.submitted_for_review", json!({"article_id": "42"}), None)
            .await
            .unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j.name == JOB_DISPATCH && j.queue == WORKFLOW_QUEUE));
    }

    #[tokio::test]
    async fn no_subscriber_is_empty_not_error() {
        let (dispatcher, _defs, _queue) = fixture().await;
        let jobs = dispatcher.dispatch("article.archived", json!({}), None).await.unwrap();
        assert!(jobs.is_empty());
    }

    #[tokio::test]
    async fn prefix_is_not_a_match() {
        let (dispatcher, defs, _queue) = fixture().await;
        defs.apply(spec("article-review", "article.submitted_for_review")).await.unwrap();

        let jobs = dispatcher.dispatch("article.submitted", json!({}), None).await.unwrap();
        assert!(jobs.is_empty());
    }

    #[tokio::test]
    async fn inactive_versions_do_not_fire() {
        let (dispatcher, defs, _queue) = fixture().await;
        let def = defs.apply(spec("article-review", "article.submitted_for_review")).await.unwrap();
        defs.deactivate(&def.id).await.unwrap();

        let jobs = dispatcher
            .dispatch("article.submitted_for_review", json!({}), None)
            .await
            .unwrap();
        assert!(jobs.is_empty());
    }

    #[tokio::test]
    async fn workspace_sees_global_plus_own_definitions() {
        let (dispatcher, defs, _queue) = fixture().await;
        let workspace = uuid::Uuid::now_v7();
        let other = uuid::Uuid::now_v7();

        defs.apply(spec("global-flow", "article.published")).await.unwrap();
        let mut scoped = spec("tenant-flow", "article.published");
        scoped.workspace_id = Some(workspace);
        defs.apply(scoped).await.unwrap();
        let mut foreign = spec("foreign-flow", "article.published");
        foreign.workspace_id = Some(other);
        defs.apply(foreign).await.unwrap();

        let jobs = dispatcher
            .dispatch("article.published", json!({}), Some(workspace))
            .await
            .unwrap();
        assert_eq!(jobs.len(), 2);

        // No workspace: only the global definition fires.
        let jobs = dispatcher
            .dispatch("article.published", json!({}), None)
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);
    }

    #[tokio::test]
    async fn manual_run_targets_one_version_even_when_inactive() {
        let (dispatcher, defs, _queue) = fixture().await;
        let v1 = defs.apply(spec("article-review", "article.submitted_for_review")).await.unwrap();
        defs.apply(spec("article-review", "article.submitted_for_review")).await.unwrap();

        let job = dispatcher.run(&v1.id, json!({"article_id": "7"})).await.unwrap();
        assert_eq!(job.name, JOB_DISPATCH);
        let payload: DispatchJobPayload = serde_json::from_value(job.payload).unwrap();
        assert_eq!(payload.workflow_id, v1.id);
        assert_eq!(payload.trigger_type, MANUAL_TRIGGER);
    }

    #[tokio::test]
    async fn manual_run_of_unknown_definition_fails() {
        let (dispatcher, _defs, _queue) = fixture().await;
        let err = dispatcher.run(&uuid::Uuid::now_v7(), json!({})).await.unwrap_err();
        assert!(matches!(err, WorkflowError::DefinitionNotFound(_)));
    }

    #[tokio::test]
    async fn registered_triggers_are_deduped() {
        let (dispatcher, defs, _queue) = fixture().await;
        defs.apply(spec("a", "article.published")).await.unwrap();
        defs.apply(spec("b", "article.published")).await.unwrap();

        assert_eq!(dispatcher.registered_triggers().await.unwrap(), vec!["article.published"]);
    }
}
