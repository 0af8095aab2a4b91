//! Workflow step runner.
//!
//! Executes one step per `workflow.step.execute` job: evaluate the step's
//! condition, run the handler under its timeout with the declared retry
//! budget, merge the output patch into the instance context, and enqueue
//! the next step. Instances advance strictly sequentially; a terminal
//! instance turns any further step job into a no-op.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pressroom_types::error::{StepFailure, WorkflowError};
use pressroom_types::event::QueueEvent;
use pressroom_types::job::{Job, JobOptions};
use pressroom_types::workflow::{
    ContextValue, InstanceStatus, StepDefinition, StepExecStatus, WorkflowDefinition,
    WorkflowInstance, WorkflowStepExecution,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::event::EventBus;
use crate::queue::QueueService;
use crate::registry::{JobProcessor, StepInput, StepOutput, StepRegistry};
use crate::repository::{JobRepository, WorkflowRepository};
use crate::workflow::context::{LAST_RESULT, StepContext};
use crate::workflow::{DispatchJobPayload, JOB_STEP, StepJobPayload, WORKFLOW_QUEUE, step_job_id};

pub struct WorkflowRunner<W: WorkflowRepository, J: JobRepository> {
    workflows: Arc<W>,
    queue: Arc<QueueService<J>>,
    handlers: Arc<StepRegistry>,
    bus: EventBus,
}

impl<W: WorkflowRepository, J: JobRepository> WorkflowRunner<W, J> {
    pub fn new(
        workflows: Arc<W>,
        queue: Arc<QueueService<J>>,
        handlers: Arc<StepRegistry>,
        bus: EventBus,
    ) -> Self {
        Self {
            workflows,
            queue,
            handlers,
            bus,
        }
    }

    /// Create an instance for a dispatched trigger and enqueue its first step.
    pub async fn start_instance(
        &self,
        def: &WorkflowDefinition,
        trigger_type: &str,
        trigger_payload: serde_json::Value,
    ) -> Result<WorkflowInstance, WorkflowError> {
        let context = StepContext::from_trigger(trigger_payload);
        let instance = WorkflowInstance {
            id: Uuid::now_v7(),
            workflow_id: def.id,
            workflow_key: def.key.clone(),
            context: context.into_map(),
            current_step: 0,
            status: InstanceStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
        };
        self.workflows.create_instance(&instance).await?;
        self.bus.publish(QueueEvent::InstanceStarted {
            instance_id: instance.id,
            workflow_key: instance.workflow_key.clone(),
            trigger_type: trigger_type.to_string(),
            at: instance.started_at,
        });
        info!(instance_id = %instance.id, workflow_key = %instance.workflow_key, "workflow instance started");

        self.enqueue_step(&instance.id, 0)
            .await
            .map_err(WorkflowError::Queue)?;
        Ok(instance)
    }

    async fn enqueue_step(&self, instance_id: &Uuid, step_index: u32) -> Result<Job, String> {
        let payload = serde_json::to_value(StepJobPayload {
            instance_id: *instance_id,
            step_index,
        })
        .map_err(|e| e.to_string())?;
        let opts = JobOptions {
            job_id: Some(step_job_id(instance_id, step_index)),
            ..Default::default()
        };
        self.queue
            .enqueue(WORKFLOW_QUEUE, JOB_STEP, payload, opts)
            .await
            .map_err(|e| e.to_string())
    }

    /// Execute one step of one instance.
    ///
    /// The returned failure classifies the step *job*, not the handler:
    /// storage and enqueue hiccups are retryable, while a handler failure
    /// settles into the instance's own state and returns `Ok`.
    pub async fn run_step(&self, instance_id: &Uuid, step_index: u32) -> Result<(), StepFailure> {
        let Some(mut instance) = self
            .workflows
            .get_instance(instance_id)
            .await
            .map_err(retryable)?
        else {
            return Err(StepFailure::Fatal(format!(
                "workflow instance {instance_id} not found"
            )));
        };

        if instance.status.is_terminal() {
            info!(instance_id = %instance.id, status = ?instance.status, "step job for terminal instance ignored");
            return Ok(());
        }

        let def = self
            .workflows
            .get_definition(&instance.workflow_id)
            .await
            .map_err(retryable)?
            .ok_or_else(|| {
                StepFailure::Fatal(format!("workflow definition {} not found", instance.workflow_id))
            })?;

        // A redelivered job for an already-executed step only has to make
        // sure the successor job exists.
        if step_index < instance.current_step {
            if (instance.current_step as usize) < def.steps.len() {
                self.enqueue_step(&instance.id, instance.current_step)
                    .await
                    .map_err(StepFailure::Retryable)?;
            }
            return Ok(());
        }
        if step_index > instance.current_step {
            warn!(
                instance_id = %instance.id,
                step_index, current_step = instance.current_step,
                "step job ahead of instance cursor ignored"
            );
            return Ok(());
        }

        if step_index as usize >= def.steps.len() {
            return self.complete_instance(&mut instance).await;
        }

        let step = def.steps[step_index as usize].clone();
        let mut context = StepContext::from_map(instance.context.clone());

        if let Some(condition) = &step.condition {
            if !context.condition_holds(condition) {
                return self
                    .skip_step(&mut instance, &def, &step, step_index, &context)
                    .await;
            }
        }

        let input = StepInput {
            instance_id: instance.id,
            step_key: step.key.clone(),
            payload: context.merged_input(&step.payload),
        };
        let mut exec = WorkflowStepExecution {
            id: Uuid::now_v7(),
            instance_id: instance.id,
            step_key: step.key.clone(),
            input: input.payload.clone(),
            status: StepExecStatus::Running,
            output: None,
            error: None,
            attempts: 0,
            started_at: Utc::now(),
            finished_at: None,
        };
        self.workflows
            .insert_step_execution(&exec)
            .await
            .map_err(retryable)?;
        self.bus.publish(QueueEvent::StepStarted {
            instance_id: instance.id,
            step_key: step.key.clone(),
            step_index,
            at: exec.started_at,
        });

        match self.attempt_handler(&step, &input).await {
            Ok((output, attempts)) => {
                exec.status = StepExecStatus::Completed;
                exec.output = output.output.clone().or_else(|| Some(output.patch_json()));
                exec.attempts = attempts;
                exec.finished_at = Some(Utc::now());
                self.workflows
                    .update_step_execution(&exec)
                    .await
                    .map_err(retryable)?;

                context.merge(output.patch);
                if let Some(result) = output.output {
                    context.insert(LAST_RESULT, ContextValue::from_json(result));
                }
                instance.context = context.into_map();
                instance.current_step = step_index + 1;
                self.workflows
                    .update_instance(&instance)
                    .await
                    .map_err(retryable)?;
                self.bus.publish(QueueEvent::StepCompleted {
                    instance_id: instance.id,
                    step_key: step.key.clone(),
                    attempts,
                    at: Utc::now(),
                });

                if (instance.current_step as usize) >= def.steps.len() {
                    self.complete_instance(&mut instance).await
                } else {
                    self.enqueue_step(&instance.id, instance.current_step)
                        .await
                        .map_err(StepFailure::Retryable)?;
                    Ok(())
                }
            }
            Err((failure, attempts)) => {
                exec.status = StepExecStatus::Failed;
                exec.error = Some(failure.message().to_string());
                exec.attempts = attempts;
                exec.finished_at = Some(Utc::now());
                self.workflows
                    .update_step_execution(&exec)
                    .await
                    .map_err(retryable)?;
                self.bus.publish(QueueEvent::StepFailed {
                    instance_id: instance.id,
                    step_key: step.key.clone(),
                    attempts,
                    error: failure.message().to_string(),
                    at: Utc::now(),
                });

                self.fail_instance(&mut instance, &step, failure.message())
                    .await
            }
        }
    }

    /// Run the handler under the step's timeout until it succeeds, fails
    /// fatally, or the retry budget is spent.
    async fn attempt_handler(
        &self,
        step: &StepDefinition,
        input: &StepInput,
    ) -> Result<(StepOutput, u32), (StepFailure, u32)> {
        let handler = self.handlers.handler(step.action);
        let total = step.retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = if step.timeout_ms > 0 {
                match tokio::time::timeout(
                    Duration::from_millis(step.timeout_ms),
                    handler.execute(input),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(StepFailure::Retryable(format!(
                        "step timed out after {}ms",
                        step.timeout_ms
                    ))),
                }
            } else {
                handler.execute(input).await
            };

            match outcome {
                Ok(output) => return Ok((output, attempt)),
                Err(failure) if failure.is_fatal() || attempt >= total => {
                    return Err((failure, attempt));
                }
                Err(failure) => {
                    warn!(
                        step_key = %step.key, attempt, error = %failure,
                        "step attempt failed, retrying"
                    );
                    if step.retry_delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(step.retry_delay_ms)).await;
                    }
                }
            }
        }
    }

    async fn skip_step(
        &self,
        instance: &mut WorkflowInstance,
        def: &WorkflowDefinition,
        step: &StepDefinition,
        step_index: u32,
        context: &StepContext,
    ) -> Result<(), StepFailure> {
        let now = Utc::now();
        let exec = WorkflowStepExecution {
            id: Uuid::now_v7(),
            instance_id: instance.id,
            step_key: step.key.clone(),
            input: context.merged_input(&step.payload),
            status: StepExecStatus::Skipped,
            output: None,
            error: None,
            attempts: 0,
            started_at: now,
            finished_at: Some(now),
        };
        self.workflows
            .insert_step_execution(&exec)
            .await
            .map_err(retryable)?;
        self.bus.publish(QueueEvent::StepSkipped {
            instance_id: instance.id,
            step_key: step.key.clone(),
            at: now,
        });

        instance.current_step = step_index + 1;
        self.workflows
            .update_instance(instance)
            .await
            .map_err(retryable)?;

        if (instance.current_step as usize) >= def.steps.len() {
            self.complete_instance(instance).await
        } else {
            self.enqueue_step(&instance.id, instance.current_step)
                .await
                .map_err(StepFailure::Retryable)?;
            Ok(())
        }
    }

    async fn complete_instance(&self, instance: &mut WorkflowInstance) -> Result<(), StepFailure> {
        instance.status = InstanceStatus::Completed;
        instance.completed_at = Some(Utc::now());
        self.workflows
            .update_instance(instance)
            .await
            .map_err(retryable)?;
        self.bus.publish(QueueEvent::InstanceCompleted {
            instance_id: instance.id,
            workflow_key: instance.workflow_key.clone(),
            at: instance.completed_at.unwrap_or_else(Utc::now),
        });
        info!(instance_id = %instance.id, workflow_key = %instance.workflow_key, "workflow instance completed");
        Ok(())
    }

    /// Settle an exhausted step failure into the instance.
    ///
    /// A step with `rollback_to` leaves a rollback marker: the instance is
    /// terminal with its cursor stepped back one from the failed step,
    /// awaiting operator intervention. There is no automatic compensation
    /// replay; the target key only names where an operator should pick up.
    async fn fail_instance(
        &self,
        instance: &mut WorkflowInstance,
        step: &StepDefinition,
        error: &str,
    ) -> Result<(), StepFailure> {
        let rolled_back = if step.rollback_to.is_some() {
            instance.status = InstanceStatus::Rollback;
            // The cursor still sits on the failed step here.
            instance.current_step = instance.current_step.saturating_sub(1);
            true
        } else {
            instance.status = InstanceStatus::Failed;
            false
        };
        instance.completed_at = Some(Utc::now());
        self.workflows
            .update_instance(instance)
            .await
            .map_err(retryable)?;
        self.bus.publish(QueueEvent::InstanceFailed {
            instance_id: instance.id,
            workflow_key: instance.workflow_key.clone(),
            rolled_back,
            error: error.to_string(),
            at: Utc::now(),
        });
        warn!(
            instance_id = %instance.id,
            workflow_key = %instance.workflow_key,
            rolled_back, error,
            "workflow instance failed"
        );
        Ok(())
    }

    pub async fn get_instance(&self, id: &Uuid) -> Result<WorkflowInstance, WorkflowError> {
        self.workflows
            .get_instance(id)
            .await?
            .ok_or(WorkflowError::InstanceNotFound(*id))
    }

    pub async fn list_instances(
        &self,
        workflow_key: Option<&str>,
        status: Option<InstanceStatus>,
        limit: u32,
    ) -> Result<Vec<WorkflowInstance>, WorkflowError> {
        Ok(self.workflows.list_instances(workflow_key, status, limit).await?)
    }

    pub async fn step_executions(
        &self,
        instance_id: &Uuid,
    ) -> Result<Vec<WorkflowStepExecution>, WorkflowError> {
        Ok(self.workflows.list_step_executions(instance_id).await?)
    }
}

fn retryable(e: impl std::fmt::Display) -> StepFailure {
    StepFailure::Retryable(e.to_string())
}

// ---------------------------------------------------------------------------
// Queue processors
// ---------------------------------------------------------------------------

/// Processes `workflow.dispatch` jobs: one instance per job.
pub struct DispatchProcessor<W: WorkflowRepository, J: JobRepository> {
    runner: Arc<WorkflowRunner<W, J>>,
}

impl<W: WorkflowRepository, J: JobRepository> DispatchProcessor<W, J> {
    pub fn new(runner: Arc<WorkflowRunner<W, J>>) -> Self {
        Self { runner }
    }
}

impl<W: WorkflowRepository, J: JobRepository> JobProcessor for DispatchProcessor<W, J> {
    async fn process(&self, job: &Job) -> Result<(), StepFailure> {
        let payload: DispatchJobPayload = serde_json::from_value(job.payload.clone())
            .map_err(|e| StepFailure::Fatal(format!("malformed dispatch payload: {e}")))?;
        let def = self
            .runner
            .workflows
            .get_definition(&payload.workflow_id)
            .await
            .map_err(retryable)?
            .ok_or_else(|| {
                StepFailure::Fatal(format!(
                    "workflow definition {} no longer exists",
                    payload.workflow_id
                ))
            })?;
        self.runner
            .start_instance(&def, &payload.trigger_type, payload.trigger_payload)
            .await
            .map(|_| ())
            .map_err(workflow_failure)
    }
}

/// Processes `workflow.step.execute` jobs.
pub struct StepProcessor<W: WorkflowRepository, J: JobRepository> {
    runner: Arc<WorkflowRunner<W, J>>,
}

impl<W: WorkflowRepository, J: JobRepository> StepProcessor<W, J> {
    pub fn new(runner: Arc<WorkflowRunner<W, J>>) -> Self {
        Self { runner }
    }
}

impl<W: WorkflowRepository, J: JobRepository> JobProcessor for StepProcessor<W, J> {
    async fn process(&self, job: &Job) -> Result<(), StepFailure> {
        let payload: StepJobPayload = serde_json::from_value(job.payload.clone())
            .map_err(|e| StepFailure::Fatal(format!("malformed step payload: {e}")))?;
        self.runner
            .run_step(&payload.instance_id, payload.step_index)
            .await
    }
}

fn workflow_failure(e: WorkflowError) -> StepFailure {
    match e {
        WorkflowError::Storage(_) | WorkflowError::Queue(_) => {
            StepFailure::Retryable(e.to_string())
        }
        other => StepFailure::Fatal(other.to_string()),
    }
}
