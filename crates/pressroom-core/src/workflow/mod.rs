//! Workflow engine: definitions, trigger dispatch, and the step runner.
//!
//! Workflow execution rides on the job queue. A business trigger fans out
//! into one `workflow.dispatch` job per subscribed definition; processing a
//! dispatch job creates an instance and enqueues its first step job; each
//! step job runs one step and enqueues the next. Step jobs use
//! deterministic ids so queue idempotency absorbs redeliveries.

pub mod context;
pub mod definition;
pub mod dispatcher;
pub mod runner;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use context::StepContext;
pub use definition::DefinitionService;
pub use dispatcher::{TriggerDispatcher, MANUAL_TRIGGER};
pub use runner::{DispatchProcessor, StepProcessor, WorkflowRunner};

/// Queue that carries the engine's own jobs.
pub const WORKFLOW_QUEUE: &str = "workflows";

/// Job that fans a trigger out to one definition.
pub const JOB_DISPATCH: &str = "workflow.dispatch";

/// Job that executes one step of one instance.
pub const JOB_STEP: &str = "workflow.step.execute";

/// Payload of a `workflow.dispatch` job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DispatchJobPayload {
    /// Definition version to instantiate.
    pub workflow_id: Uuid,
    pub trigger_type: String,
    /// Business payload of the trigger; becomes the initial context.
    pub trigger_payload: serde_json::Value,
}

/// Payload of a `workflow.step.execute` job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepJobPayload {
    pub instance_id: Uuid,
    pub step_index: u32,
}

/// Deterministic id for a step job. One instance runs its steps in order,
/// so a redelivered or re-enqueued step job dedups against this key.
pub fn step_job_id(instance_id: &Uuid, step_index: u32) -> String {
    format!("wf:{instance_id}:step:{step_index}")
}

/// Register the engine's own job payloads with a schema registry.
pub fn register_engine_schemas(
    registry: crate::queue::SchemaRegistry,
) -> crate::queue::SchemaRegistry {
    registry
        .register::<DispatchJobPayload>(JOB_DISPATCH)
        .register::<StepJobPayload>(JOB_STEP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_job_ids_are_deterministic() {
        let instance = Uuid::now_v7();
        assert_eq!(step_job_id(&instance, 3), step_job_id(&instance, 3));
        assert_ne!(step_job_id(&instance, 3), step_job_id(&instance, 4));
        assert!(step_job_id(&instance, 0).starts_with("wf:"));
    }

    #[test]
    fn engine_schemas_validate_payloads() {
        let registry = register_engine_schemas(crate::queue::SchemaRegistry::new());
        let payload = serde_json::to_value(StepJobPayload {
            instance_id: Uuid::now_v7(),
            step_index: 0,
        })
        .unwrap();
        assert!(registry.validate(JOB_STEP, &payload).is_ok());
        assert!(registry.validate(JOB_STEP, &serde_json::json!({"bad": 1})).is_err());
    }
}
