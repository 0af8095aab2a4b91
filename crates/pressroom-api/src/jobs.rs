//! Built-in standalone job types served by the `pressd` daemon.
//!
//! Workflow steps already reach the infra step handlers through the runner;
//! these job names expose the same handlers to direct enqueue callers
//! (webhook delivery, editorial broadcasts) without a workflow definition.

use pressroom_core::queue::SchemaRegistry;
use pressroom_core::registry::{BoxStepHandler, JobProcessor, StepInput};
use pressroom_types::error::StepFailure;
use pressroom_types::job::Job;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Deliver a signed POST to an external URL.
pub const JOB_WEBHOOK_DELIVER: &str = "webhook.deliver";
/// Broadcast an editorial notification.
pub const JOB_NOTIFY_BROADCAST: &str = "notify.broadcast";

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct WebhookDeliverPayload {
    /// Target URL, http or https.
    pub url: String,
    /// Extra fields forwarded in the request body.
    #[serde(default, flatten)]
    pub body: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct NotifyBroadcastPayload {
    /// Audience channel, defaults to "general".
    #[serde(default)]
    pub channel: Option<String>,
    pub message: String,
}

/// Register the built-in job payload schemas.
pub fn register_builtin_schemas(registry: SchemaRegistry) -> SchemaRegistry {
    registry
        .register::<WebhookDeliverPayload>(JOB_WEBHOOK_DELIVER)
        .register::<NotifyBroadcastPayload>(JOB_NOTIFY_BROADCAST)
}

/// Adapter running a step handler as a standalone job processor.
///
/// The handler receives a synthetic instance id as a correlation key; its
/// context patch is discarded since there is no instance to merge into.
pub struct HandlerJobProcessor {
    handler: BoxStepHandler,
}

impl HandlerJobProcessor {
    pub fn new(handler: BoxStepHandler) -> Self {
        Self { handler }
    }
}

impl JobProcessor for HandlerJobProcessor {
    async fn process(&self, job: &Job) -> Result<(), StepFailure> {
        let input = StepInput {
            instance_id: Uuid::now_v7(),
            step_key: job.name.clone(),
            payload: job.payload.clone(),
        };
        self.handler.execute(&input).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pressroom_core::registry::StepHandler;
    use pressroom_core::workflow::register_engine_schemas;
    use serde_json::json;

    #[test]
    fn builtin_schemas_validate_payloads() {
        let registry = register_builtin_schemas(register_engine_schemas(SchemaRegistry::new()));

        assert!(registry
            .validate(
                JOB_WEBHOOK_DELIVER,
                &json!({"url": "https://example.com/hook", "article_id": "42"})
            )
            .is_ok());
        assert!(registry
            .validate(JOB_WEBHOOK_DELIVER, &json!({"article_id": "42"}))
            .is_err());
        assert!(registry
            .validate(JOB_NOTIFY_BROADCAST, &json!({"message": "hi"}))
            .is_ok());
        assert!(registry.validate("unregistered.job", &json!({})).is_err());
    }

    struct CaptureKey;

    impl StepHandler for CaptureKey {
        async fn execute(
            &self,
            input: &StepInput,
        ) -> Result<pressroom_core::registry::StepOutput, StepFailure> {
            if input.step_key == "webhook.deliver" {
                Ok(pressroom_core::registry::StepOutput::empty())
            } else {
                Err(StepFailure::Fatal("unexpected step key".to_string()))
            }
        }
    }

    #[tokio::test]
    async fn adapter_passes_job_name_and_payload() {
        let processor = HandlerJobProcessor::new(BoxStepHandler::new(CaptureKey));
        let job = Job {
            id: "j1".to_string(),
            queue: "delivery".to_string(),
            name: JOB_WEBHOOK_DELIVER.to_string(),
            payload: json!({"url": "https://example.com"}),
            attempts: 3,
            backoff: Default::default(),
            priority: 0,
            run_at: chrono::Utc::now(),
            state: pressroom_types::job::JobState::Pending,
            attempts_made: 0,
            replay_count: 0,
            last_error: None,
            locked_at: None,
            created_at: chrono::Utc::now(),
            finished_at: None,
        };
        assert!(processor.process(&job).await.is_ok());
    }
}
