//! Notification step handler.
//!
//! Creates an editorial notification and broadcasts it on a dedicated
//! channel so live subscribers (the WebSocket surface, tests) receive it.
//! Delivery is fire-and-forget; a notification with no subscribers is
//! dropped, not an error.

use chrono::{DateTime, Utc};
use pressroom_core::registry::{StepHandler, StepInput, StepOutput};
use pressroom_types::error::StepFailure;
use pressroom_types::workflow::ContextValue;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// An in-app notification produced by a `notify` step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    /// Audience channel, e.g. "editorial".
    pub channel: String,
    pub message: String,
    pub instance_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Handler for `StepAction::Notify`.
#[derive(Clone)]
pub struct NotifyHandler {
    sender: broadcast::Sender<Notification>,
}

impl NotifyHandler {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

impl StepHandler for NotifyHandler {
    async fn execute(&self, input: &StepInput) -> Result<StepOutput, StepFailure> {
        let channel = input
            .payload
            .get("channel")
            .and_then(|v| v.as_str())
            .unwrap_or("general")
            .to_string();
        let message = input
            .payload
            .get("message")
            .and_then(|v| v.as_str())
            .ok_or_else(|| StepFailure::Fatal("notify step requires a 'message' string".to_string()))?
            .to_string();

        let notification = Notification {
            id: Uuid::now_v7(),
            channel: channel.clone(),
            message,
            instance_id: input.instance_id,
            created_at: Utc::now(),
        };
        let id = notification.id;

        tracing::info!(channel = %channel, notification_id = %id, "notification created");
        let _ = self.sender.send(notification);

        Ok(StepOutput::empty()
            .with_output(serde_json::json!({"notification_id": id, "channel": channel}))
            .with("notification_id", ContextValue::Text(id.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(payload: serde_json::Value) -> StepInput {
        StepInput {
            instance_id: Uuid::now_v7(),
            step_key: "notify-editors".to_string(),
            payload,
        }
    }

    #[tokio::test]
    async fn broadcasts_and_patches_notification_id() {
        let handler = NotifyHandler::new(16);
        let mut rx = handler.subscribe();

        let output = handler
            .execute(&input(json!({"channel": "editorial", "message": "review needed"})))
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.channel, "editorial");
        assert_eq!(received.message, "review needed");
        assert_eq!(
            output.patch.get("notification_id").and_then(|v| v.as_text()),
            Some(received.id.to_string().as_str())
        );
    }

    #[tokio::test]
    async fn missing_message_is_fatal() {
        let handler = NotifyHandler::new(16);
        let err = handler
            .execute(&input(json!({"channel": "editorial"})))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn no_subscribers_is_not_an_error() {
        let handler = NotifyHandler::new(16);
        assert!(handler
            .execute(&input(json!({"message": "hello"})))
            .await
            .is_ok());
    }
}
