//! Outbound dispatch step handler.
//!
//! POSTs the step payload as JSON to a target URL (webhooks, social share
//! integrations). When a signing secret is configured the body is signed
//! with HMAC-SHA256 and the base64 digest sent in `X-Pressroom-Signature`
//! so receivers can verify authenticity.
//!
//! Failure classification: 4xx responses are fatal (the request will never
//! succeed as-is), 5xx and transport errors are retryable.

use std::time::Duration;

use base64::Engine;
use hmac::{Hmac, Mac};
use pressroom_core::registry::{StepHandler, StepInput, StepOutput};
use pressroom_types::error::StepFailure;
use pressroom_types::workflow::ContextValue;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Pressroom-Signature";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Handler for `StepAction::Dispatch`.
#[derive(Debug, Clone)]
pub struct DispatchHandler {
    client: reqwest::Client,
    secret: Option<String>,
}

impl DispatchHandler {
    pub fn new(secret: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client, secret }
    }
}

/// Base64 HMAC-SHA256 digest of the request body.
pub fn sign_body(secret: &[u8], body: &[u8]) -> Result<String, StepFailure> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| StepFailure::Fatal(format!("invalid dispatch secret: {e}")))?;
    mac.update(body);
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

impl StepHandler for DispatchHandler {
    async fn execute(&self, input: &StepInput) -> Result<StepOutput, StepFailure> {
        let url = input
            .payload
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| StepFailure::Fatal("dispatch step requires a 'url' string".to_string()))?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(StepFailure::Fatal(format!("dispatch url must be http(s): {url}")));
        }

        let body = serde_json::to_vec(&input.payload)
            .map_err(|e| StepFailure::Fatal(format!("serialize dispatch body: {e}")))?;

        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, sign_body(secret.as_bytes(), &body)?);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| StepFailure::Retryable(format!("dispatch to {url} failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(url = %url, status = %status, "dispatch delivered");
            Ok(StepOutput::empty()
                .with("dispatch_status", ContextValue::Number(status.as_u16() as f64)))
        } else if status.is_client_error() {
            Err(StepFailure::Fatal(format!("dispatch to {url} rejected: {status}")))
        } else {
            Err(StepFailure::Retryable(format!("dispatch to {url} returned {status}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn input(payload: serde_json::Value) -> StepInput {
        StepInput {
            instance_id: Uuid::now_v7(),
            step_key: "share".to_string(),
            payload,
        }
    }

    #[test]
    fn signature_is_stable_and_secret_dependent() {
        let body = br#"{"article_id":"42"}"#;
        let a = sign_body(b"secret-a", body).unwrap();
        let b = sign_body(b"secret-a", body).unwrap();
        let c = sign_body(b"secret-b", body).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(base64::engine::general_purpose::STANDARD.decode(&a).is_ok());
    }

    #[tokio::test]
    async fn missing_url_is_fatal() {
        let handler = DispatchHandler::new(None);
        let err = handler
            .execute(&input(json!({"article_id": "42"})))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn non_http_url_is_fatal() {
        let handler = DispatchHandler::new(None);
        let err = handler
            .execute(&input(json!({"url": "ftp://example.com/hook"})))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn unreachable_host_is_retryable() {
        let handler = DispatchHandler::new(Some("secret".to_string()));
        // Nothing listens on port 1, so the connection is refused immediately.
        let err = handler
            .execute(&input(json!({"url": "http://127.0.0.1:1/hook"})))
            .await
            .unwrap_err();
        assert!(!err.is_fatal());
    }
}
