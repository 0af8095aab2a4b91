//! Search re-index step handler.
//!
//! Filesystem-index stand-in for the search backend: each document is one
//! JSON file named by content id under the index directory. Re-indexing the
//! same id overwrites the previous document, so the handler is idempotent
//! across retries and redeliveries.

use std::path::PathBuf;

use chrono::Utc;
use pressroom_core::registry::{StepHandler, StepInput, StepOutput};
use pressroom_types::error::StepFailure;
use pressroom_types::workflow::ContextValue;

/// Handler for `StepAction::ReindexSearch`.
#[derive(Debug, Clone)]
pub struct ReindexSearchHandler {
    index_dir: PathBuf,
}

impl ReindexSearchHandler {
    pub fn new(index_dir: PathBuf) -> Self {
        Self { index_dir }
    }
}

/// Content ids become filenames; anything outside a conservative character
/// set is rejected rather than escaped.
fn safe_doc_name(content_id: &str) -> Option<String> {
    if content_id.is_empty() || content_id.len() > 128 {
        return None;
    }
    if content_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !content_id.starts_with('.')
    {
        Some(format!("{content_id}.json"))
    } else {
        None
    }
}

impl StepHandler for ReindexSearchHandler {
    async fn execute(&self, input: &StepInput) -> Result<StepOutput, StepFailure> {
        let content_id = input
            .payload
            .get("content_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                StepFailure::Fatal("reindex_search step requires a 'content_id' string".to_string())
            })?;
        let doc_name = safe_doc_name(content_id)
            .ok_or_else(|| StepFailure::Fatal(format!("invalid content_id '{content_id}'")))?;

        let document = serde_json::json!({
            "content_id": content_id,
            "fields": input.payload,
            "indexed_at": Utc::now(),
        });
        let body = serde_json::to_vec_pretty(&document)
            .map_err(|e| StepFailure::Fatal(format!("serialize index document: {e}")))?;

        tokio::fs::create_dir_all(&self.index_dir)
            .await
            .map_err(|e| StepFailure::Retryable(format!("create index dir: {e}")))?;
        tokio::fs::write(self.index_dir.join(&doc_name), body)
            .await
            .map_err(|e| StepFailure::Retryable(format!("write index document: {e}")))?;

        tracing::debug!(content_id = %content_id, "search document reindexed");
        Ok(StepOutput::empty().with("reindexed", ContextValue::Bool(true)))
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
            step_key: "reindex".to_string(),
            payload,
        }
    }

    #[tokio::test]
    async fn writes_one_document_per_content_id() {
        let dir = tempfile::tempdir().unwrap();
        let handler = ReindexSearchHandler::new(dir.path().to_path_buf());

        let output = handler
            .execute(&input(json!({"content_id": "article-42", "title": "Hello"})))
            .await
            .unwrap();
        assert_eq!(output.patch.get("reindexed"), Some(&ContextValue::Bool(true)));

        let raw = tokio::fs::read_to_string(dir.path().join("article-42.json"))
            .await
            .unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc["content_id"], "article-42");
        assert_eq!(doc["fields"]["title"], "Hello");
    }

    #[tokio::test]
    async fn reindex_overwrites_existing_document() {
        let dir = tempfile::tempdir().unwrap();
        let handler = ReindexSearchHandler::new(dir.path().to_path_buf());

        handler
            .execute(&input(json!({"content_id": "a1", "title": "v1"})))
            .await
            .unwrap();
        handler
            .execute(&input(json!({"content_id": "a1", "title": "v2"})))
            .await
            .unwrap();

        let raw = tokio::fs::read_to_string(dir.path().join("a1.json")).await.unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc["fields"]["title"], "v2");
    }

    #[tokio::test]
    async fn missing_or_unsafe_content_id_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let handler = ReindexSearchHandler::new(dir.path().to_path_buf());

        assert!(handler.execute(&input(json!({}))).await.unwrap_err().is_fatal());
        assert!(handler
            .execute(&input(json!({"content_id": "../escape"})))
            .await
            .unwrap_err()
            .is_fatal());
    }
}
