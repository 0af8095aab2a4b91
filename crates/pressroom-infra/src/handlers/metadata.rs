//! Metadata suggestion step handler.
//!
//! Deterministic heuristic stand-in for the metadata service: derives a URL
//! slug from the title and tag suggestions from word frequency in the body.
//! Same input always yields the same suggestions, which keeps workflow runs
//! reproducible in tests.

use std::collections::HashMap;

use pressroom_core::registry::{StepHandler, StepInput, StepOutput};
use pressroom_types::error::StepFailure;
use pressroom_types::workflow::ContextValue;

const MAX_TAGS: usize = 5;
const MIN_TAG_LEN: usize = 5;
const DESCRIPTION_LEN: usize = 160;

/// Handler for `StepAction::SuggestMetadata`.
#[derive(Debug, Default, Clone)]
pub struct SuggestMetadataHandler;

impl SuggestMetadataHandler {
    pub fn new() -> Self {
        Self
    }
}

fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_was_hyphen = true;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Most frequent long words, ties broken alphabetically.
fn suggest_tags(body: &str) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for word in body.split(|c: char| !c.is_ascii_alphanumeric()) {
        if word.len() >= MIN_TAG_LEN {
            *counts.entry(word.to_ascii_lowercase()).or_default() += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(MAX_TAGS).map(|(w, _)| w).collect()
}

fn truncate_description(body: &str) -> String {
    let trimmed = body.trim().replace(['\n', '\r'], " ");
    if trimmed.len() <= DESCRIPTION_LEN {
        return trimmed;
    }
    let mut end = DESCRIPTION_LEN;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].trim_end().to_string()
}

impl StepHandler for SuggestMetadataHandler {
    async fn execute(&self, input: &StepInput) -> Result<StepOutput, StepFailure> {
        let title = input
            .payload
            .get("title")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                StepFailure::Fatal("suggest_metadata step requires a 'title' string".to_string())
            })?;
        let body = input
            .payload
            .get("body")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        let tags: Vec<serde_json::Value> = suggest_tags(body)
            .into_iter()
            .map(serde_json::Value::String)
            .collect();

        Ok(StepOutput::empty()
            .with("suggested_slug", ContextValue::Text(slugify(title)))
            .with(
                "suggested_tags",
                ContextValue::Json(serde_json::Value::Array(tags)),
            )
            .with(
                "suggested_description",
                ContextValue::Text(truncate_description(body)),
            ))
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
            step_key: "suggest-metadata".to_string(),
            payload,
        }
    }

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Rust 2024: What's New?  "), "rust-2024-what-s-new");
    }

    #[test]
    fn tags_rank_by_frequency_then_alphabet() {
        let body = "search search search index index queue";
        assert_eq!(suggest_tags(body), vec!["search", "index", "queue"]);
    }

    #[tokio::test]
    async fn suggestions_are_deterministic() {
        let handler = SuggestMetadataHandler::new();
        let payload = json!({
            "title": "Scaling the Publishing Pipeline",
            "body": "Our publishing pipeline handles thousands of articles. \
                     Publishing reliably means the pipeline must retry."
        });

        let first = handler.execute(&input(payload.clone())).await.unwrap();
        let second = handler.execute(&input(payload)).await.unwrap();
        assert_eq!(first.patch_json(), second.patch_json());
        assert_eq!(
            first.patch.get("suggested_slug").and_then(|v| v.as_text()),
            Some("scaling-the-publishing-pipeline")
        );
    }

    #[tokio::test]
    async fn missing_title_is_fatal() {
        let handler = SuggestMetadataHandler::new();
        let err = handler
            .execute(&input(json!({"body": "text"})))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn description_truncates_on_char_boundary() {
        let body = "é".repeat(200);
        let desc = truncate_description(&body);
        assert!(desc.len() <= DESCRIPTION_LEN);
        assert!(desc.chars().all(|c| c == 'é'));
    }
}
