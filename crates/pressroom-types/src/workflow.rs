//! Workflow domain types for Pressroom.
//!
//! Defines the canonical representation for workflow definitions: YAML files
//! (`pressd apply -f`) and the REST API both convert to and from these
//! structs. Also contains execution tracking types (`WorkflowInstance`,
//! `WorkflowStepExecution`) and trigger descriptors.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Context values
// ---------------------------------------------------------------------------

/// A single value in a workflow instance's context.
///
/// The context is a typed key/value accumulator threaded through steps.
/// Scalars get their own variants so step handlers and `if` predicates can
/// compare them without JSON shape guessing; anything structured falls
/// through to `Json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Json(serde_json::Value),
}

impl ContextValue {
    /// Convert a raw JSON value into the closest typed variant.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Bool(b) => ContextValue::Bool(b),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(ContextValue::Number)
                .unwrap_or(ContextValue::Json(serde_json::Value::Number(n))),
            serde_json::Value::String(s) => ContextValue::Text(s),
            other => ContextValue::Json(other),
        }
    }

    /// Render as a JSON value (lossless for all variants).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ContextValue::Bool(b) => serde_json::Value::Bool(*b),
            ContextValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ContextValue::Text(s) => serde_json::Value::String(s.clone()),
            ContextValue::Json(v) => v.clone(),
        }
    }

    /// The text content, if this is a `Text` value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContextValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for ContextValue {
    fn from(s: &str) -> Self {
        ContextValue::Text(s.to_string())
    }
}

impl From<bool> for ContextValue {
    fn from(b: bool) -> Self {
        ContextValue::Bool(b)
    }
}

impl From<f64> for ContextValue {
    fn from(n: f64) -> Self {
        ContextValue::Number(n)
    }
}

// ---------------------------------------------------------------------------
// Step definition
// ---------------------------------------------------------------------------

/// The closed set of step actions the engine can execute.
///
/// Each variant maps to exactly one registered handler; there is no runtime
/// string lookup, so "unknown action" is not a representable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    /// Create an in-app/editorial notification.
    Notify,
    /// Ask the metadata service for SEO/tag suggestions.
    SuggestMetadata,
    /// Re-index the affected content in the search backend.
    ReindexSearch,
    /// Generic outbound dispatch (webhooks, social share).
    Dispatch,
}

impl StepAction {
    /// Stable lowercase name used in logs and events.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepAction::Notify => "notify",
            StepAction::SuggestMetadata => "suggest_metadata",
            StepAction::ReindexSearch => "reindex_search",
            StepAction::Dispatch => "dispatch",
        }
    }
}

/// Equality predicate gating a step's execution.
///
/// `left` is resolved by key lookup in the instance context; `right` is a
/// literal. When the predicate is false the step is skipped, not failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepCondition {
    /// Context key to look up.
    pub left: String,
    /// Literal to compare against.
    pub right: ContextValue,
}

/// A single step in a workflow definition.
///
/// Never mutated after the definition version is saved; edits create a new
/// version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    /// User-defined step key (e.g. "notify-editors"). Unique within a definition.
    pub key: String,
    /// Which handler executes this step.
    pub action: StepAction,
    /// Input overrides merged over the instance context (overrides win).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub payload: HashMap<String, ContextValue>,
    /// Step timeout in milliseconds. 0 disables the timeout race.
    #[serde(default)]
    pub timeout_ms: u64,
    /// Additional attempts after the first failure (`retries = 2` means 3 tries).
    #[serde(default)]
    pub retries: u32,
    /// Delay between in-step retry attempts.
    #[serde(default)]
    pub retry_delay_ms: u64,
    /// Optional skip predicate evaluated against the context.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "if")]
    pub condition: Option<StepCondition>,
    /// Step key to mark as the rollback position on exhausted failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_to: Option<String>,
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

/// A business trigger a definition subscribes to.
///
/// Matching is an exact type match (e.g. "article.submitted_for_review");
/// there is no wildcard matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerDescriptor {
    /// Trigger type string matched against dispatched events.
    #[serde(rename = "type")]
    pub trigger_type: String,
}

impl TriggerDescriptor {
    pub fn new(trigger_type: impl Into<String>) -> Self {
        Self {
            trigger_type: trigger_type.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow definition
// ---------------------------------------------------------------------------

/// One immutable version of a workflow definition.
///
/// `key` is stable across versions; `id` identifies this version. At most
/// one version per key is active at a time; activating a new version
/// deactivates prior ones (append-only history).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// UUIDv7 assigned when this version is saved.
    pub id: Uuid,
    /// Stable identifier shared across versions (e.g. "article-review").
    pub key: String,
    /// Monotonically increasing version number per key, starting at 1.
    pub version: u32,
    /// Human-readable workflow name.
    pub name: String,
    /// Business triggers that start this workflow.
    #[serde(default)]
    pub triggers: Vec<TriggerDescriptor>,
    /// Ordered steps executed sequentially per instance.
    pub steps: Vec<StepDefinition>,
    /// Whether this version receives new dispatches.
    pub is_active: bool,
    /// Owning workspace, or None for a platform-global workflow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<Uuid>,
    /// When this version was created.
    pub created_at: DateTime<Utc>,
}

/// Author-facing workflow shape (no version bookkeeping).
///
/// This is what `pressd apply -f workflow.yaml` and `POST /workflows`
/// accept; the definition service assigns id/version/activation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub triggers: Vec<TriggerDescriptor>,
    pub steps: Vec<StepDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<Uuid>,
}

// ---------------------------------------------------------------------------
// Workflow instance
// ---------------------------------------------------------------------------

/// Overall status of a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Running,
    Completed,
    Failed,
    /// Exhausted failure on a step that declared `rollback_to`. A marker for
    /// operator intervention, not an automatic compensation replay.
    Rollback,
}

impl InstanceStatus {
    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, InstanceStatus::Running)
    }
}

/// One triggered run of a workflow definition version.
///
/// Created at dispatch, mutated only by the runner processing it, terminal
/// once completed/failed/rollback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstance {
    /// UUIDv7 instance ID.
    pub id: Uuid,
    /// The definition version being executed.
    pub workflow_id: Uuid,
    /// Definition key (denormalized for display and events).
    pub workflow_key: String,
    /// Accumulated typed context threaded through steps.
    pub context: HashMap<String, ContextValue>,
    /// Index of the step being (or about to be) executed.
    pub current_step: u32,
    pub status: InstanceStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Step execution audit trail
// ---------------------------------------------------------------------------

/// Status of a single attempted step within an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepExecStatus {
    Running,
    Completed,
    Skipped,
    Failed,
}

/// Append-only audit row for one step of one instance.
///
/// A step retried internally yields a single row whose final status reflects
/// the last attempt; `attempts` records the total tries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStepExecution {
    /// UUIDv7 execution ID.
    pub id: Uuid,
    /// Parent instance.
    pub instance_id: Uuid,
    /// Step key matching `StepDefinition.key`.
    pub step_key: String,
    /// Snapshot of the merged input the handler received.
    pub input: serde_json::Value,
    pub status: StepExecStatus,
    /// Handler output, when the step completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    /// Final error message, when the step failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Total handler invocations (1 + retries actually used).
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_definition() -> WorkflowDefinition {
        WorkflowDefinition {
            id: Uuid::now_v7(),
            key: "article-review".to_string(),
            version: 1,
            name: "Article review".to_string(),
            triggers: vec![TriggerDescriptor::new("article.submitted_for_review")],
            steps: vec![
                StepDefinition {
                    key: "notify-editors".to_string(),
                    action: StepAction::Notify,
                    payload: HashMap::from([(
                        "channel".to_string(),
                        ContextValue::from("editorial"),
                    )]),
                    timeout_ms: 5_000,
                    retries: 2,
                    retry_delay_ms: 250,
                    condition: None,
                    rollback_to: None,
                },
                StepDefinition {
                    key: "suggest-metadata".to_string(),
                    action: StepAction::SuggestMetadata,
                    payload: HashMap::new(),
                    timeout_ms: 0,
                    retries: 0,
                    retry_delay_ms: 0,
                    condition: Some(StepCondition {
                        left: "needs_metadata".to_string(),
                        right: ContextValue::Bool(true),
                    }),
                    rollback_to: Some("notify-editors".to_string()),
                },
            ],
            is_active: true,
            workspace_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn definition_json_roundtrip() {
        let original = sample_definition();
        let json_str = serde_json::to_string_pretty(&original).unwrap();
        let parsed: WorkflowDefinition = serde_json::from_str(&json_str).unwrap();
        assert_eq!(parsed.key, "article-review");
        assert_eq!(parsed.steps.len(), 2);
        assert_eq!(parsed.steps[0].action, StepAction::Notify);
        assert_eq!(parsed.steps[1].rollback_to.as_deref(), Some("notify-editors"));
    }

    #[test]
    fn spec_yaml_parse() {
        let yaml = r#"
key: article-review
name: Article review
triggers:
  - type: article.submitted_for_review
steps:
  - key: notify-editors
    action: notify
    timeout_ms: 5000
    retries: 2
    retry_delay_ms: 250
  - key: reindex
    action: reindex_search
    if:
      left: published
      right: true
"#;
        let spec: WorkflowSpec = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(spec.key, "article-review");
        assert_eq!(spec.triggers.len(), 1);
        assert_eq!(spec.steps[1].action, StepAction::ReindexSearch);
        let cond = spec.steps[1].condition.as_ref().unwrap();
        assert_eq!(cond.left, "published");
        assert_eq!(cond.right, ContextValue::Bool(true));
    }

    #[test]
    fn step_defaults_from_minimal_yaml() {
        let yaml = "key: s1\naction: dispatch\n";
        let step: StepDefinition = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(step.timeout_ms, 0);
        assert_eq!(step.retries, 0);
        assert!(step.payload.is_empty());
        assert!(step.condition.is_none());
    }

    #[test]
    fn context_value_untagged_serde() {
        let cases = vec![
            (ContextValue::Bool(true), json!(true)),
            (ContextValue::Number(3.5), json!(3.5)),
            (ContextValue::Text("hi".to_string()), json!("hi")),
            (ContextValue::Json(json!({"a": 1})), json!({"a": 1})),
        ];
        for (value, expected) in cases {
            let encoded = serde_json::to_value(&value).unwrap();
            assert_eq!(encoded, expected);
            let decoded: ContextValue = serde_json::from_value(encoded).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn context_value_from_json_picks_scalar_variants() {
        assert_eq!(ContextValue::from_json(json!(true)), ContextValue::Bool(true));
        assert_eq!(ContextValue::from_json(json!(2)), ContextValue::Number(2.0));
        assert_eq!(
            ContextValue::from_json(json!("x")),
            ContextValue::Text("x".to_string())
        );
        assert_eq!(
            ContextValue::from_json(json!([1, 2])),
            ContextValue::Json(json!([1, 2]))
        );
    }

    #[test]
    fn instance_status_terminality() {
        assert!(!InstanceStatus::Running.is_terminal());
        assert!(InstanceStatus::Completed.is_terminal());
        assert!(InstanceStatus::Failed.is_terminal());
        assert!(InstanceStatus::Rollback.is_terminal());
    }

    #[test]
    fn step_action_names() {
        assert_eq!(StepAction::Notify.as_str(), "notify");
        assert_eq!(StepAction::SuggestMetadata.as_str(), "suggest_metadata");
        assert_eq!(StepAction::ReindexSearch.as_str(), "reindex_search");
        assert_eq!(StepAction::Dispatch.as_str(), "dispatch");
        let parsed: StepAction = serde_json::from_str("\"reindex_search\"").unwrap();
        assert_eq!(parsed, StepAction::ReindexSearch);
    }

    #[test]
    fn step_execution_json_roundtrip() {
        let exec = WorkflowStepExecution {
            id: Uuid::now_v7(),
            instance_id: Uuid::now_v7(),
            step_key: "notify-editors".to_string(),
            input: json!({"channel": "editorial"}),
            status: StepExecStatus::Completed,
            output: Some(json!({"notification_id": "n-1"})),
            error: None,
            attempts: 1,
            started_at: Utc::now(),
            finished_at: Some(Utc::now()),
        };
        let encoded = serde_json::to_string(&exec).unwrap();
        let decoded: WorkflowStepExecution = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.status, StepExecStatus::Completed);
        assert_eq!(decoded.attempts, 1);
    }
}
