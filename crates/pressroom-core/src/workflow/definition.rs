//! Workflow definition parsing, validation, and versioning.
//!
//! Definitions are append-only: applying a spec saves a new version and
//! deactivates the previous one. Validation runs before anything is stored,
//! so a saved definition is guaranteed structurally sound.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use pressroom_types::error::WorkflowError;
use pressroom_types::workflow::{WorkflowDefinition, WorkflowSpec};
use uuid::Uuid;

use crate::repository::WorkflowRepository;

/// Parse a YAML string into a validated `WorkflowSpec`.
pub fn parse_spec_yaml(yaml: &str) -> Result<WorkflowSpec, WorkflowError> {
    let spec: WorkflowSpec = serde_yaml_ng::from_str(yaml)
        .map_err(|e| WorkflowError::InvalidDefinition(format!("parse error: {e}")))?;
    validate_spec(&spec)?;
    Ok(spec)
}

/// Validate structural constraints on a `WorkflowSpec`.
///
/// Checks:
/// - Key is non-empty and contains only lowercase alphanumerics and hyphens
/// - At least one step exists
/// - All step keys are unique
/// - `rollback_to` references an earlier step in the sequence
/// - Condition keys are non-empty
pub fn validate_spec(spec: &WorkflowSpec) -> Result<(), WorkflowError> {
    if spec.key.is_empty() {
        return Err(WorkflowError::InvalidDefinition(
            "workflow key must not be empty".to_string(),
        ));
    }
    if !spec
        .key
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(WorkflowError::InvalidDefinition(format!(
            "workflow key '{}' contains invalid characters (lowercase alphanumerics and hyphens only)",
            spec.key
        )));
    }
    if spec.steps.is_empty() {
        return Err(WorkflowError::InvalidDefinition(
            "workflow must have at least one step".to_string(),
        ));
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for step in &spec.steps {
        if step.key.is_empty() {
            return Err(WorkflowError::InvalidDefinition(
                "step key must not be empty".to_string(),
            ));
        }
        if !seen.insert(step.key.as_str()) {
            return Err(WorkflowError::InvalidDefinition(format!(
                "duplicate step key '{}'",
                step.key
            )));
        }
    }

    for (index, step) in spec.steps.iter().enumerate() {
        if let Some(target) = &step.rollback_to {
            let earlier = spec.steps[..index].iter().any(|s| &s.key == target);
            if !earlier {
                return Err(WorkflowError::InvalidDefinition(format!(
                    "step '{}' rollback target '{}' must be an earlier step",
                    step.key, target
                )));
            }
        }
        if let Some(condition) = &step.condition {
            if condition.left.is_empty() {
                return Err(WorkflowError::InvalidDefinition(format!(
                    "step '{}' condition key must not be empty",
                    step.key
                )));
            }
        }
    }
    Ok(())
}

/// Versioned definition store.
pub struct DefinitionService<W: WorkflowRepository> {
    repo: Arc<W>,
}

impl<W: WorkflowRepository> DefinitionService<W> {
    pub fn new(repo: Arc<W>) -> Self {
        Self { repo }
    }

    /// Save a spec as the next active version of its key.
    pub async fn apply(&self, spec: WorkflowSpec) -> Result<WorkflowDefinition, WorkflowError> {
        validate_spec(&spec)?;
        let version = self.repo.latest_version(&spec.key).await?.unwrap_or(0) + 1;
        let def = WorkflowDefinition {
            id: Uuid::now_v7(),
            key: spec.key,
            version,
            name: spec.name,
            triggers: spec.triggers,
            steps: spec.steps,
            is_active: true,
            workspace_id: spec.workspace_id,
            created_at: Utc::now(),
        };
        self.repo.save_definition(&def).await?;
        tracing::info!(key = %def.key, version = def.version, "workflow definition applied");
        Ok(def)
    }

    pub async fn get(&self, id: &Uuid) -> Result<WorkflowDefinition, WorkflowError> {
        self.repo
            .get_definition(id)
            .await?
            .ok_or_else(|| WorkflowError::DefinitionNotFound(id.to_string()))
    }

    pub async fn get_active(&self, key: &str) -> Result<WorkflowDefinition, WorkflowError> {
        self.repo
            .get_active_definition(key)
            .await?
            .ok_or_else(|| WorkflowError::DefinitionNotFound(key.to_string()))
    }

    pub async fn list(&self, active_only: bool) -> Result<Vec<WorkflowDefinition>, WorkflowError> {
        Ok(self.repo.list_definitions(active_only).await?)
    }

    /// Deactivate a version so it receives no new dispatches. Running
    /// instances keep their pinned version.
    pub async fn deactivate(&self, id: &Uuid) -> Result<(), WorkflowError> {
        if !self.repo.deactivate_definition(id).await? {
            return Err(WorkflowError::DefinitionNotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::InMemoryWorkflows;
    use pressroom_types::workflow::{StepAction, StepDefinition, TriggerDescriptor};
    use std::collections::HashMap;

    fn step(key: &str, action: StepAction) -> StepDefinition {
        StepDefinition {
            key: key.to_string(),
            action,
            payload: HashMap::new(),
            timeout_ms: 0,
            retries: 0,
            retry_delay_ms: 0,
            condition: None,
            rollback_to: None,
        }
    }

    fn spec() -> WorkflowSpec {
        WorkflowSpec {
            key: "article-review".to_string(),
            name: "Article review".to_string(),
            triggers: vec![TriggerDescriptor::new("article.submitted_for_review")],
            steps: vec![step("notify", StepAction::Notify), step("reindex", StepAction::ReindexSearch)],
            workspace_id: None,
        }
    }

    #[test]
    fn valid_spec_passes() {
        assert!(validate_spec(&spec()).is_ok());
    }

    #[test]
    fn empty_steps_rejected() {
        let mut s = spec();
        s.steps.clear();
        assert!(validate_spec(&s).is_err());
    }

    #[test]
    fn duplicate_step_keys_rejected() {
        let mut s = spec();
        s.steps.push(step("notify", StepAction::Dispatch));
        let err = validate_spec(&s).unwrap_err();
        assert!(err.to_string().contains("duplicate step key"));
    }

    #[test]
    fn rollback_must_point_backwards() {
        let mut s = spec();
        s.steps[0].rollback_to = Some("reindex".to_string());
        assert!(validate_spec(&s).is_err());

        let mut s = spec();
        s.steps[1].rollback_to = Some("notify".to_string());
        assert!(validate_spec(&s).is_ok());
    }

    #[test]
    fn bad_key_rejected() {
        let mut s = spec();
        s.key = "Article Review!".to_string();
        assert!(validate_spec(&s).is_err());
    }

    #[test]
    fn yaml_parse_validates() {
        let err = parse_spec_yaml("key: x\nname: X\nsteps: []\n").unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidDefinition(_)));
    }

    #[tokio::test]
    async fn apply_assigns_increasing_versions_and_single_active() {
        let repo = Arc::new(InMemoryWorkflows::default());
        let svc = DefinitionService::new(repo.clone());

        let v1 = svc.apply(spec()).await.unwrap();
        assert_eq!(v1.version, 1);
        assert!(v1.is_active);

        let v2 = svc.apply(spec()).await.unwrap();
        assert_eq!(v2.version, 2);

        let active = svc.get_active("article-review").await.unwrap();
        assert_eq!(active.id, v2.id);
        assert_eq!(svc.list(false).await.unwrap().len(), 2);
        assert_eq!(svc.list(true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deactivate_unknown_id_is_not_found() {
        let svc = DefinitionService::new(Arc::new(InMemoryWorkflows::default()));
        let err = svc.deactivate(&Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::DefinitionNotFound(_)));
    }
}
