//! Payload validation registry.
//!
//! Every job name admitted to a queue must be registered here with a typed
//! payload. Validation happens before admission: a payload that does not
//! deserialize into the registered type is rejected, and unknown job names
//! are rejected outright. The JSON Schemas are also served over the API so
//! producers can see what each job expects.

use std::collections::BTreeMap;
use std::collections::HashMap;

use pressroom_types::error::QueueError;
use schemars::{JsonSchema, Schema, schema_for};
use serde::de::DeserializeOwned;

type ValidateFn = Box<dyn Fn(&serde_json::Value) -> Result<(), String> + Send + Sync>;

struct SchemaEntry {
    schema: Schema,
    validate: ValidateFn,
}

/// Job-name to payload-schema table, built once at startup.
#[derive(Default)]
pub struct SchemaRegistry {
    entries: HashMap<String, SchemaEntry>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job name with a typed payload.
    pub fn register<T: DeserializeOwned + JsonSchema>(mut self, name: impl Into<String>) -> Self {
        let entry = SchemaEntry {
            schema: schema_for!(T),
            validate: Box::new(|value| {
                serde_json::from_value::<T>(value.clone())
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            }),
        };
        self.entries.insert(name.into(), entry);
        self
    }

    /// Check a payload against the registered schema for `name`.
    pub fn validate(&self, name: &str, payload: &serde_json::Value) -> Result<(), QueueError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| QueueError::UnknownJobName(name.to_string()))?;
        (entry.validate)(payload).map_err(|reason| QueueError::Validation {
            job: name.to_string(),
            reason,
        })
    }

    pub fn schema(&self, name: &str) -> Option<&Schema> {
        self.entries.get(name).map(|e| &e.schema)
    }

    /// All registered schemas, sorted by job name.
    pub fn schemas(&self) -> BTreeMap<&str, &Schema> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.as_str(), &entry.schema))
            .collect()
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("job_names", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize, JsonSchema)]
    struct PublishPayload {
        article_id: String,
        #[serde(default)]
        #[allow(dead_code)]
        notify_subscribers: bool,
    }

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new().register::<PublishPayload>("article.publish")
    }

    #[test]
    fn valid_payload_passes() {
        let result = registry().validate("article.publish", &json!({"article_id": "42"}));
        assert!(result.is_ok());
    }

    #[test]
    fn missing_field_is_rejected() {
        let err = registry()
            .validate("article.publish", &json!({"notify_subscribers": true}))
            .unwrap_err();
        assert!(matches!(err, QueueError::Validation { ref job, .. } if job == "article.publish"));
    }

    #[test]
    fn wrong_type_is_rejected() {
        let err = registry()
            .validate("article.publish", &json!({"article_id": 42}))
            .unwrap_err();
        assert!(matches!(err, QueueError::Validation { .. }));
    }

    #[test]
    fn unknown_job_name_is_rejected() {
        let err = registry()
            .validate("article.delete", &json!({}))
            .unwrap_err();
        assert!(matches!(err, QueueError::UnknownJobName(ref name) if name == "article.delete"));
    }

    #[test]
    fn schemas_are_listed_by_name() {
        let registry = registry();
        assert!(registry.schema("article.publish").is_some());
        assert_eq!(registry.schemas().len(), 1);
    }
}
