//! Workflow execution context.
//!
//! `StepContext` is the typed key/value state that flows through an
//! instance's steps. Handlers read their input from it (merged with the
//! step's payload overrides) and contribute patches back into it.

use std::collections::HashMap;

use pressroom_types::workflow::{ContextValue, StepCondition};
use serde_json::Value;

/// Context key holding the most recent step's output, refreshed after every
/// step that returns one.
pub const LAST_RESULT: &str = "last_result";

/// Mutable execution context for one workflow instance.
#[derive(Debug, Clone, Default)]
pub struct StepContext {
    values: HashMap<String, ContextValue>,
}

impl StepContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: HashMap<String, ContextValue>) -> Self {
        Self { values }
    }

    /// Build the initial context from a trigger payload.
    ///
    /// A JSON object contributes one typed entry per top-level key; any
    /// other shape is stored whole under `"trigger"`.
    pub fn from_trigger(payload: Value) -> Self {
        let mut ctx = Self::new();
        match payload {
            Value::Object(map) => {
                for (key, value) in map {
                    ctx.insert(key, ContextValue::from_json(value));
                }
            }
            Value::Null => {}
            other => {
                ctx.insert("trigger", ContextValue::from_json(other));
            }
        }
        ctx
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: ContextValue) {
        self.values.insert(key.into(), value);
    }

    /// Apply a step's output patch. Patch entries overwrite existing keys.
    pub fn merge(&mut self, patch: HashMap<String, ContextValue>) {
        self.values.extend(patch);
    }

    /// Evaluate a step condition against the context.
    ///
    /// A missing key means the condition does not hold; the step is skipped
    /// rather than failed.
    pub fn condition_holds(&self, condition: &StepCondition) -> bool {
        self.values
            .get(&condition.left)
            .is_some_and(|value| *value == condition.right)
    }

    /// Render the handler input: the context as a JSON object with the
    /// step's payload overrides applied on top.
    pub fn merged_input(&self, overrides: &HashMap<String, ContextValue>) -> Value {
        let mut map: serde_json::Map<String, Value> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        for (key, value) in overrides {
            map.insert(key.clone(), value.to_json());
        }
        Value::Object(map)
    }

    pub fn into_map(self) -> HashMap<String, ContextValue> {
        self.values
    }

    pub fn as_map(&self) -> &HashMap<String, ContextValue> {
        &self.values
    }
}
