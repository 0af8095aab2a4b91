//! Step handler trait and the closed action registry.
//!
//! Every `StepAction` variant maps to exactly one handler slot, so the
//! registry is complete by construction and "no handler registered" cannot
//! occur at runtime.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use pressroom_types::error::StepFailure;
use pressroom_types::workflow::{ContextValue, StepAction};
use uuid::Uuid;

/// Input passed to a step handler.
///
/// `payload` is the instance context merged with the step definition's
/// payload overrides, rendered as a JSON object.
#[derive(Debug, Clone)]
pub struct StepInput {
    pub instance_id: Uuid,
    pub step_key: String,
    pub payload: serde_json::Value,
}

/// Result of a successful step execution.
///
/// The patch is merged into the instance context before the next step runs.
/// The output, if any, is recorded on the execution row and handed to the
/// next step as the context's `last_result` entry.
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    pub output: Option<serde_json::Value>,
    pub patch: HashMap<String, ContextValue>,
}

impl StepOutput {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: ContextValue) -> Self {
        self.patch.insert(key.into(), value);
        self
    }

    pub fn with_output(mut self, output: serde_json::Value) -> Self {
        self.output = Some(output);
        self
    }

    /// The patch rendered as a JSON object.
    ///
    /// Stands in for the audit trail's output column when the handler
    /// returned no output of its own.
    pub fn patch_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .patch
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }
}

/// A step action implementation.
///
/// Failures must be classified: `StepFailure::Retryable` consumes an attempt
/// and may run again, `StepFailure::Fatal` stops the step immediately.
pub trait StepHandler: Send + Sync {
    fn execute(
        &self,
        input: &StepInput,
    ) -> impl Future<Output = Result<StepOutput, StepFailure>> + Send;
}

/// Object-safe version of [`StepHandler`] with boxed futures.
pub trait StepHandlerDyn: Send + Sync {
    fn execute_boxed<'a>(
        &'a self,
        input: &'a StepInput,
    ) -> Pin<Box<dyn Future<Output = Result<StepOutput, StepFailure>> + Send + 'a>>;
}

impl<T: StepHandler> StepHandlerDyn for T {
    fn execute_boxed<'a>(
        &'a self,
        input: &'a StepInput,
    ) -> Pin<Box<dyn Future<Output = Result<StepOutput, StepFailure>> + Send + 'a>> {
        Box::pin(self.execute(input))
    }
}

/// Type-erased step handler.
pub struct BoxStepHandler {
    inner: Box<dyn StepHandlerDyn + Send + Sync>,
}

impl BoxStepHandler {
    pub fn new<T: StepHandler + 'static>(handler: T) -> Self {
        Self {
            inner: Box::new(handler),
        }
    }

    pub async fn execute(&self, input: &StepInput) -> Result<StepOutput, StepFailure> {
        self.inner.execute_boxed(input).await
    }
}

/// Complete table of handlers, one per `StepAction` variant.
pub struct StepRegistry {
    notify: BoxStepHandler,
    suggest_metadata: BoxStepHandler,
    reindex_search: BoxStepHandler,
    dispatch: BoxStepHandler,
}

impl StepRegistry {
    pub fn new(
        notify: BoxStepHandler,
        suggest_metadata: BoxStepHandler,
        reindex_search: BoxStepHandler,
        dispatch: BoxStepHandler,
    ) -> Self {
        Self {
            notify,
            suggest_metadata,
            reindex_search,
            dispatch,
        }
    }

    pub fn handler(&self, action: StepAction) -> &BoxStepHandler {
        match action {
            StepAction::Notify => &self.notify,
            StepAction::SuggestMetadata => &self.suggest_metadata,
            StepAction::ReindexSearch => &self.reindex_search,
            StepAction::Dispatch => &self.dispatch,
        }
    }
}
