//! Job processor trait and the per-name processor map workers dispatch on.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use pressroom_types::error::StepFailure;
use pressroom_types::job::Job;

/// Handles one job attempt.
///
/// Errors carry the retry classification: `Retryable` consumes an attempt,
/// `Fatal` dead-letters the job immediately.
pub trait JobProcessor: Send + Sync {
    fn process(&self, job: &Job) -> impl Future<Output = Result<(), StepFailure>> + Send;
}

/// Object-safe version of [`JobProcessor`] with boxed futures.
pub trait JobProcessorDyn: Send + Sync {
    fn process_boxed<'a>(
        &'a self,
        job: &'a Job,
    ) -> Pin<Box<dyn Future<Output = Result<(), StepFailure>> + Send + 'a>>;
}

impl<T: JobProcessor> JobProcessorDyn for T {
    fn process_boxed<'a>(
        &'a self,
        job: &'a Job,
    ) -> Pin<Box<dyn Future<Output = Result<(), StepFailure>> + Send + 'a>> {
        Box::pin(self.process(job))
    }
}

/// Type-erased job processor.
pub struct BoxJobProcessor {
    inner: Box<dyn JobProcessorDyn + Send + Sync>,
}

impl BoxJobProcessor {
    pub fn new<T: JobProcessor + 'static>(processor: T) -> Self {
        Self {
            inner: Box::new(processor),
        }
    }

    pub async fn process(&self, job: &Job) -> Result<(), StepFailure> {
        self.inner.process_boxed(job).await
    }
}

/// Job-name to processor routing table, built once at startup.
#[derive(Clone, Default)]
pub struct ProcessorMap {
    processors: HashMap<String, Arc<BoxJobProcessor>>,
}

impl ProcessorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: JobProcessor + 'static>(mut self, name: impl Into<String>, p: T) -> Self {
        self.processors
            .insert(name.into(), Arc::new(BoxJobProcessor::new(p)));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<BoxJobProcessor>> {
        self.processors.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.processors.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pressroom_types::job::{BackoffPolicy, JobState};
    use serde_json::json;

    struct Ok200;

    impl JobProcessor for Ok200 {
        async fn process(&self, _job: &Job) -> Result<(), StepFailure> {
            Ok(())
        }
    }

    fn job(name: &str) -> Job {
        Job {
            id: "j1".to_string(),
            queue: "publishing".to_string(),
            name: name.to_string(),
            payload: json!({}),
            attempts: 3,
            backoff: BackoffPolicy::default(),
            priority: 0,
            run_at: Utc::now(),
            state: JobState::Pending,
            attempts_made: 0,
            replay_count: 0,
            last_error: None,
            locked_at: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    #[tokio::test]
    async fn map_routes_by_job_name() {
        let map = ProcessorMap::new().register("article.publish", Ok200);
        let processor = map.get("article.publish").unwrap();
        assert!(processor.process(&job("article.publish")).await.is_ok());
        assert!(map.get("article.unknown").is_none());
    }
}
