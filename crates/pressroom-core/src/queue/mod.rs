//! Job queue: payload schemas, the queue service, and worker pools.

pub mod schema;
pub mod service;
pub mod worker;

pub use schema::SchemaRegistry;
pub use service::QueueService;
pub use worker::{QueueWorkers, WorkerConfig};
