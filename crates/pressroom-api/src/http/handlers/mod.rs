//! REST API request handlers, one module per resource.

pub mod dlq;
pub mod queue;
pub mod stats;
pub mod workflow;
pub mod ws;
