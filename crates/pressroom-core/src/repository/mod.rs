//! Storage traits implemented by the infrastructure layer.

pub mod dlq;
pub mod job;
pub mod workflow;

pub use dlq::DlqRepository;
pub use job::JobRepository;
pub use workflow::WorkflowRepository;
