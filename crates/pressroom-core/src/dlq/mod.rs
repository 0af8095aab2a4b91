//! Dead-letter queue service.

pub mod service;

pub use service::DlqService;
