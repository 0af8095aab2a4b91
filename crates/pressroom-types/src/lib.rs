//! Shared domain types for the Pressroom workflow and queue engine.
//!
//! This crate holds the serde data model used across the workspace:
//! workflow definitions and instances, queue jobs, dead-letter entries,
//! lifecycle events, the error taxonomy, and global configuration.

pub mod config;
pub mod dlq;
pub mod error;
pub mod event;
pub mod job;
pub mod workflow;
