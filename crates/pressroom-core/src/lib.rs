//! Core engine logic for Pressroom.
//!
//! Houses the queue service and workers, the dead-letter queue service, the
//! workflow dispatcher and step runner, the per-queue health monitor, and
//! the repository traits the storage layer implements. No I/O lives here
//! beyond the repository seams.

pub mod dlq;
pub mod event;
pub mod monitor;
pub mod queue;
pub mod registry;
pub mod repository;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testutil;
