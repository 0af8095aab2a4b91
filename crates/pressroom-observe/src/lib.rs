//! Observability for Pressroom: tracing subscriber setup and span attribute
//! conventions.

pub mod queue_attrs;
pub mod tracing_setup;
