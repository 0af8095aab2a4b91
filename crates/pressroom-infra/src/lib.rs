//! Infrastructure layer for Pressroom.
//!
//! SQLite implementations of the core repository traits, the global
//! configuration loader, and the concrete step handlers.

pub mod config;
pub mod handlers;
pub mod sqlite;
