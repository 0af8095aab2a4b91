//! Global configuration types for Pressroom.
//!
//! `PressroomConfig` represents the top-level `config.toml` that controls
//! worker concurrency, retry and stall timing, and server binding.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the Pressroom engine.
///
/// Loaded from `{data_dir}/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PressroomConfig {
    /// Concurrent workers per queue.
    #[serde(default = "default_workers_per_queue")]
    pub workers_per_queue: u32,

    /// Worker polling interval when the queue is empty, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Age after which an active job's claim is considered stalled, in seconds.
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,

    /// Default maximum attempts for jobs that do not set their own.
    #[serde(default = "default_job_attempts")]
    pub default_job_attempts: u32,

    /// Maximum replays per dead-letter entry.
    #[serde(default = "default_max_replays")]
    pub max_replays: u32,

    /// Queue stats cache lifetime, in seconds.
    #[serde(default = "default_stats_ttl_secs")]
    pub stats_ttl_secs: u64,

    /// Capacity of the broadcast event bus.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Address the HTTP server binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Hours completed jobs are retained before cleanup removes them.
    #[serde(default = "default_completed_retention_hours")]
    pub completed_retention_hours: u64,
}

fn default_workers_per_queue() -> u32 {
    4
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_stall_timeout_secs() -> u64 {
    300
}

fn default_job_attempts() -> u32 {
    3
}

fn default_max_replays() -> u32 {
    5
}

fn default_stats_ttl_secs() -> u64 {
    10
}

fn default_event_capacity() -> usize {
    1024
}

fn default_bind_addr() -> String {
    "127.0.0.1:7700".to_string()
}

fn default_completed_retention_hours() -> u64 {
    24
}

impl Default for PressroomConfig {
    fn default() -> Self {
        Self {
            workers_per_queue: default_workers_per_queue(),
            poll_interval_ms: default_poll_interval_ms(),
            stall_timeout_secs: default_stall_timeout_secs(),
            default_job_attempts: default_job_attempts(),
            max_replays: default_max_replays(),
            stats_ttl_secs: default_stats_ttl_secs(),
            event_capacity: default_event_capacity(),
            bind_addr: default_bind_addr(),
            completed_retention_hours: default_completed_retention_hours(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = PressroomConfig::default();
        assert_eq!(config.workers_per_queue, 4);
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.stall_timeout_secs, 300);
        assert_eq!(config.default_job_attempts, 3);
        assert_eq!(config.max_replays, 5);
        assert_eq!(config.stats_ttl_secs, 10);
        assert_eq!(config.event_capacity, 1024);
        assert_eq!(config.bind_addr, "127.0.0.1:7700");
    }

    #[test]
    fn test_config_deserialize_with_defaults() {
        let config: PressroomConfig = toml::from_str("").unwrap();
        assert_eq!(config.workers_per_queue, 4);
        assert_eq!(config.max_replays, 5);
    }

    #[test]
    fn test_config_deserialize_partial() {
        let toml_str = r#"
workers_per_queue = 8
max_replays = 2
bind_addr = "0.0.0.0:8080"
"#;
        let config: PressroomConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.workers_per_queue, 8);
        assert_eq!(config.max_replays, 2);
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.poll_interval_ms, 500);
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = PressroomConfig {
            workers_per_queue: 2,
            stats_ttl_secs: 30,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: PressroomConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.workers_per_queue, 2);
        assert_eq!(parsed.stats_ttl_secs, 30);
    }
}
