//! Configuration loader for Pressroom.
//!
//! Reads `config.toml` from the data directory (`~/.pressroom/` in
//! production) and deserializes it into [`PressroomConfig`]. Falls back to
//! defaults when the file is missing or malformed.

use std::path::{Path, PathBuf};

use pressroom_types::config::PressroomConfig;

/// Resolve the data directory from `PRESSROOM_DATA_DIR`, falling back to
/// `~/.pressroom`.
pub fn data_dir() -> PathBuf {
    match std::env::var("PRESSROOM_DATA_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".pressroom")
        }
    }
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`PressroomConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - If the file exists and parses successfully, returns the parsed config.
pub async fn load_config(data_dir: &Path) -> PressroomConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return PressroomConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return PressroomConfig::default();
        }
    };

    match toml::from_str::<PressroomConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            PressroomConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).await;
        assert_eq!(config.workers_per_queue, 4);
        assert_eq!(config.max_replays, 5);
        assert_eq!(config.bind_addr, "127.0.0.1:7700");
    }

    #[tokio::test]
    async fn valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
workers_per_queue = 8
poll_interval_ms = 100
max_replays = 2
bind_addr = "0.0.0.0:8080"
"#,
        )
        .await
        .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.workers_per_queue, 8);
        assert_eq!(config.poll_interval_ms, 100);
        assert_eq!(config.max_replays, 2);
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        // Unspecified fields keep their defaults.
        assert_eq!(config.stall_timeout_secs, 300);
    }

    #[tokio::test]
    async fn invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.workers_per_queue, 4);
    }
}
