//! Stream configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via SHAPEWIRE_CONFIG or an explicit path)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Smallest decoder read buffer.
pub const MIN_READ_BUFFER: usize = 1024;
/// Largest decoder read buffer.
pub const MAX_READ_BUFFER: usize = 16 * 1024 * 1024;

/// Tuning for readers and writers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Events a [`crate::StreamWriter`] queues before `send` waits.
    pub send_queue_capacity: usize,
    /// Decoded events buffered by an [`crate::EventStream`].
    pub event_channel_capacity: usize,
    /// Initial size of the decoder's payload buffer, in bytes.
    pub read_buffer_size: usize,
    /// Log every decoded message as JSON at debug level.
    pub log_messages: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            send_queue_capacity: 1,
            event_channel_capacity: 16,
            read_buffer_size: 10 * 1024,
            log_messages: false,
        }
    }
}

impl StreamConfig {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("SHAPEWIRE_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Loads configuration from a YAML file. Values are clamped to their
    /// valid ranges.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let mut config: StreamConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        config.clamp();
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Applies overrides looked up by environment variable name. Values that
    /// do not parse are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(n) = lookup("SHAPEWIRE_SEND_QUEUE").and_then(|v| v.parse().ok()) {
            self.send_queue_capacity = n;
        }

        if let Some(n) = lookup("SHAPEWIRE_EVENT_CHANNEL").and_then(|v| v.parse().ok()) {
            self.event_channel_capacity = n;
        }

        if let Some(n) = lookup("SHAPEWIRE_READ_BUFFER").and_then(|v| v.parse().ok()) {
            self.read_buffer_size = n;
        }

        if let Some(v) = lookup("SHAPEWIRE_LOG_MESSAGES") {
            self.log_messages = v == "1" || v.eq_ignore_ascii_case("true");
        }

        self.clamp();
    }

    fn clamp(&mut self) {
        self.send_queue_capacity = self.send_queue_capacity.max(1);
        self.event_channel_capacity = self.event_channel_capacity.max(1);
        self.read_buffer_size = self.read_buffer_size.clamp(MIN_READ_BUFFER, MAX_READ_BUFFER);
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {err}", path = .0.display(), err = .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file '{path}': {err}", path = .0.display(), err = .1)]
    Parse(PathBuf, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = StreamConfig::default();
        assert_eq!(config.send_queue_capacity, 1);
        assert_eq!(config.event_channel_capacity, 16);
        assert_eq!(config.read_buffer_size, 10 * 1024);
        assert!(!config.log_messages);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = StreamConfig {
            send_queue_capacity: 8,
            log_messages: true,
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.yaml");
        config.save(&path).unwrap();
        assert_eq!(StreamConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.yaml");
        std::fs::write(&path, "event_channel_capacity: 4\n").unwrap();

        let config = StreamConfig::from_file(&path).unwrap();
        assert_eq!(config.event_channel_capacity, 4);
        assert_eq!(config.send_queue_capacity, 1);
    }

    #[test]
    fn test_file_values_are_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.yaml");
        std::fs::write(&path, "send_queue_capacity: 0\nread_buffer_size: 3\n").unwrap();

        let config = StreamConfig::from_file(&path).unwrap();
        assert_eq!(config.send_queue_capacity, 1);
        assert_eq!(config.read_buffer_size, MIN_READ_BUFFER);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = StreamConfig::default();
        config.apply_overrides(env(&[
            ("SHAPEWIRE_SEND_QUEUE", "32"),
            ("SHAPEWIRE_EVENT_CHANNEL", "not-a-number"),
            ("SHAPEWIRE_READ_BUFFER", "999999999"),
            ("SHAPEWIRE_LOG_MESSAGES", "TRUE"),
        ]));

        assert_eq!(config.send_queue_capacity, 32);
        assert_eq!(config.event_channel_capacity, 16);
        assert_eq!(config.read_buffer_size, MAX_READ_BUFFER);
        assert!(config.log_messages);
    }

    #[test]
    fn test_missing_file() {
        let err = StreamConfig::from_file("/nonexistent/shapewire.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(..)));
        assert!(err.to_string().contains("/nonexistent/shapewire.yaml"));
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "send_queue_capacity: [").unwrap();

        let err = StreamConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(..)));
        assert!(err.to_string().contains("bad.yaml"));
    }
}
