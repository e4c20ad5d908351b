//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to (0 = scan the default range).
    /// Override: `FLOWMESH_BIND_PORT`
    pub bind_port: u16,

    /// Interval between metrics snapshots (milliseconds).
    /// Override: `FLOWMESH_METRICS_INTERVAL_MS`
    pub metrics_interval_ms: u64,

    /// Per-subscriber channel buffer capacity.
    /// Override: `FLOWMESH_CHANNEL_CAPACITY`
    pub channel_capacity: usize,

    /// Number of recent messages retained by the frame inspector.
    pub inspector_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = flowmesh_core::RuntimeConfig::default();
        Self {
            bind_port: 0,
            metrics_interval_ms: core.metrics_interval_ms,
            channel_capacity: core.channel_capacity,
            inspector_capacity: core.inspector_capacity,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("FLOWMESH_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }

        if let Ok(val) = std::env::var("FLOWMESH_METRICS_INTERVAL_MS") {
            if let Ok(interval) = val.parse() {
                self.metrics_interval_ms = interval;
            }
        }

        if let Ok(val) = std::env::var("FLOWMESH_CHANNEL_CAPACITY") {
            if let Ok(capacity) = val.parse() {
                self.channel_capacity = capacity;
            }
        }
    }

    /// Converts to flowmesh-core's config type.
    pub fn to_core_config(&self) -> flowmesh_core::RuntimeConfig {
        flowmesh_core::RuntimeConfig {
            preferred_port: self.bind_port,
            metrics_interval_ms: self.metrics_interval_ms,
            channel_capacity: self.channel_capacity,
            inspector_capacity: self.inspector_capacity,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_core() {
        let config = ServerConfig::default();
        assert_eq!(config.metrics_interval_ms, 500);
        assert_eq!(config.channel_capacity, 64);
        assert_eq!(config.bind_port, 0);
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flowmesh.yaml");
        std::fs::write(&path, "bind_port: 9000\nchannel_capacity: 32\n").unwrap();

        let config = ServerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.bind_port, 9000);
        assert_eq!(config.channel_capacity, 32);
        // Unlisted fields keep their defaults.
        assert_eq!(config.metrics_interval_ms, 500);
    }

    #[test]
    fn core_config_carries_overrides() {
        let config = ServerConfig {
            bind_port: 8123,
            channel_capacity: 128,
            ..Default::default()
        };
        let core = config.to_core_config();
        assert_eq!(core.preferred_port, 8123);
        assert_eq!(core.channel_capacity, 128);
    }
}
