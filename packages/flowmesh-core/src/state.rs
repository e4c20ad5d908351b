//! Core configuration types.

use serde::{Deserialize, Serialize};

/// Configuration for the pipeline runtime.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RuntimeConfig {
    // Server
    /// Preferred port for the HTTP server (0 = auto-allocate).
    pub preferred_port: u16,

    // Channels
    /// Per-subscriber buffer capacity on every channel.
    pub channel_capacity: usize,

    /// Depth of each node's input funnel queue. Kept small so backpressure
    /// accumulates in channel buffers, where drop accounting lives.
    pub input_queue_depth: usize,

    // Metrics
    /// Interval between metrics snapshots (milliseconds).
    pub metrics_interval_ms: u64,

    /// Capacity of the metrics snapshot broadcast channel.
    pub metrics_channel_capacity: usize,

    // Events and inspection
    /// Capacity of the domain event broadcast channel.
    pub event_channel_capacity: usize,

    /// Number of recent messages retained by the frame inspector.
    pub inspector_capacity: usize,

    /// Capacity of each per-node video frame broadcast channel.
    pub video_channel_capacity: usize,
}

impl RuntimeConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.channel_capacity == 0 {
            return Err("channel_capacity must be >= 1".to_string());
        }
        if self.input_queue_depth == 0 {
            return Err("input_queue_depth must be >= 1".to_string());
        }
        if self.metrics_interval_ms == 0 {
            return Err("metrics_interval_ms must be >= 1".to_string());
        }
        if self.metrics_channel_capacity == 0 || self.event_channel_capacity == 0 {
            return Err("broadcast capacities must be >= 1 (broadcast::channel panics on 0)".to_string());
        }
        if self.video_channel_capacity == 0 {
            return Err("video_channel_capacity must be >= 1".to_string());
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            preferred_port: 0,
            channel_capacity: 64,
            input_queue_depth: 1,
            metrics_interval_ms: 500,
            metrics_channel_capacity: 16,
            event_channel_capacity: 100,
            inspector_capacity: 256,
            video_channel_capacity: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(RuntimeConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_channel_capacity_rejected() {
        let config = RuntimeConfig {
            channel_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_metrics_interval_rejected() {
        let config = RuntimeConfig {
            metrics_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
