//! Configuration loading and management

use crate::core::error::ClientError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Settings for the authenticated request client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RequestConfig {
    /// REST base URL (e.g. "https://api.example.com/api")
    #[validate(url)]
    pub base_url: String,

    /// Default number of additional attempts for transient failures
    pub retries: u32,

    /// Base retry delay; attempt n waits `retry_delay_ms * 2^(n-1)`
    #[validate(range(min = 1))]
    pub retry_delay_ms: u64,

    /// Freshness window for cached responses
    #[validate(range(min = 1))]
    pub cache_ttl_ms: u64,

    /// Interval between background health probes
    #[validate(range(min = 1))]
    pub health_check_interval_ms: u64,

    /// Path of the lightweight health probe, relative to `base_url`
    #[validate(length(min = 1))]
    pub health_path: String,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            retries: 0,
            retry_delay_ms: 5_000,
            cache_ttl_ms: 300_000,
            health_check_interval_ms: 30_000,
            health_path: "/health".to_string(),
        }
    }
}

impl RequestConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }
}

/// Settings for the realtime channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RealtimeConfig {
    /// WebSocket base URL; the user identity is appended as a path segment
    #[validate(url)]
    pub ws_url: String,

    /// Interval between heartbeats while the page is visible
    #[validate(range(min = 1))]
    pub heartbeat_interval_ms: u64,

    /// First reconnect delay; attempt n waits `reconnect_base_delay_ms * 2^n`
    #[validate(range(min = 1))]
    pub reconnect_base_delay_ms: u64,

    /// Reconnects attempted before giving up
    pub max_reconnect_attempts: u32,

    /// Maximum entries kept per inbox feed buffer
    #[validate(range(min = 1))]
    pub feed_buffer_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8000/ws".to_string(),
            heartbeat_interval_ms: 30_000,
            reconnect_base_delay_ms: 1_000,
            max_reconnect_attempts: 5,
            feed_buffer_capacity: 50,
        }
    }
}

impl RealtimeConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Delay before reconnect attempt `attempt` (0-indexed)
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(30);
        Duration::from_millis(self.reconnect_base_delay_ms.saturating_mul(factor))
    }

    /// Endpoint for a given identity
    pub fn endpoint_for(&self, user_id: &str) -> String {
        format!("{}/{}", self.ws_url.trim_end_matches('/'), user_id)
    }
}

/// Default auto-dismiss delays per notification kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct NotificationConfig {
    pub success_ms: u64,
    pub info_ms: u64,
    pub warning_ms: u64,
    pub error_ms: u64,
    pub milestone_ms: u64,

    /// Broadcast buffer size
    #[validate(range(min = 1))]
    pub capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            success_ms: 4_000,
            info_ms: 5_000,
            warning_ms: 6_000,
            error_ms: 8_000,
            milestone_ms: 8_000,
            capacity: 256,
        }
    }
}

/// Complete client configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ClientConfig {
    #[validate(nested)]
    pub request: RequestConfig,

    #[validate(nested)]
    pub realtime: RealtimeConfig,

    #[validate(nested)]
    pub notifications: NotificationConfig,
}

impl ClientConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    ///
    /// Missing fields take their defaults; the result is validated.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.check()?;
        Ok(config)
    }

    /// Validate, mapping failures to a client error
    pub fn check(&self) -> Result<(), ClientError> {
        self.validate()
            .map_err(|e| ClientError::Config(e.to_string()))
    }
}
