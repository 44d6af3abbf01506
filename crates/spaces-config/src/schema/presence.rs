//! Presence bus configuration types.

use serde::{Deserialize, Serialize};

/// Phoenix/realtime connection settings for the presence bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeSettings {
    pub project_ref: String,
    pub api_key: String,
    pub heartbeat_interval: u32,
    pub reconnect_delay: u32,
    pub max_reconnect_delay: u32,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            project_ref: String::new(),
            api_key: String::new(),
            heartbeat_interval: 25,
            reconnect_delay: 1,
            max_reconnect_delay: 30,
        }
    }
}

/// Presence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Prefix of every host channel; the host's user id is appended.
    pub channel_prefix: String,
    /// Upper bound for a single attach/publish/presence call, in milliseconds.
    pub request_timeout_ms: u32,
    pub realtime: RealtimeSettings,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            channel_prefix: "spaces:host:".into(),
            request_timeout_ms: 10_000,
            realtime: RealtimeSettings::default(),
        }
    }
}
