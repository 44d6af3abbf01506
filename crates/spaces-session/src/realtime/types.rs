//! Configuration, protocol types, and event/command enums for the realtime client.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use spaces_config::RealtimeSettings;
use tokio::sync::oneshot;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct RealtimeConfig {
    pub project_ref: String,
    /// Publishable anon key.
    pub api_key: String,
    /// User JWT for authenticated channels.
    pub access_token: Option<String>,
    pub heartbeat_interval_secs: u64,
    pub reconnect_delay_secs: u64,
    pub max_reconnect_delay_secs: u64,
}

impl std::fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("project_ref", &self.project_ref)
            .field("api_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field("reconnect_delay_secs", &self.reconnect_delay_secs)
            .field("max_reconnect_delay_secs", &self.max_reconnect_delay_secs)
            .finish()
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self::from_settings(&RealtimeSettings::default(), None)
    }
}

impl RealtimeConfig {
    pub fn from_settings(settings: &RealtimeSettings, access_token: Option<String>) -> Self {
        Self {
            project_ref: settings.project_ref.clone(),
            api_key: settings.api_key.clone(),
            access_token,
            heartbeat_interval_secs: u64::from(settings.heartbeat_interval),
            reconnect_delay_secs: u64::from(settings.reconnect_delay),
            max_reconnect_delay_secs: u64::from(settings.max_reconnect_delay),
        }
    }

    pub(crate) fn ws_url(&self) -> String {
        format!(
            "wss://{}.supabase.co/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            self.project_ref, self.api_key
        )
    }
}

// ---------------------------------------------------------------------------
// Phoenix Protocol Types
// ---------------------------------------------------------------------------

/// A Phoenix protocol message envelope (v1 JSON format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    pub payload: serde_json::Value,
    #[serde(rename = "ref")]
    pub msg_ref: Option<String>,
}

// ---------------------------------------------------------------------------
// Channel Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub broadcast: BroadcastConfig,
    pub presence: ChannelPresence,
    /// Access token sent with `phx_join` for private channels.
    pub access_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Receive our own broadcasts.
    pub self_send: bool,
    /// Ask the server to acknowledge each broadcast.
    pub ack: bool,
}

#[derive(Debug, Clone)]
pub struct ChannelPresence {
    /// Key identifying this client in the channel's presence state.
    pub key: String,
}

impl ChannelConfig {
    pub(crate) fn to_join_payload(&self) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "config": {
                "broadcast": {
                    "self": self.broadcast.self_send,
                    "ack": self.broadcast.ack
                },
                "presence": {
                    "key": self.presence.key
                }
            }
        });
        if let (Some(token), Some(obj)) = (&self.access_token, payload.as_object_mut()) {
            obj.insert("access_token".into(), serde_json::Value::String(token.clone()));
        }
        payload
    }
}

// ---------------------------------------------------------------------------
// Events, Commands & Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    Connected,
    Disconnected,
    ChannelJoined { topic: String },
    ChannelError { topic: String, message: String },
    Broadcast {
        topic: String,
        event: String,
        payload: serde_json::Value,
    },
    /// Full presence snapshot, sent after joining.
    PresenceState {
        topic: String,
        state: HashMap<String, Vec<serde_json::Value>>,
    },
    PresenceDiff {
        topic: String,
        joins: HashMap<String, Vec<serde_json::Value>>,
        leaves: HashMap<String, Vec<serde_json::Value>>,
    },
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RealtimeError {
    #[error("realtime connection closed")]
    Closed,

    #[error("server rejected request: {0}")]
    Rejected(String),

    #[error("disconnected before reply")]
    Disconnected,
}

pub(crate) type ReplySender = oneshot::Sender<Result<(), RealtimeError>>;

#[derive(Debug)]
pub(crate) enum RealtimeCommand {
    JoinChannel {
        topic: String,
        config: ChannelConfig,
        reply: ReplySender,
    },
    LeaveChannel {
        topic: String,
        reply: ReplySender,
    },
    Broadcast {
        topic: String,
        event: String,
        payload: serde_json::Value,
        reply: ReplySender,
    },
    PresenceTrack {
        topic: String,
        payload: serde_json::Value,
        reply: ReplySender,
    },
    PresenceUntrack {
        topic: String,
        reply: ReplySender,
    },
    Disconnect,
}
