use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// One entry of a channel's presence set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceMember {
    pub client_id: String,
    pub data: serde_json::Value,
}

/// A message published on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    pub channel: String,
    pub event: String,
    pub data: serde_json::Value,
}

impl BusMessage {
    /// Decode the payload, returning `None` for foreign or malformed data.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.data.clone()).ok()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum BusError {
    #[error("channel {0} is not attached")]
    NotAttached(String),

    #[error("{operation} on {channel} timed out")]
    Timeout { channel: String, operation: String },

    #[error("{channel} rejected the request: {reason}")]
    Rejected { channel: String, reason: String },

    #[error("presence bus disconnected")]
    Disconnected,

    #[error("{0}")]
    Other(String),
}

/// Channel-scoped pub/sub with membership presence.
#[async_trait]
pub trait PresenceBus: Send + Sync {
    async fn attach(&self, channel: &str) -> Result<(), BusError>;

    async fn detach(&self, channel: &str) -> Result<(), BusError>;

    async fn enter(&self, channel: &str, data: serde_json::Value) -> Result<(), BusError>;

    async fn leave(&self, channel: &str, data: serde_json::Value) -> Result<(), BusError>;

    async fn members(&self, channel: &str) -> Result<Vec<PresenceMember>, BusError>;

    async fn publish(
        &self,
        channel: &str,
        event: &str,
        data: serde_json::Value,
    ) -> Result<(), BusError>;

    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<BusMessage>, BusError>;
}
