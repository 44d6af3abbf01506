use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub peer_id: String,
    pub name: String,
    /// Transport-level role name, e.g. "host" or "speaker".
    pub role: String,
    /// Raw JSON metadata attached by the peer when it joined.
    pub metadata: String,
    #[serde(default)]
    pub is_local: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub track_id: String,
    pub peer_id: String,
    pub kind: TrackKind,
    #[serde(default)]
    pub muted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerLevel {
    pub peer_id: String,
    pub level: f64,
}

/// Callbacks from the media transport, delivered in order.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    PeerJoined(PeerInfo),
    PeerLeft(PeerInfo),
    PeerUpdated(PeerInfo),
    TrackAdded(TrackInfo),
    TrackRemoved(TrackInfo),
    MuteChanged { peer_id: String, muted: bool },
    AudioLevels(Vec<PeerLevel>),
    RoomEnded { reason: String },
    Error(String),
}

#[derive(Clone)]
pub struct MediaJoinConfig {
    pub room_id: String,
    pub auth_token: String,
    pub user_name: String,
    pub role: String,
    pub metadata: String,
    pub start_muted: bool,
}

impl std::fmt::Debug for MediaJoinConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaJoinConfig")
            .field("room_id", &self.room_id)
            .field("auth_token", &"[REDACTED]")
            .field("user_name", &self.user_name)
            .field("role", &self.role)
            .field("start_muted", &self.start_muted)
            .finish()
    }
}

/// A live connection to a media room.
#[derive(Debug)]
pub struct MediaConnection {
    pub local_peer: PeerInfo,
    /// Every peer connected at join time, the local peer included.
    pub roster: Vec<PeerInfo>,
    pub events: mpsc::Receiver<TransportEvent>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("not connected to a media room")]
    NotConnected,

    #[error("join failed: {0}")]
    JoinFailed(String),

    #[error("peer {0} not found")]
    PeerNotFound(String),

    #[error("transport error: {0}")]
    Other(String),
}

/// SFU-style audio transport.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    async fn join(&self, config: MediaJoinConfig) -> Result<MediaConnection, TransportError>;

    async fn leave(&self) -> Result<(), TransportError>;

    async fn change_role(&self, peer_id: &str, role: &str) -> Result<(), TransportError>;

    async fn remove_peer(&self, peer_id: &str, reason: &str) -> Result<(), TransportError>;

    /// Request a mute change. Returns whether the transport applied it.
    async fn set_mute(&self, peer_id: &str, muted: bool) -> Result<bool, TransportError>;

    async fn end_room(&self, reason: &str) -> Result<(), TransportError>;
}
