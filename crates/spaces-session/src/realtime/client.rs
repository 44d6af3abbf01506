//! Public handle for interacting with the realtime connection.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};

use super::connection::connection_loop;
use super::types::{
    ChannelConfig, RealtimeCommand, RealtimeConfig, RealtimeError, RealtimeEvent, ReplySender,
};

/// Handle to the background connection task.
///
/// Requests resolve once the server replies to them. While disconnected
/// they queue until the connection comes back.
pub struct RealtimeClient {
    command_tx: mpsc::Sender<RealtimeCommand>,
    connected: Arc<RwLock<bool>>,
}

impl RealtimeClient {
    /// Start the background connection. Returns `(client, event_receiver)`.
    pub fn connect(config: RealtimeConfig) -> (Self, mpsc::Receiver<RealtimeEvent>) {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (command_tx, command_rx) = mpsc::channel(64);
        let connected = Arc::new(RwLock::new(false));

        let client = Self {
            command_tx,
            connected: Arc::clone(&connected),
        };

        tokio::spawn(connection_loop(config, connected, event_tx, command_rx));

        (client, event_rx)
    }

    /// A handle whose requests go to `command_tx` instead of a socket.
    #[cfg(test)]
    pub(crate) fn from_commands(command_tx: mpsc::Sender<RealtimeCommand>) -> Self {
        Self {
            command_tx,
            connected: Arc::new(RwLock::new(true)),
        }
    }

    /// A second handle onto the same connection.
    pub fn clone_sender(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            connected: Arc::clone(&self.connected),
        }
    }

    async fn request(
        &self,
        build: impl FnOnce(ReplySender) -> RealtimeCommand,
    ) -> Result<(), RealtimeError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(build(reply))
            .await
            .map_err(|_| RealtimeError::Closed)?;
        rx.await.map_err(|_| RealtimeError::Disconnected)?
    }

    pub async fn join_channel(&self, topic: &str, config: ChannelConfig) -> Result<(), RealtimeError> {
        self.request(|reply| RealtimeCommand::JoinChannel {
            topic: topic.to_string(),
            config,
            reply,
        })
        .await
    }

    pub async fn leave_channel(&self, topic: &str) -> Result<(), RealtimeError> {
        self.request(|reply| RealtimeCommand::LeaveChannel {
            topic: topic.to_string(),
            reply,
        })
        .await
    }

    pub async fn broadcast(
        &self,
        topic: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), RealtimeError> {
        self.request(|reply| RealtimeCommand::Broadcast {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            reply,
        })
        .await
    }

    pub async fn presence_track(
        &self,
        topic: &str,
        payload: serde_json::Value,
    ) -> Result<(), RealtimeError> {
        self.request(|reply| RealtimeCommand::PresenceTrack {
            topic: topic.to_string(),
            payload,
            reply,
        })
        .await
    }

    pub async fn presence_untrack(&self, topic: &str) -> Result<(), RealtimeError> {
        self.request(|reply| RealtimeCommand::PresenceUntrack {
            topic: topic.to_string(),
            reply,
        })
        .await
    }

    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }

    pub async fn disconnect(&self) {
        let _ = self.command_tx.send(RealtimeCommand::Disconnect).await;
    }
}
