//! [`PresenceBus`] implementation over the realtime client.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::client::RealtimeClient;
use super::types::{
    BroadcastConfig, ChannelConfig, ChannelPresence, RealtimeConfig, RealtimeError, RealtimeEvent,
};
use crate::presence::{BusError, BusMessage, PresenceBus, PresenceMember};

type PresenceMap = HashMap<String, Vec<serde_json::Value>>;

struct TopicState {
    presence: PresenceMap,
    tx: broadcast::Sender<BusMessage>,
    /// `true` once a `presence_state` snapshot arrived for the current join.
    synced: watch::Sender<bool>,
}

impl TopicState {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        let (synced, _) = watch::channel(false);
        Self {
            presence: HashMap::new(),
            tx,
            synced,
        }
    }
}

type Topics = Arc<Mutex<HashMap<String, TopicState>>>;

/// Presence bus backed by one realtime connection.
///
/// The local client is tracked under `presence_key` on every channel.
pub struct RealtimeBus {
    client: RealtimeClient,
    presence_key: String,
    access_token: Option<String>,
    topics: Topics,
    dispatcher: JoinHandle<()>,
}

impl RealtimeBus {
    pub fn connect(config: RealtimeConfig, presence_key: &str) -> Self {
        let access_token = config.access_token.clone();
        let (client, events) = RealtimeClient::connect(config);
        Self::from_client(client, events, presence_key, access_token)
    }

    pub(crate) fn from_client(
        client: RealtimeClient,
        events: mpsc::Receiver<RealtimeEvent>,
        presence_key: &str,
        access_token: Option<String>,
    ) -> Self {
        let topics: Topics = Arc::new(Mutex::new(HashMap::new()));
        let dispatcher = tokio::spawn(dispatch(events, Arc::clone(&topics)));
        Self {
            client,
            presence_key: presence_key.to_string(),
            access_token,
            topics,
            dispatcher,
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.client.is_connected().await
    }

    pub async fn shutdown(&self) {
        self.client.disconnect().await;
    }

    fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            broadcast: BroadcastConfig {
                self_send: true,
                ack: true,
            },
            presence: ChannelPresence {
                key: self.presence_key.clone(),
            },
            access_token: self.access_token.clone(),
        }
    }

    fn ensure_attached(&self, channel: &str) -> Result<(), BusError> {
        if self.topics.lock().contains_key(channel) {
            Ok(())
        } else {
            Err(BusError::NotAttached(channel.to_string()))
        }
    }
}

impl Drop for RealtimeBus {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

fn map_err(channel: &str, err: RealtimeError) -> BusError {
    match err {
        RealtimeError::Rejected(reason) => BusError::Rejected {
            channel: channel.to_string(),
            reason,
        },
        RealtimeError::Closed | RealtimeError::Disconnected => BusError::Disconnected,
    }
}

#[async_trait]
impl PresenceBus for RealtimeBus {
    async fn attach(&self, channel: &str) -> Result<(), BusError> {
        self.topics
            .lock()
            .entry(channel.to_string())
            .or_insert_with(TopicState::new);
        if let Err(e) = self.client.join_channel(channel, self.channel_config()).await {
            self.topics.lock().remove(channel);
            return Err(map_err(channel, e));
        }
        Ok(())
    }

    async fn detach(&self, channel: &str) -> Result<(), BusError> {
        self.topics.lock().remove(channel);
        self.client
            .leave_channel(channel)
            .await
            .map_err(|e| map_err(channel, e))
    }

    async fn enter(&self, channel: &str, data: serde_json::Value) -> Result<(), BusError> {
        self.ensure_attached(channel)?;
        self.client
            .presence_track(channel, data)
            .await
            .map_err(|e| map_err(channel, e))
    }

    async fn leave(&self, channel: &str, _data: serde_json::Value) -> Result<(), BusError> {
        self.ensure_attached(channel)?;
        self.client
            .presence_untrack(channel)
            .await
            .map_err(|e| map_err(channel, e))
    }

    /// Waits for the channel's first presence snapshot, so a fresh attach
    /// never reports an empty room. The gateway bounds the wait.
    async fn members(&self, channel: &str) -> Result<Vec<PresenceMember>, BusError> {
        let mut synced = self
            .topics
            .lock()
            .get(channel)
            .map(|state| state.synced.subscribe())
            .ok_or_else(|| BusError::NotAttached(channel.to_string()))?;
        synced
            .wait_for(|ready| *ready)
            .await
            .map_err(|_| BusError::NotAttached(channel.to_string()))?;

        let topics = self.topics.lock();
        let state = topics
            .get(channel)
            .ok_or_else(|| BusError::NotAttached(channel.to_string()))?;
        Ok(members_of(&state.presence))
    }

    async fn publish(
        &self,
        channel: &str,
        event: &str,
        data: serde_json::Value,
    ) -> Result<(), BusError> {
        self.ensure_attached(channel)?;
        self.client
            .broadcast(channel, event, data)
            .await
            .map_err(|e| map_err(channel, e))
    }

    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<BusMessage>, BusError> {
        self.topics
            .lock()
            .get(channel)
            .map(|state| state.tx.subscribe())
            .ok_or_else(|| BusError::NotAttached(channel.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Presence Cache
// ---------------------------------------------------------------------------

/// First meta per key, without the server's bookkeeping fields.
pub(crate) fn members_of(presence: &PresenceMap) -> Vec<PresenceMember> {
    let mut members: Vec<PresenceMember> = presence
        .iter()
        .filter_map(|(key, metas)| {
            let mut data = metas.first()?.clone();
            if let Some(obj) = data.as_object_mut() {
                obj.remove("phx_ref");
                obj.remove("phx_ref_prev");
            }
            Some(PresenceMember {
                client_id: key.clone(),
                data,
            })
        })
        .collect();
    members.sort_by(|a, b| a.client_id.cmp(&b.client_id));
    members
}

fn phx_ref(meta: &serde_json::Value) -> Option<&str> {
    meta.get("phx_ref").and_then(|r| r.as_str())
}

pub(crate) fn apply_presence_diff(presence: &mut PresenceMap, joins: PresenceMap, leaves: &PresenceMap) {
    for (key, left) in leaves {
        if let Some(metas) = presence.get_mut(key) {
            metas.retain(|m| {
                !left
                    .iter()
                    .any(|l| phx_ref(l).is_some() && phx_ref(l) == phx_ref(m))
            });
            if metas.is_empty() {
                presence.remove(key);
            }
        }
    }
    for (key, joined) in joins {
        let metas = presence.entry(key).or_default();
        for meta in joined {
            let dup = phx_ref(&meta).is_some() && metas.iter().any(|m| phx_ref(m) == phx_ref(&meta));
            if !dup {
                metas.push(meta);
            }
        }
    }
}

async fn dispatch(mut events: mpsc::Receiver<RealtimeEvent>, topics: Topics) {
    while let Some(event) = events.recv().await {
        match event {
            RealtimeEvent::Broadcast {
                topic,
                event,
                payload,
            } => {
                if let Some(state) = topics.lock().get(&topic) {
                    let _ = state.tx.send(BusMessage {
                        channel: topic.clone(),
                        event,
                        data: payload,
                    });
                }
            }
            RealtimeEvent::PresenceState { topic, state } => {
                if let Some(entry) = topics.lock().get_mut(&topic) {
                    entry.presence = state;
                    entry.synced.send_replace(true);
                }
            }
            RealtimeEvent::PresenceDiff {
                topic,
                joins,
                leaves,
            } => {
                if let Some(entry) = topics.lock().get_mut(&topic) {
                    apply_presence_diff(&mut entry.presence, joins, &leaves);
                }
            }
            RealtimeEvent::Connected => info!("Presence bus connected"),
            RealtimeEvent::Disconnected => {
                warn!("Presence bus disconnected");
                for state in topics.lock().values_mut() {
                    state.presence.clear();
                    state.synced.send_replace(false);
                }
            }
            RealtimeEvent::ChannelJoined { topic } => debug!(topic = %topic, "Channel ready"),
            RealtimeEvent::ChannelError { topic, message } => {
                warn!(topic = %topic, message = %message, "Channel error");
            }
            RealtimeEvent::Error(message) => warn!(message = %message, "Realtime error"),
        }
    }
}
