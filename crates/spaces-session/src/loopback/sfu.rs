use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::media::{
    MediaConnection, MediaJoinConfig, MediaTransport, PeerInfo, PeerLevel, TransportError,
    TransportEvent,
};

struct SfuPeer {
    info: PeerInfo,
    tx: mpsc::Sender<TransportEvent>,
}

#[derive(Default)]
struct SfuHub {
    rooms: HashMap<String, BTreeMap<String, SfuPeer>>,
    next_peer: u64,
    failing_joins: u32,
    leaves: u32,
}

impl SfuHub {
    fn notify(&self, room_id: &str, except: Option<&str>, event: &TransportEvent) {
        let Some(peers) = self.rooms.get(room_id) else {
            return;
        };
        for (peer_id, peer) in peers {
            if Some(peer_id.as_str()) == except {
                continue;
            }
            if peer.tx.try_send(event.clone()).is_err() {
                warn!(peer_id = %peer_id, "Dropping transport event for slow peer");
            }
        }
    }
}

/// In-memory media room hub. Peer ids are assigned as `peer-1`, `peer-2`, ...
#[derive(Clone, Default)]
pub struct LoopbackSfu {
    hub: Arc<Mutex<SfuHub>>,
}

impl LoopbackSfu {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport handle for one client.
    pub fn transport(&self) -> LoopbackTransport {
        LoopbackTransport {
            hub: Arc::clone(&self.hub),
            session: Mutex::new(None),
        }
    }

    pub fn fail_next_join(&self, times: u32) {
        self.hub.lock().failing_joins += times;
    }

    /// How many connected clients have left their room so far.
    pub fn leave_count(&self) -> u32 {
        self.hub.lock().leaves
    }

    pub fn peers_in(&self, room_id: &str) -> Vec<PeerInfo> {
        self.hub
            .lock()
            .rooms
            .get(room_id)
            .map(|peers| peers.values().map(|p| p.info.clone()).collect())
            .unwrap_or_default()
    }

    /// Deliver a speaker-level reading to every peer of a room.
    pub fn emit_levels(&self, room_id: &str, levels: Vec<PeerLevel>) {
        self.hub
            .lock()
            .notify(room_id, None, &TransportEvent::AudioLevels(levels));
    }

    /// Simulate a peer dropping off the network.
    pub fn drop_peer(&self, room_id: &str, peer_id: &str) {
        let mut hub = self.hub.lock();
        let removed = hub
            .rooms
            .get_mut(room_id)
            .and_then(|peers| peers.remove(peer_id));
        if let Some(peer) = removed {
            hub.notify(room_id, None, &TransportEvent::PeerLeft(peer.info));
        }
    }
}

/// One client's connection to the [`LoopbackSfu`].
pub struct LoopbackTransport {
    hub: Arc<Mutex<SfuHub>>,
    session: Mutex<Option<(String, String)>>,
}

impl LoopbackTransport {
    fn session(&self) -> Result<(String, String), TransportError> {
        self.session.lock().clone().ok_or(TransportError::NotConnected)
    }
}

#[async_trait]
impl MediaTransport for LoopbackTransport {
    async fn join(&self, config: MediaJoinConfig) -> Result<MediaConnection, TransportError> {
        if self.session.lock().is_some() {
            return Err(TransportError::JoinFailed("already connected".into()));
        }
        let (tx, rx) = mpsc::channel(256);
        let (info, roster) = {
            let mut hub = self.hub.lock();
            if hub.failing_joins > 0 {
                hub.failing_joins -= 1;
                return Err(TransportError::JoinFailed("injected join failure".into()));
            }
            hub.next_peer += 1;
            let info = PeerInfo {
                peer_id: format!("peer-{}", hub.next_peer),
                name: config.user_name.clone(),
                role: config.role.clone(),
                metadata: config.metadata.clone(),
                is_local: false,
            };

            hub.notify(&config.room_id, None, &TransportEvent::PeerJoined(info.clone()));
            let peers = hub.rooms.entry(config.room_id.clone()).or_default();
            peers.insert(
                info.peer_id.clone(),
                SfuPeer {
                    info: info.clone(),
                    tx,
                },
            );
            let roster: Vec<PeerInfo> = peers
                .values()
                .map(|p| PeerInfo {
                    is_local: p.info.peer_id == info.peer_id,
                    ..p.info.clone()
                })
                .collect();
            (info, roster)
        };
        let peer_id = info.peer_id.clone();

        *self.session.lock() = Some((config.room_id.clone(), peer_id.clone()));
        debug!(room_id = %config.room_id, peer_id = %peer_id, "Loopback peer joined");
        if config.start_muted {
            // The mute echo comes back through the event stream.
            let _ = self.set_mute(&peer_id, true).await;
        }
        Ok(MediaConnection {
            local_peer: PeerInfo {
                is_local: true,
                ..info
            },
            roster,
            events: rx,
        })
    }

    async fn leave(&self) -> Result<(), TransportError> {
        let Some((room_id, peer_id)) = self.session.lock().take() else {
            return Ok(());
        };
        let mut hub = self.hub.lock();
        hub.leaves += 1;
        let removed = hub
            .rooms
            .get_mut(&room_id)
            .and_then(|peers| peers.remove(&peer_id));
        if let Some(peer) = removed {
            hub.notify(&room_id, None, &TransportEvent::PeerLeft(peer.info));
        }
        if hub.rooms.get(&room_id).is_some_and(|p| p.is_empty()) {
            hub.rooms.remove(&room_id);
        }
        Ok(())
    }

    async fn change_role(&self, peer_id: &str, role: &str) -> Result<(), TransportError> {
        let (room_id, _) = self.session()?;
        let mut hub = self.hub.lock();
        let updated = {
            let peer = hub
                .rooms
                .get_mut(&room_id)
                .and_then(|peers| peers.get_mut(peer_id))
                .ok_or_else(|| TransportError::PeerNotFound(peer_id.to_string()))?;
            peer.info.role = role.to_string();
            let mut meta: serde_json::Value =
                serde_json::from_str(&peer.info.metadata).unwrap_or_else(|_| serde_json::json!({}));
            if let Some(obj) = meta.as_object_mut() {
                obj.insert("role".into(), serde_json::Value::String(role.to_string()));
            }
            peer.info.metadata = meta.to_string();
            peer.info.clone()
        };
        hub.notify(&room_id, None, &TransportEvent::PeerUpdated(updated));
        Ok(())
    }

    async fn remove_peer(&self, peer_id: &str, reason: &str) -> Result<(), TransportError> {
        let (room_id, _) = self.session()?;
        let mut hub = self.hub.lock();
        let removed = hub
            .rooms
            .get_mut(&room_id)
            .and_then(|peers| peers.remove(peer_id))
            .ok_or_else(|| TransportError::PeerNotFound(peer_id.to_string()))?;
        let _ = removed.tx.try_send(TransportEvent::RoomEnded {
            reason: reason.to_string(),
        });
        hub.notify(&room_id, None, &TransportEvent::PeerLeft(removed.info));
        Ok(())
    }

    async fn set_mute(&self, peer_id: &str, muted: bool) -> Result<bool, TransportError> {
        let (room_id, _) = self.session()?;
        let hub = self.hub.lock();
        let known = hub
            .rooms
            .get(&room_id)
            .is_some_and(|peers| peers.contains_key(peer_id));
        if !known {
            return Err(TransportError::PeerNotFound(peer_id.to_string()));
        }
        hub.notify(
            &room_id,
            None,
            &TransportEvent::MuteChanged {
                peer_id: peer_id.to_string(),
                muted,
            },
        );
        Ok(true)
    }

    async fn end_room(&self, reason: &str) -> Result<(), TransportError> {
        let (room_id, peer_id) = self.session()?;
        let mut hub = self.hub.lock();
        hub.notify(
            &room_id,
            Some(&peer_id),
            &TransportEvent::RoomEnded {
                reason: reason.to_string(),
            },
        );
        hub.rooms.remove(&room_id);
        drop(hub);
        *self.session.lock() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(room: &str, name: &str) -> MediaJoinConfig {
        MediaJoinConfig {
            room_id: room.into(),
            auth_token: "t".into(),
            user_name: name.into(),
            role: "speaker".into(),
            metadata: "{}".into(),
            start_muted: false,
        }
    }

    #[tokio::test]
    async fn second_peer_is_announced_to_first() {
        let sfu = LoopbackSfu::new();
        let a = sfu.transport();
        let b = sfu.transport();

        let mut conn_a = a.join(config("r", "a")).await.unwrap();
        let conn_b = b.join(config("r", "b")).await.unwrap();

        assert_eq!(conn_b.roster.len(), 2);
        match conn_a.events.recv().await {
            Some(TransportEvent::PeerJoined(peer)) => assert_eq!(peer.peer_id, conn_b.local_peer.peer_id),
            other => panic!("unexpected {other:?}"),
        }

        b.leave().await.unwrap();
        assert!(matches!(conn_a.events.recv().await, Some(TransportEvent::PeerLeft(_))));
        assert_eq!(sfu.peers_in("r").len(), 1);
    }

    #[tokio::test]
    async fn injected_join_failure() {
        let sfu = LoopbackSfu::new();
        sfu.fail_next_join(1);
        let t = sfu.transport();
        assert!(t.join(config("r", "a")).await.is_err());
        assert!(t.join(config("r", "a")).await.is_ok());
    }

    #[tokio::test]
    async fn end_room_reaches_other_peers() {
        let sfu = LoopbackSfu::new();
        let host = sfu.transport();
        let guest = sfu.transport();
        let _h = host.join(config("r", "h")).await.unwrap();
        let mut g = guest.join(config("r", "g")).await.unwrap();

        host.end_room("done").await.unwrap();
        assert!(matches!(
            g.events.recv().await,
            Some(TransportEvent::RoomEnded { ref reason }) if reason == "done"
        ));
        assert!(sfu.peers_in("r").is_empty());
    }
}
