use serde::{Deserialize, Serialize};

use super::queue::merge_queue;
use super::{Participant, ParticipantRole, QueueEntry};

/// One hosted conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub host_id: String,
    #[serde(default)]
    pub topic: Option<String>,
    /// Media transport room id, assigned when the host admits a visitor.
    #[serde(default)]
    pub transport_room_id: Option<String>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub queue: Vec<QueueEntry>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Selects participants for removal either by transport peer id or by user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantKey<'a> {
    Peer(&'a str),
    User(&'a str),
}

impl Room {
    pub fn new(id: impl Into<String>, host: Participant) -> Self {
        let host = Participant {
            role: ParticipantRole::Host,
            ..host
        };
        Self {
            id: id.into(),
            host_id: host.user_id.clone(),
            topic: None,
            transport_room_id: None,
            participants: vec![host],
            queue: Vec::new(),
            active: true,
        }
    }

    pub fn host(&self) -> Option<&Participant> {
        self.participant(&self.host_id)
    }

    pub fn is_host(&self, user_id: &str) -> bool {
        self.host_id == user_id
    }

    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    pub fn participant_by_peer(&self, peer_id: &str) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.peer_id.as_deref() == Some(peer_id))
    }

    pub fn non_host_participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| p.user_id != self.host_id)
    }

    /// Insert a participant, or merge it into the existing entry with the
    /// same user id. The host keeps the host role whatever `participant` says.
    pub fn add_participant(&self, participant: Participant) -> Room {
        let mut next = self.clone();
        let incoming = if participant.user_id == self.host_id {
            Participant {
                role: ParticipantRole::Host,
                ..participant
            }
        } else {
            participant
        };
        match next
            .participants
            .iter_mut()
            .find(|p| p.user_id == incoming.user_id)
        {
            Some(existing) => *existing = existing.merged_with(&incoming),
            None => next.participants.push(incoming),
        }
        next.queue.retain(|e| {
            next.participants
                .iter()
                .all(|p| p.user_id != e.user_id || !p.role.is_on_stage())
        });
        next
    }

    /// Remove matching participants. The host is never removed while the
    /// room is active; use [`Room::ended`] for that.
    pub fn remove_participant(&self, key: ParticipantKey<'_>) -> Room {
        let mut next = self.clone();
        let host_id = self.host_id.clone();
        let active = self.active;
        next.participants.retain(|p| {
            let matches = match key {
                ParticipantKey::Peer(peer) => p.peer_id.as_deref() == Some(peer),
                ParticipantKey::User(user) => p.user_id == user,
            };
            !matches || (active && p.user_id == host_id)
        });
        next
    }

    pub fn set_mute(&self, user_id: &str, muted: bool) -> Room {
        let mut next = self.clone();
        if let Some(p) = next.participants.iter_mut().find(|p| p.user_id == user_id) {
            p.muted = muted;
        }
        next
    }

    pub fn set_peer_id(&self, user_id: &str, peer_id: Option<String>) -> Room {
        let mut next = self.clone();
        if let Some(p) = next.participants.iter_mut().find(|p| p.user_id == user_id) {
            p.peer_id = peer_id;
        }
        next
    }

    /// Set or clear the topic. Blank topics are stored as `None`.
    pub fn set_topic(&self, topic: Option<String>) -> Room {
        let mut next = self.clone();
        next.topic = topic
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if let Some(host) = next
            .participants
            .iter_mut()
            .find(|p| p.user_id == self.host_id)
        {
            host.topic = next.topic.clone();
        }
        next
    }

    pub fn set_transport_room(&self, transport_room_id: Option<String>) -> Room {
        let mut next = self.clone();
        next.transport_room_id = transport_room_id;
        next
    }

    pub fn reconcile_queue(&self, entries: Vec<QueueEntry>) -> Room {
        let mut next = self.clone();
        next.queue = merge_queue(&self.queue, entries, |user_id| {
            self.participant(user_id)
                .map(|p| p.role.is_on_stage())
                .unwrap_or(false)
        });
        next
    }

    /// Mark the room as ended and drop everyone, the host included.
    pub fn ended(&self) -> Room {
        let mut next = self.clone();
        next.active = false;
        next.participants.clear();
        next.queue.clear();
        next.transport_room_id = None;
        next
    }
}
