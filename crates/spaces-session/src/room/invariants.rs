use std::collections::HashSet;

use tracing::warn;

use super::{Participant, ParticipantRole, Room};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("participant {user_id} appears more than once in room {room_id}")]
    DuplicateParticipant { room_id: String, user_id: String },

    #[error("host {host_id} missing from active room {room_id}")]
    MissingHost { room_id: String, host_id: String },
}

impl Room {
    /// Check the aggregate invariants: unique user ids, and a host entry
    /// while the room is active.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let mut seen = HashSet::new();
        for p in &self.participants {
            if !seen.insert(p.user_id.as_str()) {
                return Err(InvariantViolation::DuplicateParticipant {
                    room_id: self.id.clone(),
                    user_id: p.user_id.clone(),
                });
            }
        }
        if self.active && self.host().is_none() {
            return Err(InvariantViolation::MissingHost {
                room_id: self.id.clone(),
                host_id: self.host_id.clone(),
            });
        }
        Ok(())
    }

    /// Re-derive a consistent room from a possibly broken one.
    ///
    /// Duplicates collapse into a single entry, preferring the one with a
    /// live peer id. A missing host is restored from `previous`, or from a
    /// placeholder when no earlier copy exists.
    ///
    /// `previous` is the last committed copy, which was itself reconciled
    /// against the transport roster. The restored host therefore carries the
    /// roster's last known peer id, and the media adapter's next reconcile
    /// (run on every transport event) re-derives it from the live roster.
    pub fn repaired(&self, previous: Option<&Room>) -> Room {
        let mut next = self.clone();
        let mut deduped: Vec<Participant> = Vec::with_capacity(next.participants.len());
        for p in next.participants.drain(..) {
            match deduped.iter_mut().find(|d| d.user_id == p.user_id) {
                Some(existing) => {
                    warn!(room_id = %self.id, user_id = %p.user_id, "Dropping duplicate participant");
                    if existing.peer_id.is_none() && p.peer_id.is_some() {
                        *existing = p;
                    }
                }
                None => deduped.push(p),
            }
        }
        next.participants = deduped;

        if next.active && next.host().is_none() {
            warn!(room_id = %self.id, host_id = %self.host_id, "Restoring missing host");
            let host = previous
                .and_then(|r| r.host().cloned())
                .unwrap_or_else(|| Participant {
                    user_id: next.host_id.clone(),
                    display_name: String::new(),
                    username: String::new(),
                    avatar_url: None,
                    peer_id: None,
                    muted: false,
                    role: ParticipantRole::Host,
                    topic: next.topic.clone(),
                    location: None,
                });
            next.participants.insert(0, host);
        }
        next
    }
}
