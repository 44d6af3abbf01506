use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use spaces_config::SpeakerConfig;
use tracing::{debug, info, warn};

use super::{PeerInfo, PeerMetadata, TrackBook, TransportEvent};
use crate::room::{ParticipantKey, ParticipantRole, Room};
use crate::speaker::{AudioLevelSample, LevelPair, SpeakerRole, SpeakerTracker};

/// What the caller knows about the local session when an event arrives.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdapterContext {
    pub recording_active: bool,
    pub local_is_host: bool,
}

/// Follow-up work an event requires beyond the room mutation itself.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEffect {
    /// Too few peers remain for the running capture session.
    StopRecording,
    ActiveSpeaker(Option<SpeakerRole>),
    RoomEnded(String),
    /// The transport disagreed with the local mute flag and won.
    LocalMuteCorrected(bool),
}

#[derive(Debug, Default)]
pub struct Reconciliation {
    /// The reconciled room, present only when it differs from the input.
    pub room: Option<Room>,
    pub effects: Vec<AdapterEffect>,
}

/// Reconciles the media transport roster, the ground truth for who is
/// connected, with the room's participant list.
#[derive(Debug)]
pub struct MediaRoomAdapter {
    local_user_id: String,
    local_peer_id: Option<String>,
    roster: BTreeMap<String, PeerInfo>,
    host_seen: bool,
    tracks: TrackBook,
    local_muted: bool,
    speaker: SpeakerTracker,
    min_peers: usize,
}

impl MediaRoomAdapter {
    pub fn new(local_user_id: impl Into<String>, speaker: &SpeakerConfig, min_peers: u32) -> Self {
        Self {
            local_user_id: local_user_id.into(),
            local_peer_id: None,
            roster: BTreeMap::new(),
            host_seen: false,
            tracks: TrackBook::default(),
            local_muted: false,
            speaker: SpeakerTracker::new(speaker),
            min_peers: min_peers as usize,
        }
    }

    /// Adopt the roster of a freshly joined media room.
    pub fn connected(&mut self, local: PeerInfo, roster: Vec<PeerInfo>, start_muted: bool) {
        self.reset();
        self.local_peer_id = Some(local.peer_id.clone());
        self.local_muted = start_muted;
        for peer in roster {
            self.roster.insert(peer.peer_id.clone(), peer);
        }
        self.roster.insert(local.peer_id.clone(), local);
    }

    pub fn reset(&mut self) {
        self.local_peer_id = None;
        self.roster.clear();
        self.host_seen = false;
        self.tracks.clear();
        self.local_muted = false;
        self.speaker.reset();
    }

    pub fn is_connected(&self) -> bool {
        self.local_peer_id.is_some()
    }

    pub fn local_peer_id(&self) -> Option<&str> {
        self.local_peer_id.as_deref()
    }

    pub fn connected_peers(&self) -> usize {
        self.roster.len()
    }

    pub fn host_seen(&self) -> bool {
        self.host_seen
    }

    pub fn local_muted(&self) -> bool {
        self.local_muted
    }

    pub fn set_local_muted(&mut self, muted: bool) {
        self.local_muted = muted;
    }

    pub fn tracks(&self) -> &TrackBook {
        &self.tracks
    }

    /// Live peer id for every user in the roster.
    pub fn peer_ids_by_user(&self) -> HashMap<String, String> {
        self.decoded()
            .filter(|(_, meta)| !meta.user_id.is_empty())
            .map(|(peer, meta)| (meta.user_id, peer.peer_id.clone()))
            .collect()
    }

    fn decoded(&self) -> impl Iterator<Item = (&PeerInfo, PeerMetadata)> {
        self.roster
            .values()
            .map(|p| (p, PeerMetadata::decode(&p.metadata, &p.name, &p.role)))
    }

    /// Rebuild the participant list against the current roster.
    ///
    /// Connected peers are matched by user id. Unknown on-stage peers are
    /// inserted, listeners are taken off stage, and confirmed participants
    /// whose peer has gone are dropped. The host is never dropped; when its
    /// peer disappears without a replacement its peer id is cleared instead.
    pub fn reconcile(&mut self, room: &Room) -> Room {
        let mut next = room.clone();
        let live: Vec<(PeerInfo, PeerMetadata)> =
            self.decoded().map(|(p, m)| (p.clone(), m)).collect();

        for (peer, meta) in &live {
            if meta.user_id.is_empty() {
                debug!(peer_id = %peer.peer_id, "Peer without user id, skipping");
                continue;
            }
            let is_host = room.is_host(&meta.user_id);
            if is_host && !self.host_seen {
                self.host_seen = true;
                info!(space_id = %room.id, peer_id = %peer.peer_id, "Host connected to media");
            }

            let mut incoming = meta.to_participant(&peer.peer_id);
            let existing = next.participant(&meta.user_id).cloned();
            if let Some(existing) = &existing {
                incoming.muted = existing.muted;
            }

            if is_host {
                incoming.role = ParticipantRole::Host;
                next = next.add_participant(incoming);
            } else if meta.role.is_on_stage() {
                next = next.add_participant(incoming);
            } else {
                next = next
                    .remove_participant(ParticipantKey::Peer(&peer.peer_id))
                    .remove_participant(ParticipantKey::User(&meta.user_id));
            }
        }

        let stale: Vec<(String, String)> = next
            .participants
            .iter()
            .filter_map(|p| {
                let peer_id = p.peer_id.as_ref()?;
                (!self.roster.contains_key(peer_id)).then(|| (p.user_id.clone(), peer_id.clone()))
            })
            .collect();
        for (user_id, peer_id) in stale {
            if next.is_host(&user_id) {
                debug!(space_id = %room.id, peer_id = %peer_id, "Host peer gone, keeping host entry");
                next = next.set_peer_id(&user_id, None);
            } else {
                next = next.remove_participant(ParticipantKey::Peer(&peer_id));
            }
        }

        next
    }

    /// Apply one transport event to `room`.
    pub fn apply(
        &mut self,
        room: &Room,
        event: &TransportEvent,
        ctx: AdapterContext,
    ) -> Reconciliation {
        let mut out = Reconciliation::default();
        let mut roster_changed = false;
        let mut next = None;

        match event {
            TransportEvent::PeerJoined(peer) | TransportEvent::PeerUpdated(peer) => {
                self.roster.insert(peer.peer_id.clone(), peer.clone());
                next = Some(self.reconcile(room));
                roster_changed = true;
            }
            TransportEvent::PeerLeft(peer) => {
                self.roster.remove(&peer.peer_id);
                self.tracks.remove_peer(&peer.peer_id);
                next = Some(self.reconcile(room));
                roster_changed = true;
            }
            TransportEvent::TrackAdded(track) => {
                if Some(track.peer_id.as_str()) == self.local_peer_id.as_deref() {
                    self.tracks.set_own(track.clone());
                } else if !self.tracks.add_other(track.clone()) {
                    debug!(track_id = %track.track_id, "Track already known");
                }
            }
            TransportEvent::TrackRemoved(track) => {
                if !self.tracks.clear_own(&track.track_id) {
                    self.tracks.remove_other(&track.track_id);
                }
            }
            TransportEvent::MuteChanged { peer_id, muted } => {
                if Some(peer_id.as_str()) == self.local_peer_id.as_deref()
                    && self.local_muted != *muted
                {
                    debug!(muted, "Transport overrides local mute flag");
                    self.local_muted = *muted;
                    out.effects.push(AdapterEffect::LocalMuteCorrected(*muted));
                }
                let user_id = room
                    .participant_by_peer(peer_id)
                    .map(|p| p.user_id.clone())
                    .or_else(|| {
                        (Some(peer_id.as_str()) == self.local_peer_id.as_deref())
                            .then(|| self.local_user_id.clone())
                    });
                match user_id {
                    Some(user_id) => next = Some(room.set_mute(&user_id, *muted)),
                    None => debug!(peer_id = %peer_id, "Mute change for unknown peer"),
                }
            }
            TransportEvent::AudioLevels(levels) => {
                let now = Instant::now();
                let samples: Vec<AudioLevelSample> = levels
                    .iter()
                    .map(|l| AudioLevelSample {
                        role: self.speaker_role(room, &l.peer_id),
                        level: l.level,
                        at: now,
                    })
                    .collect();
                if let Some(change) = self.speaker.observe(LevelPair::from_samples(&samples)) {
                    out.effects.push(AdapterEffect::ActiveSpeaker(change));
                }
            }
            TransportEvent::RoomEnded { reason } => {
                out.effects.push(AdapterEffect::RoomEnded(reason.clone()));
            }
            TransportEvent::Error(message) => {
                warn!(space_id = %room.id, error = %message, "Media transport error");
            }
        }

        if roster_changed
            && ctx.recording_active
            && ctx.local_is_host
            && self.connected_peers() < self.min_peers
        {
            info!(
                space_id = %room.id,
                peers = self.connected_peers(),
                "Too few peers left, stopping capture"
            );
            out.effects.push(AdapterEffect::StopRecording);
        }

        out.room = next.filter(|r| r != room);
        out
    }

    fn speaker_role(&self, room: &Room, peer_id: &str) -> SpeakerRole {
        let user_id = self
            .roster
            .get(peer_id)
            .map(|p| PeerMetadata::decode(&p.metadata, &p.name, &p.role).user_id)
            .or_else(|| room.participant_by_peer(peer_id).map(|p| p.user_id.clone()));
        match user_id {
            Some(id) if room.is_host(&id) => SpeakerRole::Host,
            _ => SpeakerRole::Visitor,
        }
    }
}
