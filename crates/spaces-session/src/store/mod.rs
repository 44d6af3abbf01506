//! The single observable state object the UI reads.
//!
//! Rooms live in one backing list; `selected_space` and
//! `current_viewing_space` are ids into it, so a view can never hold a copy
//! that diverges from the authoritative room. The id→index map is rebuilt
//! after every structural change. All mutation goes through
//! [`StoreHandle::update`], which publishes the resulting [`Event`]s once
//! the lock is released.

mod handle;
mod snapshot;

pub use handle::{JoinGuard, StoreHandle};
pub use snapshot::{SpaceSnapshot, StoreView};

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use spaces_common::{Event, Toast, ToastQueue};
use tracing::{debug, warn};

use crate::room::Room;
use crate::speaker::SpeakerRole;

/// Management tokens are treated as expired this long before their real expiry.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 30;

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct LocalStore {
    rooms: Vec<Room>,
    index: HashMap<String, usize>,
    selected_space: Option<String>,
    current_viewing_space: Option<String>,
    is_in_space: bool,
    is_joining: bool,
    is_recording: bool,
    recording_ceiling: u32,
    recording_time_remaining: u32,
    active_speaker: Option<SpeakerRole>,
    management_token: Option<CachedToken>,
    joins_in_flight: HashSet<String>,
    toasts: ToastQueue,
    pending: Vec<Event>,
}

impl LocalStore {
    pub fn new(recording_ceiling: u32) -> Self {
        Self {
            rooms: Vec::new(),
            index: HashMap::new(),
            selected_space: None,
            current_viewing_space: None,
            is_in_space: false,
            is_joining: false,
            is_recording: false,
            recording_ceiling,
            recording_time_remaining: recording_ceiling,
            active_speaker: None,
            management_token: None,
            joins_in_flight: HashSet::new(),
            toasts: ToastQueue::default(),
            pending: Vec::new(),
        }
    }

    // -- reads ---------------------------------------------------------------

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn room(&self, id: &str) -> Option<&Room> {
        self.index.get(id).and_then(|&i| self.rooms.get(i))
    }

    pub fn selected_space(&self) -> Option<&Room> {
        self.selected_space.as_deref().and_then(|id| self.room(id))
    }

    pub fn current_viewing_space(&self) -> Option<&Room> {
        self.current_viewing_space
            .as_deref()
            .and_then(|id| self.room(id))
    }

    pub fn selected_space_id(&self) -> Option<&str> {
        self.selected_space.as_deref()
    }

    pub fn current_viewing_space_id(&self) -> Option<&str> {
        self.current_viewing_space.as_deref()
    }

    pub fn is_in_space(&self) -> bool {
        self.is_in_space
    }

    pub fn is_joining(&self) -> bool {
        self.is_joining
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    pub fn recording_time_remaining(&self) -> u32 {
        self.recording_time_remaining
    }

    pub fn recording_ceiling(&self) -> u32 {
        self.recording_ceiling
    }

    pub fn active_speaker(&self) -> Option<SpeakerRole> {
        self.active_speaker
    }

    pub fn join_in_flight(&self, space_id: &str) -> bool {
        self.joins_in_flight.contains(space_id)
    }

    // -- rooms ---------------------------------------------------------------

    /// Write a room back to the backing list, repairing it first if it
    /// breaks an aggregate invariant.
    ///
    /// The store holds no transport roster. The committed copy stands in for
    /// it, see [`Room::repaired`].
    pub fn upsert_room(&mut self, room: Room) {
        let previous = self.room(&room.id).cloned();
        let room = match room.check_invariants() {
            Ok(()) => room,
            Err(violation) => {
                warn!(space_id = %room.id, %violation, "Repairing room before commit");
                room.repaired(previous.as_ref())
            }
        };
        if previous.as_ref() == Some(&room) {
            return;
        }
        match self.index.get(&room.id).copied() {
            Some(i) => self.rooms[i] = room,
            None => {
                self.rooms.push(room);
                self.rebuild_index();
            }
        }
        self.pending.push(Event::RoomsChanged);
    }

    /// Apply a pure transform to a stored room and commit the result.
    /// Returns the committed room, or `None` if the room is unknown.
    pub fn update_room(&mut self, id: &str, f: impl FnOnce(&Room) -> Room) -> Option<Room> {
        let next = f(self.room(id)?);
        self.upsert_room(next);
        self.room(id).cloned()
    }

    /// Destroy a room and clear any view that pointed at it.
    pub fn remove_room(&mut self, id: &str) -> Option<Room> {
        let i = self.index.get(id).copied()?;
        let removed = self.rooms.remove(i);
        self.rebuild_index();
        if self.selected_space.as_deref() == Some(id) {
            self.set_selected_space(None);
        }
        if self.current_viewing_space.as_deref() == Some(id) {
            self.set_current_viewing_space(None);
        }
        self.pending.push(Event::RoomsChanged);
        Some(removed)
    }

    /// Recompute the id→index lookup. Called after every insert/remove.
    pub(crate) fn rebuild_index(&mut self) {
        self.index = self
            .rooms
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();
    }

    // -- views and flags -----------------------------------------------------

    pub fn set_selected_space(&mut self, id: Option<String>) {
        if self.selected_space != id {
            self.selected_space = id.clone();
            self.pending.push(Event::SelectedSpaceChanged(id));
        }
    }

    pub fn set_current_viewing_space(&mut self, id: Option<String>) {
        if self.current_viewing_space != id {
            self.current_viewing_space = id.clone();
            self.pending.push(Event::CurrentViewingSpaceChanged(id));
        }
    }

    pub fn set_in_space(&mut self, value: bool) {
        if self.is_in_space != value {
            self.is_in_space = value;
            self.pending.push(Event::InSpaceChanged(value));
        }
    }

    pub fn set_recording(&mut self, value: bool) {
        if self.is_recording != value {
            self.is_recording = value;
            self.pending.push(Event::RecordingChanged(value));
        }
    }

    pub fn set_recording_time_remaining(&mut self, secs: u32) {
        if self.recording_time_remaining != secs {
            self.recording_time_remaining = secs;
            self.pending.push(Event::RecordingTimeRemaining(secs));
        }
    }

    pub fn reset_recording_time(&mut self) {
        self.set_recording_time_remaining(self.recording_ceiling);
    }

    pub fn set_active_speaker(&mut self, speaker: Option<SpeakerRole>) {
        if self.active_speaker != speaker {
            self.active_speaker = speaker;
            self.pending.push(Event::ActiveSpeakerChanged(
                speaker.map(|s| s.as_str().to_string()),
            ));
        }
    }

    // -- joins ---------------------------------------------------------------

    /// Claim the per-room join lock. Returns `false` if a join for this room
    /// is already running.
    pub(crate) fn begin_join(&mut self, space_id: &str) -> bool {
        if !self.joins_in_flight.insert(space_id.to_string()) {
            return false;
        }
        self.set_joining(true);
        true
    }

    pub(crate) fn finish_join(&mut self, space_id: &str) {
        self.joins_in_flight.remove(space_id);
        let still_joining = !self.joins_in_flight.is_empty();
        self.set_joining(still_joining);
    }

    fn set_joining(&mut self, value: bool) {
        if self.is_joining != value {
            self.is_joining = value;
            self.pending.push(Event::JoiningChanged(value));
        }
    }

    // -- snapshots -----------------------------------------------------------

    pub fn snapshot_space(&self, space_id: &str) -> SpaceSnapshot {
        SpaceSnapshot {
            space_id: space_id.to_string(),
            room: self.room(space_id).cloned(),
            selected_space: self.selected_space.clone(),
            current_viewing_space: self.current_viewing_space.clone(),
            is_in_space: self.is_in_space,
        }
    }

    /// Put a room and both views back to a snapshot. Restoring the same
    /// snapshot twice leaves the store unchanged the second time.
    pub fn restore_space(&mut self, snapshot: &SpaceSnapshot) {
        match &snapshot.room {
            Some(room) => self.upsert_room(room.clone()),
            None => {
                self.remove_room(&snapshot.space_id);
            }
        }
        self.set_selected_space(snapshot.selected_space.clone());
        self.set_current_viewing_space(snapshot.current_viewing_space.clone());
        self.set_in_space(snapshot.is_in_space);
        debug!(space_id = %snapshot.space_id, "Restored space snapshot");
    }

    // -- management token cache ---------------------------------------------

    pub fn management_token(&self, now: DateTime<Utc>) -> Option<&str> {
        self.management_token
            .as_ref()
            .filter(|t| t.expires_at - Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS) > now)
            .map(|t| t.token.as_str())
    }

    pub fn cache_management_token(&mut self, token: String, expires_at: DateTime<Utc>) {
        self.management_token = Some(CachedToken { token, expires_at });
    }

    pub fn invalidate_management_token(&mut self) {
        self.management_token = None;
    }

    // -- toasts --------------------------------------------------------------

    pub fn push_toast(&mut self, toast: Toast) {
        self.pending.push(Event::Toast {
            level: toast.level,
            message: toast.message.clone(),
        });
        self.toasts.push(toast);
    }

    pub(crate) fn toasts_mut(&mut self) -> &mut ToastQueue {
        &mut self.toasts
    }

    // -- lifecycle -----------------------------------------------------------

    /// Drop every room, view, flag and cached token. Used on logout.
    pub fn clear(&mut self) {
        let had_rooms = !self.rooms.is_empty();
        self.rooms.clear();
        self.rebuild_index();
        self.set_selected_space(None);
        self.set_current_viewing_space(None);
        self.set_in_space(false);
        self.set_recording(false);
        self.reset_recording_time();
        self.set_active_speaker(None);
        self.joins_in_flight.clear();
        self.set_joining(false);
        self.management_token = None;
        if had_rooms {
            self.pending.push(Event::RoomsChanged);
        }
    }

    pub fn view(&self) -> StoreView {
        StoreView {
            rooms: self.rooms.clone(),
            selected_space: self.selected_space().cloned(),
            current_viewing_space: self.current_viewing_space().cloned(),
            is_in_space: self.is_in_space,
            is_joining: self.is_joining,
            is_recording: self.is_recording,
            recording_time_remaining: self.recording_time_remaining,
            active_speaker: self.active_speaker,
        }
    }

    pub(crate) fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.pending)
    }
}
