use std::collections::BTreeMap;

use super::TrackInfo;

/// Local track references: one outbound track and the inbound set.
#[derive(Debug, Default)]
pub struct TrackBook {
    own: Option<TrackInfo>,
    others: BTreeMap<String, TrackInfo>,
}

impl TrackBook {
    pub fn own(&self) -> Option<&TrackInfo> {
        self.own.as_ref()
    }

    pub fn set_own(&mut self, track: TrackInfo) {
        self.own = Some(track);
    }

    pub fn clear_own(&mut self, track_id: &str) -> bool {
        if self.own.as_ref().map(|t| t.track_id.as_str()) == Some(track_id) {
            self.own = None;
            return true;
        }
        false
    }

    /// Returns `false` if the track was already known.
    pub fn add_other(&mut self, track: TrackInfo) -> bool {
        if self.others.contains_key(&track.track_id) {
            return false;
        }
        self.others.insert(track.track_id.clone(), track);
        true
    }

    pub fn remove_other(&mut self, track_id: &str) -> bool {
        self.others.remove(track_id).is_some()
    }

    /// Drop every inbound track of a departed peer.
    pub fn remove_peer(&mut self, peer_id: &str) -> usize {
        let before = self.others.len();
        self.others.retain(|_, t| t.peer_id != peer_id);
        before - self.others.len()
    }

    pub fn other_count(&self) -> usize {
        self.others.len()
    }

    pub fn contains(&self, track_id: &str) -> bool {
        self.others.contains_key(track_id)
            || self.own.as_ref().map(|t| t.track_id.as_str()) == Some(track_id)
    }

    pub fn clear(&mut self) {
        self.own = None;
        self.others.clear();
    }
}
