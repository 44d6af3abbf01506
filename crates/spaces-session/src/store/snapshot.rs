use serde::Serialize;

use crate::room::Room;
use crate::speaker::SpeakerRole;

/// The part of the store a join attempt may touch, captured before it does.
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceSnapshot {
    pub space_id: String,
    pub room: Option<Room>,
    pub selected_space: Option<String>,
    pub current_viewing_space: Option<String>,
    pub is_in_space: bool,
}

/// Owned copy of everything the UI observes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreView {
    pub rooms: Vec<Room>,
    pub selected_space: Option<Room>,
    pub current_viewing_space: Option<Room>,
    pub is_in_space: bool,
    pub is_joining: bool,
    pub is_recording: bool,
    pub recording_time_remaining: u32,
    pub active_speaker: Option<SpeakerRole>,
}
