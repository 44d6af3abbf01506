//! Wire payloads exchanged on the presence bus between a host and visitors.

use serde::{Deserialize, Serialize};
use spaces_common::RequestId;

/// Event names published on a host's presence channel.
pub mod events {
    pub const JOIN_REQUEST: &str = "join_request";
    pub const ROOM_CREATED: &str = "room_created";
    pub const JOIN_DECLINED: &str = "join_declined";
    pub const PARTICIPANT_LEFT: &str = "participant_left";
    pub const ROOM_ENDED: &str = "room_ended";
    pub const RECORDING_STARTED: &str = "recording_started";
    pub const RECORDING_STOPPED: &str = "recording_stopped";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Public profile of a user as carried in presence data and join requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceRole {
    Host,
    Participant,
}

/// Data a client enters into a presence channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceData {
    pub role: PresenceRole,
    pub profile: Profile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_id: Option<String>,
}

impl PresenceData {
    pub fn host(profile: Profile, location: Option<GeoLocation>, space_id: Option<String>) -> Self {
        Self {
            role: PresenceRole::Host,
            profile,
            location,
            space_id,
        }
    }

    pub fn participant(profile: Profile, location: Option<GeoLocation>, space_id: &str) -> Self {
        Self {
            role: PresenceRole::Participant,
            profile,
            location,
            space_id: Some(space_id.to_string()),
        }
    }

    /// Best-effort decode of a member's data; unknown shapes yield `None`.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequestPayload {
    pub request_id: RequestId,
    pub space_id: String,
    pub to_user_id: String,
    pub from: Profile,
    #[serde(default)]
    pub location: Option<GeoLocation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomCreatedPayload {
    pub request_id: RequestId,
    pub space_id: String,
    pub to_user_id: String,
    pub transport_room_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinDeclinedPayload {
    pub request_id: RequestId,
    pub to_user_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantLeftPayload {
    pub space_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomEndedPayload {
    pub space_id: String,
    pub host_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingPayload {
    pub space_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub remaining_secs: u32,
}
