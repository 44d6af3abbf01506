use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::identity::Identity;
use crate::protocol::GeoLocation;
use crate::room::{Participant, ParticipantRole};

/// Typed view of the JSON a peer attaches to its transport session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerMetadata {
    pub user_id: String,
    pub display_name: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub role: ParticipantRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,
}

impl PeerMetadata {
    pub fn from_identity(identity: &Identity, role: ParticipantRole, topic: Option<String>) -> Self {
        Self {
            user_id: identity.user_id.clone(),
            display_name: identity.display_name.clone(),
            username: identity.username.clone(),
            avatar_url: identity.avatar_url.clone(),
            role,
            topic,
            location: identity.location.clone(),
        }
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decode field by field. A field that is missing or has the wrong type
    /// falls back to a placeholder instead of failing the whole peer.
    pub fn decode(raw: &str, fallback_name: &str, fallback_role: &str) -> Self {
        let value: Value = serde_json::from_str(raw).unwrap_or_else(|e| {
            debug!(error = %e, "Unreadable peer metadata, using defaults");
            Value::Null
        });
        let text = |key: &str| -> Option<String> {
            value
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .filter(|s| !s.is_empty())
        };

        let role = text("role").unwrap_or_else(|| fallback_role.to_string());
        let location = value
            .get("location")
            .and_then(|l| serde_json::from_value::<GeoLocation>(l.clone()).ok());

        Self {
            user_id: text("user_id").unwrap_or_default(),
            display_name: text("display_name").unwrap_or_else(|| fallback_name.to_string()),
            username: text("username").unwrap_or_default(),
            avatar_url: text("avatar_url"),
            role: ParticipantRole::parse_lenient(&role),
            topic: text("topic"),
            location,
        }
    }

    pub fn to_participant(&self, peer_id: &str) -> Participant {
        Participant {
            user_id: self.user_id.clone(),
            display_name: self.display_name.clone(),
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
            peer_id: Some(peer_id.to_string()),
            muted: false,
            role: self.role,
            topic: self.topic.clone(),
            location: self.location.clone(),
        }
    }
}
