use serde::{Deserialize, Serialize};

use crate::protocol::{GeoLocation, Profile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Host,
    Moderator,
    #[default]
    Speaker,
    Listener,
}

impl ParticipantRole {
    /// Lenient parse used for transport metadata. Unknown values map to
    /// `Listener` so that nothing unrecognised lands on stage.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "host" => Self::Host,
            "moderator" => Self::Moderator,
            "speaker" => Self::Speaker,
            _ => Self::Listener,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Moderator => "moderator",
            Self::Speaker => "speaker",
            Self::Listener => "listener",
        }
    }

    pub fn is_on_stage(self) -> bool {
        !matches!(self, Self::Listener)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: String,
    pub display_name: String,
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Transport peer id; `None` until the media transport confirms the peer.
    #[serde(default)]
    pub peer_id: Option<String>,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub role: ParticipantRole,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub location: Option<GeoLocation>,
}

impl Participant {
    /// A participant claimed locally but not yet seen by the transport.
    pub fn pending(profile: &Profile, role: ParticipantRole) -> Self {
        Self {
            user_id: profile.user_id.clone(),
            display_name: profile.display_name.clone(),
            username: profile.username.clone(),
            avatar_url: profile.avatar_url.clone(),
            peer_id: None,
            muted: false,
            role,
            topic: None,
            location: None,
        }
    }

    pub fn with_location(mut self, location: Option<GeoLocation>) -> Self {
        self.location = location;
        self
    }

    pub fn with_peer(mut self, peer_id: impl Into<String>) -> Self {
        self.peer_id = Some(peer_id.into());
        self
    }

    pub fn is_pending(&self) -> bool {
        self.peer_id.is_none()
    }

    pub fn profile(&self) -> Profile {
        Profile {
            user_id: self.user_id.clone(),
            display_name: self.display_name.clone(),
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }

    /// Overlay `incoming` on top of `self`. Empty strings and missing
    /// optionals in `incoming` keep the current value.
    pub(crate) fn merged_with(&self, incoming: &Participant) -> Participant {
        fn pick(current: &str, incoming: &str) -> String {
            if incoming.is_empty() {
                current.to_string()
            } else {
                incoming.to_string()
            }
        }

        Participant {
            user_id: self.user_id.clone(),
            display_name: pick(&self.display_name, &incoming.display_name),
            username: pick(&self.username, &incoming.username),
            avatar_url: incoming.avatar_url.clone().or_else(|| self.avatar_url.clone()),
            peer_id: incoming.peer_id.clone().or_else(|| self.peer_id.clone()),
            muted: incoming.muted,
            role: incoming.role,
            topic: incoming.topic.clone().or_else(|| self.topic.clone()),
            location: incoming.location.clone().or_else(|| self.location.clone()),
        }
    }
}
