use serde::{Deserialize, Serialize};

use crate::protocol::{GeoLocation, Profile};

/// The signed-in user driving this session engine.
#[derive(Clone, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub location: Option<GeoLocation>,
    /// Bearer token for the realtime bus and backend services.
    #[serde(skip)]
    pub access_token: Option<String>,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("display_name", &self.display_name)
            .field("username", &self.username)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl Identity {
    pub fn new(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            username: username.into(),
            avatar_url: None,
            location: None,
            access_token: None,
        }
    }

    pub fn with_location(mut self, location: GeoLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Public profile shared with other participants.
    pub fn profile(&self) -> Profile {
        Profile {
            user_id: self.user_id.clone(),
            display_name: self.display_name.clone(),
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_token() {
        let identity = Identity::new("u1", "Ada", "ada").with_access_token("secret-jwt");
        let rendered = format!("{identity:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("secret-jwt"));
    }

    #[test]
    fn token_is_not_serialized() {
        let identity = Identity::new("u1", "Ada", "ada").with_access_token("secret-jwt");
        let json = serde_json::to_string(&identity).unwrap();
        assert!(!json.contains("secret-jwt"));
        assert_eq!(identity.profile().username, "ada");
    }
}
