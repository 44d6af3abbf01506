//! Token/session service endpoints.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// Endpoint issuing auth and management tokens.
    pub token_endpoint: String,
    /// Base URL of the media management API (active rooms, capture records).
    pub api_base_url: String,
    pub management_token_ttl_secs: u32,
    pub request_timeout_secs: u32,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            token_endpoint: "http://localhost:8787/api/token".into(),
            api_base_url: "http://localhost:8787/v2".into(),
            management_token_ttl_secs: 3600,
            request_timeout_secs: 15,
        }
    }
}
