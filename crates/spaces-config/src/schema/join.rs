//! Join/leave protocol configuration types.

use serde::{Deserialize, Serialize};

/// Join protocol configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    /// Non-host participants a room admits at the same time.
    pub capacity: u32,
    /// How long a visitor waits for the host's `room_created` answer.
    pub room_id_timeout_secs: u32,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            capacity: 1,
            room_id_timeout_secs: 30,
        }
    }
}
