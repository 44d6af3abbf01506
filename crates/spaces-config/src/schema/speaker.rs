//! Active speaker detection configuration types.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeakerConfig {
    /// Level above which a lone voice counts as speaking.
    pub single_threshold: f64,
    /// Lower level above which two simultaneous voices are compared.
    pub both_threshold: f64,
    /// Weight of the newest sample in the exponential smoothing.
    pub smoothing: f64,
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            single_threshold: 0.001,
            both_threshold: 0.0003,
            smoothing: 0.5,
        }
    }
}
