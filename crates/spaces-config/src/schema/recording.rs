//! Capture session configuration types.

use serde::{Deserialize, Serialize};

/// Who can see a persisted capture record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaptureVisibility {
    #[default]
    Public,
    Private,
}

/// Recording session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Per-participant time ceiling, in seconds.
    pub ceiling_secs: u32,
    pub tick_ms: u32,
    /// Connected peers required before the host may record.
    pub min_peers: u32,
    pub max_retries: u32,
    pub retry_base_delay_ms: u32,
    pub jitter_min: f64,
    pub jitter_max: f64,
    /// Max session age when an expected start time was recorded.
    pub fresh_age_expected_secs: u32,
    /// Max session age otherwise.
    pub fresh_age_secs: u32,
    pub tag: String,
    pub visibility: CaptureVisibility,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            ceiling_secs: 420,
            tick_ms: 1000,
            min_peers: 2,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            jitter_min: 0.8,
            jitter_max: 1.2,
            fresh_age_expected_secs: 60,
            fresh_age_secs: 300,
            tag: "conversation".into(),
            visibility: CaptureVisibility::Public,
        }
    }
}
