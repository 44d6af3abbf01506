//! Configuration schema types for the Spaces session engine.
//!
//! All structs use `serde(default)` so partial configs work correctly.
//! Missing fields are filled with the defaults the engine was tuned with.

mod join;
mod logging;
mod presence;
mod recording;
mod services;
mod speaker;

pub use join::*;
pub use logging::*;
pub use presence::*;
pub use recording::*;
pub use services::*;
pub use speaker::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SpacesConfig {
    pub presence: PresenceConfig,
    pub join: JoinConfig,
    pub recording: RecordingConfig,
    pub speaker: SpeakerConfig,
    pub services: ServicesConfig,
    pub logging: LoggingConfig,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_join_policy_admits_one_visitor() {
        let config = SpacesConfig::default();
        assert_eq!(config.join.capacity, 1);
        assert_eq!(config.join.room_id_timeout_secs, 30);
    }

    #[test]
    fn default_recording_matches_ceiling_and_freshness() {
        let config = SpacesConfig::default();
        assert_eq!(config.recording.ceiling_secs, 420);
        assert_eq!(config.recording.tick_ms, 1000);
        assert_eq!(config.recording.min_peers, 2);
        assert_eq!(config.recording.max_retries, 3);
        assert_eq!(config.recording.fresh_age_expected_secs, 60);
        assert_eq!(config.recording.fresh_age_secs, 300);
        assert!((config.recording.jitter_min - 0.8).abs() < f64::EPSILON);
        assert!((config.recording.jitter_max - 1.2).abs() < f64::EPSILON);
        assert_eq!(config.recording.visibility, CaptureVisibility::Public);
    }

    #[test]
    fn default_speaker_thresholds() {
        let config = SpacesConfig::default();
        assert!((config.speaker.single_threshold - 0.001).abs() < f64::EPSILON);
        assert!(config.speaker.both_threshold < config.speaker.single_threshold);
    }

    #[test]
    fn default_presence_prefix() {
        let config = SpacesConfig::default();
        assert_eq!(config.presence.channel_prefix, "spaces:host:");
        assert_eq!(config.presence.realtime.heartbeat_interval, 25);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config: SpacesConfig = toml::from_str(
            r#"
[join]
capacity = 2

[recording]
visibility = "private"
"#,
        )
        .unwrap();
        assert_eq!(config.join.capacity, 2);
        assert_eq!(config.join.room_id_timeout_secs, 30);
        assert_eq!(config.recording.visibility, CaptureVisibility::Private);
        assert_eq!(config.recording.ceiling_secs, 420);
        assert_eq!(config.logging.level, "info");
    }
}
