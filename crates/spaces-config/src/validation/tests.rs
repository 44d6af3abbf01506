//! Tests for the full validation pipeline.

use super::*;
use crate::schema::*;

#[test]
fn default_config_validates() {
    let config = SpacesConfig::default();
    assert!(validate(&config).is_ok());
}

#[test]
fn catches_zero_capacity() {
    let mut config = SpacesConfig::default();
    config.join.capacity = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("join.capacity"));
}

#[test]
fn catches_both_threshold_above_single() {
    let mut config = SpacesConfig::default();
    config.speaker.both_threshold = 0.01;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("speaker.both_threshold"));
}

#[test]
fn catches_inverted_freshness_windows() {
    let mut config = SpacesConfig::default();
    config.recording.fresh_age_expected_secs = 600;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("fresh_age_expected_secs"));
}

#[test]
fn catches_non_http_service_url() {
    let mut config = SpacesConfig::default();
    config.services.api_base_url = "ftp://example.com".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("services.api_base_url"));
}

#[test]
fn catches_unknown_log_level() {
    let mut config = SpacesConfig::default();
    config.logging.level = "loud".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("logging.level"));
}

#[test]
fn collects_multiple_errors() {
    let mut config = SpacesConfig::default();
    config.join.capacity = 0;
    config.recording.tick_ms = 1;
    config.presence.channel_prefix.clear();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("join.capacity"));
    assert!(err.contains("recording.tick_ms"));
    assert!(err.contains("presence.channel_prefix"));
    assert_eq!(err.matches(';').count(), 2);
}
