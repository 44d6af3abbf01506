//! Per-section validation: presence, join, recording, speaker, services, logging.

use crate::schema::SpacesConfig;

use super::helpers::{validate_range, validate_range_f64};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

pub(crate) fn validate_presence(errors: &mut Vec<String>, config: &SpacesConfig) {
    let presence = &config.presence;
    if presence.channel_prefix.is_empty() {
        errors.push("presence.channel_prefix must not be empty".into());
    }
    validate_range(
        errors,
        "presence.request_timeout_ms",
        presence.request_timeout_ms,
        500,
        60_000,
    );
    validate_range(
        errors,
        "presence.realtime.heartbeat_interval",
        presence.realtime.heartbeat_interval,
        5,
        120,
    );
    validate_range(
        errors,
        "presence.realtime.reconnect_delay",
        presence.realtime.reconnect_delay,
        1,
        60,
    );
    if presence.realtime.max_reconnect_delay < presence.realtime.reconnect_delay {
        errors.push("presence.realtime.max_reconnect_delay must be >= reconnect_delay".into());
    }
}

pub(crate) fn validate_join(errors: &mut Vec<String>, config: &SpacesConfig) {
    validate_range(errors, "join.capacity", config.join.capacity, 1, 8);
    validate_range(
        errors,
        "join.room_id_timeout_secs",
        config.join.room_id_timeout_secs,
        5,
        300,
    );
}

pub(crate) fn validate_recording(errors: &mut Vec<String>, config: &SpacesConfig) {
    let rec = &config.recording;
    validate_range(errors, "recording.ceiling_secs", rec.ceiling_secs, 30, 3600);
    validate_range(errors, "recording.tick_ms", rec.tick_ms, 100, 5000);
    validate_range(errors, "recording.min_peers", rec.min_peers, 2, 16);
    validate_range(errors, "recording.max_retries", rec.max_retries, 1, 10);
    validate_range(
        errors,
        "recording.retry_base_delay_ms",
        rec.retry_base_delay_ms,
        50,
        30_000,
    );
    validate_range_f64(errors, "recording.jitter_min", rec.jitter_min, 0.1, 1.0);
    validate_range_f64(errors, "recording.jitter_max", rec.jitter_max, 1.0, 3.0);
    if rec.fresh_age_expected_secs > rec.fresh_age_secs {
        errors.push("recording.fresh_age_expected_secs must be <= fresh_age_secs".into());
    }
}

pub(crate) fn validate_speaker(errors: &mut Vec<String>, config: &SpacesConfig) {
    let speaker = &config.speaker;
    validate_range_f64(
        errors,
        "speaker.single_threshold",
        speaker.single_threshold,
        0.0,
        1.0,
    );
    validate_range_f64(
        errors,
        "speaker.both_threshold",
        speaker.both_threshold,
        0.0,
        speaker.single_threshold,
    );
    validate_range_f64(errors, "speaker.smoothing", speaker.smoothing, 0.0, 1.0);
}

pub(crate) fn validate_services(errors: &mut Vec<String>, config: &SpacesConfig) {
    let services = &config.services;
    for (name, url) in [
        ("services.token_endpoint", &services.token_endpoint),
        ("services.api_base_url", &services.api_base_url),
    ] {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(format!("{name} must be an http(s) URL, got '{url}'"));
        }
    }
    validate_range(
        errors,
        "services.request_timeout_secs",
        services.request_timeout_secs,
        1,
        120,
    );
}

pub(crate) fn validate_logging(errors: &mut Vec<String>, config: &SpacesConfig) {
    if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
        errors.push(format!(
            "logging.level = '{}' must be one of {}",
            config.logging.level,
            LOG_LEVELS.join(", ")
        ));
    }
}
