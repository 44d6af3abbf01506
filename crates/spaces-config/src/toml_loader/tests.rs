//! Tests for TOML config loading, creation, and path resolution.

use super::*;
use std::path::Path;

#[test]
fn load_from_nonexistent_returns_file_not_found() {
    let result = load_from_path(Path::new("/tmp/nonexistent_spaces_config.toml"));
    let err = result.unwrap_err();
    assert!(matches!(err, spaces_common::ConfigError::FileNotFound(_)));
}

#[test]
fn load_valid_partial_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[join]
room_id_timeout_secs = 45

[speaker]
single_threshold = 0.002
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.join.room_id_timeout_secs, 45);
    assert!((config.speaker.single_threshold - 0.002).abs() < f64::EPSILON);
    // Defaults preserved
    assert_eq!(config.join.capacity, 1);
    assert_eq!(config.recording.ceiling_secs, 420);
}

#[test]
fn load_invalid_toml_returns_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "this is not valid toml {{{").unwrap();

    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, spaces_common::ConfigError::ParseError(_)));
}

#[test]
fn out_of_range_values_are_kept_with_warning() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[join]\ncapacity = 99\n").unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.join.capacity, 99);
}

#[test]
fn create_default_config_writes_parseable_template() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    create_default_config(&path).unwrap();
    assert!(path.exists());

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.presence.channel_prefix, "spaces:host:");
    assert_eq!(config.recording.max_retries, 3);
}

#[test]
fn default_config_path_ends_with_spaces_config() {
    if let Ok(path) = default_config_path() {
        assert!(path.ends_with("spaces/config.toml"));
    }
}
