//! Spaces configuration system.
//!
//! Provides TOML-based configuration with full validation. All sections
//! use sensible defaults so partial configs work out of the box.

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    CaptureVisibility, JoinConfig, LoggingConfig, PresenceConfig, RealtimeSettings,
    RecordingConfig, ServicesConfig, SpacesConfig, SpeakerConfig, CONFIG_SCHEMA_VERSION,
};

use std::path::Path;

use spaces_common::ConfigError;

/// Load config from the platform default path and validate it.
///
/// Creates a default `config.toml` if none exists.
pub fn load_config() -> Result<SpacesConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}

/// Load config from an explicit path and validate it.
pub fn load_config_from(path: &Path) -> Result<SpacesConfig, ConfigError> {
    let config = toml_loader::load_from_path(path)?;
    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &SpacesConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}
