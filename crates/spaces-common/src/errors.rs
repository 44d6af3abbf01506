use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SpacesError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ParseError("unexpected token".into());
        assert_eq!(err.to_string(), "config parse error: unexpected token");

        let err = ConfigError::ValidationError("join.capacity = 0 is out of range [1, 8]".into());
        assert_eq!(
            err.to_string(),
            "config validation error: join.capacity = 0 is out of range [1, 8]"
        );
    }

    #[test]
    fn spaces_error_from_config() {
        let config_err = ConfigError::ParseError("bad toml".into());
        let err: SpacesError = config_err.into();
        assert!(matches!(err, SpacesError::Config(_)));
        assert!(err.to_string().contains("bad toml"));
    }

    #[test]
    fn spaces_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: SpacesError = io_err.into();
        assert!(matches!(err, SpacesError::Io(_)));
        assert!(err.to_string().contains("file missing"));
    }

    #[test]
    fn spaces_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: SpacesError = json_err.into();
        assert!(matches!(err, SpacesError::Json(_)));
    }

    #[test]
    fn spaces_error_other_variants() {
        let err = SpacesError::Network("timeout".into());
        assert_eq!(err.to_string(), "network error: timeout");

        let err = SpacesError::Session("host busy".into());
        assert_eq!(err.to_string(), "session error: host busy");

        let err = SpacesError::Other("something went wrong".into());
        assert_eq!(err.to_string(), "something went wrong");
    }
}
