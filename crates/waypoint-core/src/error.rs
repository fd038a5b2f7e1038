use thiserror::Error;

/// Top-level error type for the Waypoint system.
///
/// Subsystem crates define their own error types and implement
/// `From<SubsystemError> for WaypointError` so that `?` works across crate
/// boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WaypointError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Geographic table error: {0}")]
    GeoTable(String),

    #[error("Context store error: {0}")]
    Context(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for WaypointError {
    fn from(err: toml::de::Error) -> Self {
        WaypointError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for WaypointError {
    fn from(err: toml::ser::Error) -> Self {
        WaypointError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for WaypointError {
    fn from(err: serde_json::Error) -> Self {
        WaypointError::Serialization(err.to_string())
    }
}

/// Convenience result alias for Waypoint operations.
pub type Result<T> = std::result::Result<T, WaypointError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WaypointError::Config("bad value".to_string());
        assert_eq!(err.to_string(), "Configuration error: bad value");

        let err = WaypointError::GeoTable("duplicate alias: paris".to_string());
        assert_eq!(err.to_string(), "Geographic table error: duplicate alias: paris");
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: WaypointError = io.into();
        assert!(matches!(err, WaypointError::Io(_)));
    }

    #[test]
    fn test_from_toml_error() {
        let parse: std::result::Result<toml::Value, _> = toml::from_str("not = [valid");
        let err: WaypointError = parse.unwrap_err().into();
        assert!(matches!(err, WaypointError::Config(_)));
    }

    #[test]
    fn test_from_json_error() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: WaypointError = parse.unwrap_err().into();
        assert!(matches!(err, WaypointError::Serialization(_)));
    }
}
