use thiserror::Error;
use waypoint_core::error::WaypointError;

/// Errors produced by the geographic bias subsystem.
#[derive(Debug, Error)]
pub enum GeoError {
    /// The token matched no alias. Non-fatal: callers fall back to plain
    /// geocoding without a bias hint.
    #[error("place not found in bias table: {0}")]
    Unresolved(String),

    #[error("alias '{alias}' is claimed by both {first} and {second}")]
    DuplicateAlias {
        alias: String,
        first: String,
        second: String,
    },

    #[error("invalid bias table entry: {0}")]
    InvalidEntry(String),

    #[error("failed to read bias table: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse bias table: {0}")]
    Parse(String),
}

impl From<toml::de::Error> for GeoError {
    fn from(err: toml::de::Error) -> Self {
        GeoError::Parse(err.to_string())
    }
}

impl From<GeoError> for WaypointError {
    fn from(err: GeoError) -> Self {
        match err {
            GeoError::Io(e) => WaypointError::Io(e),
            other => WaypointError::GeoTable(other.to_string()),
        }
    }
}
