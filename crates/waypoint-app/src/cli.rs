//! CLI argument definitions for the Waypoint application.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// Waypoint: conversational routing between map tools and general answers.
#[derive(Parser, Debug)]
#[command(name = "waypoint", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// User id the conversation is recorded under.
    #[arg(short = 'u', long = "user", default_value = "local")]
    pub user: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Handle a single message and exit instead of reading stdin.
    #[arg(short = 'm', long = "message")]
    pub message: Option<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > WAYPOINT_CONFIG env var > ~/.waypoint/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("WAYPOINT_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log filter: --log-level flag, else the config value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".waypoint").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".waypoint").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_config_wins() {
        let args = CliArgs::parse_from(["waypoint", "--config", "/tmp/wp.toml"]);
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/wp.toml"));
    }

    #[test]
    fn test_defaults() {
        let args = CliArgs::parse_from(["waypoint"]);
        assert_eq!(args.user, "local");
        assert!(args.message.is_none());
        assert_eq!(args.resolve_log_level("warn"), "warn");
    }

    #[test]
    fn test_log_level_flag_overrides_config() {
        let args = CliArgs::parse_from(["waypoint", "-l", "debug", "-m", "hello"]);
        assert_eq!(args.resolve_log_level("info"), "debug");
        assert_eq!(args.message.as_deref(), Some("hello"));
    }
}
