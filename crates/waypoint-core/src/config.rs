use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, WaypointError};

/// Top-level configuration for the Waypoint engine.
///
/// Loaded from `~/.waypoint/config.toml` by default. Every section is
/// optional; missing sections and fields take their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaypointConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub geo: GeoConfig,
}

impl WaypointConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: WaypointConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| WaypointError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the engine cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.context.max_turns == 0 {
            return Err(WaypointError::Config(
                "context.max_turns must be at least 1".to_string(),
            ));
        }
        if self.context.recency_window == 0 {
            return Err(WaypointError::Config(
                "context.recency_window must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.classifier.min_confidence) {
            return Err(WaypointError::Config(format!(
                "classifier.min_confidence must be within [0, 1], got {}",
                self.classifier.min_confidence
            )));
        }
        if self.router.step_timeout_ms == 0 || self.router.turn_deadline_ms == 0 {
            return Err(WaypointError::Config(
                "router timeouts must be non-zero".to_string(),
            ));
        }
        if self.router.max_results == 0 {
            return Err(WaypointError::Config(
                "router.max_results must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Conversation memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Maximum number of turns retained per user. Oldest turns are dropped first.
    pub max_turns: usize,
    /// Number of user turns after a successful search during which its
    /// results may still be referenced ("they", "there", ...).
    pub recency_window: u32,
    /// Idle contexts older than this are evicted. 0 disables eviction.
    pub idle_ttl_minutes: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_turns: 20,
            recency_window: 1,
            idle_ttl_minutes: 0,
        }
    }
}

impl ContextConfig {
    pub fn idle_ttl(&self) -> Option<Duration> {
        (self.idle_ttl_minutes > 0).then(|| Duration::from_secs(self.idle_ttl_minutes * 60))
    }
}

/// Intent classification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Minimum confidence for a rule or advisory decision to be accepted.
    pub min_confidence: f32,
    /// Upper bound on a single advisory classifier call.
    pub advisory_timeout_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            advisory_timeout_ms: 2000,
        }
    }
}

impl ClassifierConfig {
    pub fn advisory_timeout(&self) -> Duration {
        Duration::from_millis(self.advisory_timeout_ms)
    }
}

/// Tool orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Upper bound on a single tool call.
    pub step_timeout_ms: u64,
    /// Upper bound on the whole tool sequence of one turn.
    pub turn_deadline_ms: u64,
    /// Maximum number of places requested from search and kept in memory.
    pub max_results: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            step_timeout_ms: 5000,
            turn_deadline_ms: 15000,
            max_results: 5,
        }
    }
}

impl RouterConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn turn_deadline(&self) -> Duration {
        Duration::from_millis(self.turn_deadline_ms)
    }
}

/// Geographic bias table settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// Optional TOML table replacing the built-in bias table.
    pub table_path: Option<String>,
}

// =============================================================================
// Tests
// =============================================================================
