//! Configuration for the keystroke agent.

use crate::delivery::CompanionConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default flush interval in seconds.
pub const DEFAULT_FLUSH_SECS: u64 = 60;

/// Shortest flush interval accepted, in seconds.
pub const MIN_FLUSH_SECS: u64 = 1;

/// Longest flush interval accepted, in seconds (one day).
pub const MAX_FLUSH_SECS: u64 = 86_400;

/// Default port of the HTTP ingest server.
pub const DEFAULT_SERVER_PORT: u16 = 19235;

/// One-off values from the command line. Applied on top of the loaded
/// config for a single session and never saved.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub flush_secs: Option<u64>,
    pub base_url: Option<String>,
    pub server_port: Option<u16>,
}

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// How often in-flight records are flushed
    #[serde(with = "duration_serde")]
    pub flush_interval: Duration,

    /// Plugin manager connection
    pub companion: CompanionConfig,

    /// Port for the HTTP ingest server
    pub server_port: u16,

    /// Path for storing session stats
    pub data_path: PathBuf,

    /// Identifier of this agent install, sent to the plugin manager
    #[serde(default)]
    pub plugin_uuid: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("keystroke-agent");

        Self {
            flush_interval: Duration::from_secs(DEFAULT_FLUSH_SECS),
            companion: CompanionConfig::default(),
            server_port: DEFAULT_SERVER_PORT,
            data_path: data_dir,
            plugin_uuid: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it is absent.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Load `path` and return it with the install UUID, saving the UUID back
    /// to `path` when it was generated just now.
    pub fn load_session(path: &std::path::Path) -> Result<(Self, String), ConfigError> {
        let mut config = Self::load_from(path)?;
        let (plugin_uuid, generated) = config.ensure_plugin_uuid();
        if generated {
            if let Err(e) = config.save_to(path) {
                tracing::warn!("Could not save plugin id: {}", e);
            }
        }
        Ok((config, plugin_uuid))
    }

    /// Apply command-line overrides.
    pub fn apply(&mut self, overrides: Overrides) -> Result<(), ConfigError> {
        if let Some(secs) = overrides.flush_secs {
            self.set_flush_secs(secs)?;
        }
        if let Some(url) = overrides.base_url {
            self.companion.base_url = url;
        }
        if let Some(port) = overrides.server_port {
            self.server_port = port;
        }
        Ok(())
    }

    /// Reject values the agent cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_flush_secs(self.flush_interval.as_secs())
    }

    /// Override the flush interval, keeping it within the accepted range.
    pub fn set_flush_secs(&mut self, secs: u64) -> Result<(), ConfigError> {
        check_flush_secs(secs)?;
        self.flush_interval = Duration::from_secs(secs);
        Ok(())
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("keystroke-agent")
            .join("config.json")
    }

    /// Path of the persisted session stats.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("stats.json")
    }

    /// Return the install UUID, generating one on first use.
    ///
    /// Returns true in the second position when a new UUID was generated and
    /// the config should be saved.
    pub fn ensure_plugin_uuid(&mut self) -> (String, bool) {
        match &self.plugin_uuid {
            Some(id) => (id.clone(), false),
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                self.plugin_uuid = Some(id.clone());
                (id, true)
            }
        }
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)?;
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

fn check_flush_secs(secs: u64) -> Result<(), ConfigError> {
    if (MIN_FLUSH_SECS..=MAX_FLUSH_SECS).contains(&secs) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "flush_interval must be between {MIN_FLUSH_SECS} and {MAX_FLUSH_SECS} seconds, got {secs}"
        )))
    }
}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
