//! Configuration structs with defaults and RON persistence.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name used inside the config directory.
pub const CONFIG_FILE: &str = "config.ron";

/// Platform config directory for Fourfold (e.g. `~/.config/fourfold`).
pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|d| d.join("fourfold"))
        .ok_or(ConfigError::NoConfigDir)
}

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub api: ApiConfig,
    pub matchmaking: MatchmakingConfig,
    pub session: SessionConfig,
    pub analytics: AnalyticsConfig,
    pub log: LogConfig,
}

/// Game socket settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to listen on.
    pub bind_address: String,
    pub port: u16,
    /// Connections beyond this are closed on accept.
    pub max_connections: usize,
    /// Per-connection notification backlog before messages are dropped.
    pub outbound_queue: usize,
    pub max_frame_bytes: u32,
}

/// HTTP query API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
    /// Maximum rows returned by the leaderboard route.
    pub leaderboard_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MatchmakingConfig {
    /// How often waiting players are checked.
    pub sweep_interval_ms: u64,
    /// Wait after which a player is paired with the bot.
    pub bot_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// How long a disconnected player may rejoin before forfeiting.
    pub disconnect_grace_secs: u64,
    /// How long a finished session stays queryable in memory.
    pub finished_retention_secs: u64,
}

/// Game event publishing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub enabled: bool,
    /// When set, events are appended to this file as JSON lines.
    pub event_log: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive such as "info" or "debug,fourfold_server=trace".
    pub level: String,
    /// Directory for the JSON log file. No file logging when unset.
    pub directory: Option<PathBuf>,
}

// --- Default implementations ---

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 1024,
            outbound_queue: 256,
            max_frame_bytes: 64 * 1024,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8081,
            leaderboard_limit: 100,
        }
    }
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 1000,
            bot_timeout_secs: 10,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            disconnect_grace_secs: 30,
            finished_retention_secs: 30,
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            event_log: None,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

// --- Derived values ---

impl ServerConfig {
    /// Socket address for the game listener. An unparsable bind address
    /// falls back to all interfaces.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip(), self.port)
    }

    fn ip(&self) -> IpAddr {
        self.bind_address.parse().unwrap_or_else(|_| {
            log::warn!(
                "Invalid bind_address {:?}, listening on all interfaces",
                self.bind_address
            );
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        })
    }
}

impl Config {
    /// Address for the HTTP API; shares the game listener's interface.
    pub fn api_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.ip(), self.api.port)
    }
}

impl MatchmakingConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    pub fn bot_timeout(&self) -> Duration {
        Duration::from_secs(self.bot_timeout_secs)
    }
}

impl SessionConfig {
    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_secs(self.disconnect_grace_secs)
    }

    pub fn finished_retention(&self) -> Duration {
        Duration::from_secs(self.finished_retention_secs)
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(config_dir.join(CONFIG_FILE), serialized).map_err(ConfigError::WriteError)
    }

    /// Re-read the file: `Some(new_config)` if it differs from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join(CONFIG_FILE))?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        ron::from_str(&contents).map_err(ConfigError::ParseError)
    }
}
