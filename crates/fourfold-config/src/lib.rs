//! Runtime configuration for the Fourfold server.
//!
//! Settings persist to disk as `config.ron`. Every section defaults, so a
//! partial file (or none at all) is valid. Command-line flags override what
//! was loaded.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    AnalyticsConfig, ApiConfig, CONFIG_FILE, Config, LogConfig, MatchmakingConfig, ServerConfig,
    SessionConfig, default_config_dir,
};
pub use error::ConfigError;
