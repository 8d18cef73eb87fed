//! Command-line argument parsing for the Fourfold server.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Fourfold server command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "fourfold", about = "Real-time Connect Four game server")]
pub struct CliArgs {
    /// Interface to bind.
    #[arg(long)]
    pub bind: Option<String>,

    /// Game server port.
    #[arg(long)]
    pub port: Option<u16>,

    /// HTTP query API port.
    #[arg(long)]
    pub api_port: Option<u16>,

    /// Disable the HTTP query API.
    #[arg(long)]
    pub no_api: bool,

    /// Seconds a waiting player waits before being paired with the bot.
    #[arg(long)]
    pub bot_timeout: Option<u64>,

    /// Seconds a disconnected player has to rejoin.
    #[arg(long)]
    pub grace: Option<u64>,

    /// Append game events to this file as JSON lines.
    #[arg(long)]
    pub event_log: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref bind) = args.bind {
            self.server.bind_address = bind.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(port) = args.api_port {
            self.api.port = port;
        }
        if args.no_api {
            self.api.enabled = false;
        }
        if let Some(secs) = args.bot_timeout {
            self.matchmaking.bot_timeout_secs = secs;
        }
        if let Some(secs) = args.grace {
            self.session.disconnect_grace_secs = secs;
        }
        if let Some(ref path) = args.event_log {
            self.analytics.event_log = Some(path.clone());
        }
        if let Some(ref level) = args.log_level {
            self.log.level = level.clone();
        }
    }
}
