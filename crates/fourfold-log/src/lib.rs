//! Structured logging for the Fourfold server.
//!
//! Console output with uptime timestamps, plus an optional JSON file for
//! post-mortem analysis. The level comes from `RUST_LOG` when set, otherwise
//! from the `log.level` config entry.

use std::path::Path;

use fourfold_config::LogConfig;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Name of the JSON log file written inside the log directory.
pub const LOG_FILE: &str = "fourfold.log";

const DEFAULT_FILTER: &str = "info";

/// Install the global tracing subscriber.
///
/// `log_dir` enables the JSON file layer; a directory that cannot be created
/// falls back to console-only logging. Calling this twice panics inside
/// `tracing_subscriber`, so binaries call it once at startup.
///
/// ```no_run
/// use fourfold_config::LogConfig;
/// use fourfold_log::init_logging;
///
/// init_logging(None, &LogConfig::default());
/// init_logging(Some(std::path::Path::new("./logs")), &LogConfig::default());
/// ```
pub fn init_logging(log_dir: Option<&Path>, config: &LogConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_for(config));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = std::fs::File::create(log_dir.join(LOG_FILE))
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        subscriber.with(file_layer).init();
        return;
    }

    subscriber.init();
}

/// Filter built from the configured level; blank or unparsable levels fall
/// back to `info`.
pub fn filter_for(config: &LogConfig) -> EnvFilter {
    let level = config.level.trim();
    if level.is_empty() {
        return default_env_filter();
    }
    EnvFilter::try_new(level).unwrap_or_else(|_| default_env_filter())
}

pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}
