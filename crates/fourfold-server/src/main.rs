//! Fourfold game server binary.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI
//! flags, e.g. `fourfold-server --port 9000 --bot-timeout 5`.

use std::process::ExitCode;

use clap::Parser;
use fourfold_config::{CliArgs, Config, default_config_dir};
use fourfold_server::App;

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config = match args.config.clone() {
        Some(dir) => Ok(dir),
        None => default_config_dir(),
    }
    .and_then(|dir| Config::load_or_create(&dir));
    let mut config = config.unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    fourfold_log::init_logging(config.log.directory.as_deref(), &config.log);

    let app = match App::start(&config).await {
        Ok(app) => app,
        Err(e) => {
            tracing::error!("Startup failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {e}");
    }
    tracing::info!("Shutting down");
    app.shutdown().await;
    ExitCode::SUCCESS
}
