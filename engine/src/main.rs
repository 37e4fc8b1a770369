// Sophie conversational command assistant
// Main entry point for the sophie binary

use clap::Parser;
use sophie_engine::cli::{Cli, Command};
use sophie_engine::config::Config;
use sophie_engine::handlers::{
    handle_doctor, handle_history, handle_run, handle_session, OutputFormat,
};
use sophie_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };
    let config = config.with_cli_overrides(cli.mode, cli.wake.clone())?;

    // RUST_LOG still wins over both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Sophie v{} ({} - {})", version, commit, timestamp);

    match cli.command {
        None => handle_session(&config).await,

        Some(Command::Run { input }) => handle_run(input.join(" "), &config, format).await,

        Some(Command::History { limit }) => handle_history(limit, &config, format).await,

        Some(Command::Doctor) => {
            tracing::info!("Running diagnostics...");
            handle_doctor(&config, format).await
        }
    }
}
