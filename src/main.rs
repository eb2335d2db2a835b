#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use logrelay::config::Config;
use logrelay::routes::{router, serve, AppState};
use logrelay::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "logrelay")]
#[command(about = "Log Relay - read-only HTTP relay for Microsoft Graph mail and Twilio SMS logs")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration (environment overrides applied)
    let config = Config::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    init_telemetry(TelemetryConfig::from(&config.telemetry))
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let state = AppState::from_config(&config)?;
    let app = router(state, config.static_dir.as_deref());

    info!(
        listen = %config.listen,
        mailbox = %config.mail.mailbox,
        token_file = %config.mail.token_file.display(),
        "Starting Log Relay"
    );

    let result = serve(&config.listen, app).await;
    shutdown_telemetry();
    result?;

    Ok(())
}
