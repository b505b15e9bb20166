//! Tubesync CLI
//!
//! Command-line front end for a Tubesync session: watch jobs, manage recent
//! downloads and server saves, and run notes tasks.

mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use commands::{Commands, handle_command};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tubesync_sync::{SessionContext, SyncConfig};

#[derive(Parser)]
#[command(name = "tubesync")]
#[command(about = "Tubesync client", long_about = None)]
struct Cli {
    /// Backend URL
    #[arg(long, env = "TUBESYNC_BACKEND_URL", default_value = "http://127.0.0.1:8088")]
    backend_url: String,

    /// Directory for persisted client state
    #[arg(long, env = "TUBESYNC_STATE_DIR")]
    state_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tubesync=info,tubesync_sync=info,tubesync_client=info,tubesync_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = SyncConfig::from_env();
    config.backend_url = cli.backend_url;
    if let Some(dir) = cli.state_dir {
        config = config.with_state_dir(dir);
    }

    let session = SessionContext::from_config(config).context("Failed to start session")?;
    let result = handle_command(cli.command, &session).await;
    session.shutdown();
    result
}
