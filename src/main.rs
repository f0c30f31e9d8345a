//! Discord purge CLI - main entry point

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

use discord_purge::commands::{self, PurgeArgs};
use discord_purge::metrics;
use tracing::warn;

#[derive(Parser)]
#[command(name = "discord_purge")]
#[command(about = "Bulk-delete your own Discord messages", long_about = None)]
#[command(version)]
struct Cli {
    /// Address to expose Prometheus metrics (e.g., 0.0.0.0:9898)
    #[arg(long, env = "METRICS_ADDR", global = true)]
    metrics_addr: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete matching messages across the selected scope
    Purge(PurgeArgs),

    /// List the jobs a purge would run, without deleting anything
    Jobs(PurgeArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for local development
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("discord_purge=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr.as_deref() {
        match addr.parse::<SocketAddr>() {
            Ok(socket) => metrics::spawn_metrics_server(socket),
            Err(err) => warn!(%addr, "Invalid metrics address: {}", err),
        }
    }

    match cli.command {
        Commands::Purge(args) => commands::purge::run(args).await,
        Commands::Jobs(args) => commands::jobs::run(args).await,
    }
}
