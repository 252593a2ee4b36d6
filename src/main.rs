// ABOUTME: CLI entry point for station-sync
// ABOUTME: Parses commands and routes to appropriate handlers

use clap::{Parser, Subcommand};
use station_sync::commands;

#[derive(Parser)]
#[command(name = "station-sync")]
#[command(
    about = "Refresh whitelisted fields of a hosted feature layer from real-time air quality readings",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Match provider readings to layer records and commit the whitelisted fields
    Sync(commands::SyncArgs),
    /// Check station/field lists and required settings without contacting any service
    Validate(commands::ValidateArgs),
    /// Show the outcome of the last recorded sync cycle
    Status(commands::StatusArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // 1. RUST_LOG environment variable has highest precedence
    // 2. --log flag is used if RUST_LOG is not set
    // 3. Default to "info" if neither are provided
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Commands::Sync(args) => commands::sync::command(args).await,
        Commands::Validate(args) => commands::validate::command(args).await,
        Commands::Status(args) => commands::status::command(args).await,
    }
}
