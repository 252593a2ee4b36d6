// ABOUTME: sync command - runs one field sync cycle or keeps syncing at an interval
// ABOUTME: Wires the provider, portal layer and engine into a SyncDaemon

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{ConnectionArgs, EngineArgs};
use crate::daemon::{CycleStats, DaemonConfig, SyncDaemon};
use crate::engine::{FieldWhitelist, SyncEngine};
use crate::portal::{FeatureLayer, PortalSession};
use crate::provider::ProviderClient;
use crate::state::CycleSummary;
use crate::utils::{redact_url, RetryPolicy};

#[derive(Args, Clone)]
pub struct SyncArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
    #[command(flatten)]
    pub engine: EngineArgs,
    /// Run a single sync cycle and exit (don't run continuously)
    #[arg(long)]
    pub once: bool,
    /// Sync interval in seconds (default: 3600 = 1 hour)
    #[arg(long, default_value_t = 3600, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,
    /// Build and report updates without committing them
    #[arg(long)]
    pub dry_run: bool,
    /// Where to record the last cycle summary (defaults to ~/.station-sync/last_cycle.json)
    #[arg(long)]
    pub state_file: Option<PathBuf>,
    /// Retries for each remote call before a cycle fails
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,
}

pub async fn command(args: SyncArgs) -> Result<()> {
    let (registry, whitelist, join_key) = args.engine.load()?;
    let settings = args.connection.resolve()?;

    tracing::info!("Provider: {}", redact_url(&settings.provider.base_url));
    tracing::info!("Portal: {}", settings.portal.portal_url);
    tracing::info!(
        "Stations: {}, fields: {}",
        registry.len(),
        whitelist.iter().collect::<Vec<_>>().join(", ")
    );

    let retry = RetryPolicy {
        max_retries: args.max_retries,
        ..RetryPolicy::default()
    };
    let provider = ProviderClient::new(settings.provider.clone(), retry)?;
    let session = PortalSession::new(settings.portal.clone(), retry)?;
    let layer = FeatureLayer::open(session)
        .await
        .context("Failed to open destination feature layer")?;

    let shown_fields = whitelist.clone();
    let engine = SyncEngine::new(registry, whitelist, join_key);
    let config = DaemonConfig {
        sync_interval: Duration::from_secs(args.interval),
        dry_run: args.dry_run,
        state_path: Some(
            args.state_file
                .clone()
                .unwrap_or_else(CycleSummary::default_path),
        ),
    };
    tracing::info!("State file: {:?}", config.state_path);

    let daemon = SyncDaemon::new(engine, provider, layer, config);

    if args.once {
        tracing::info!("Running single sync cycle...");
        let stats = daemon.run_sync_cycle().await?;
        print_stats(&stats, &shown_fields, args.dry_run);
        stats.ensure_committed()?;
        return Ok(());
    }

    tracing::info!("Starting continuous sync, press Ctrl+C to stop");
    println!();
    println!("========================================");
    println!("Starting continuous station sync");
    println!("========================================");
    println!("  Sync interval: {}s", args.interval);
    println!("  Press Ctrl+C to stop");
    println!();

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received shutdown signal");
                let _ = shutdown_tx.send(());
            }
            Err(e) => tracing::error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    daemon.run(shutdown_rx).await
}

fn print_stats(stats: &CycleStats, whitelist: &FieldWhitelist, dry_run: bool) {
    let c = &stats.report.counts;

    println!();
    println!("========================================");
    if dry_run {
        println!("Sync cycle complete (dry run)");
    } else {
        println!("Sync cycle complete");
    }
    println!("========================================");
    println!("  Stations attempted: {}", c.attempted);
    println!("  Matched:            {}", c.matched);
    println!("  Updated:            {}", c.updated);
    println!("  Partially updated:  {}", c.partial);
    println!("  Unmatched:          {}", c.unmatched);
    println!("  Ambiguous:          {}", c.ambiguous);
    println!("  Excluded:           {}", c.excluded);
    if let Some(ref commit) = stats.commit {
        println!("  Committed:          {}", commit.succeeded());
        println!("  Rejected:           {}", commit.failed_count());
    }

    if !stats.report.issues.is_empty() {
        println!();
        println!("Issues:");
        for issue in &stats.report.issues {
            println!("  - {}", issue);
        }
    }

    if dry_run && !stats.batch.is_empty() {
        println!();
        println!("Pending updates:");
        for update in stats.batch.iter() {
            let fields: Vec<String> = whitelist
                .iter()
                .filter_map(|f| update.get(f).map(|v| format!("{}={}", f, v)))
                .collect();
            println!("  {} (object {}): {}", update.station, update.handle, fields.join(", "));
        }
    }
}
