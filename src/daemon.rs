// ABOUTME: SyncDaemon - runs field sync cycles once or at a fixed interval
// ABOUTME: Fetches both snapshots, runs the engine, commits, logs and records the outcome

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::time::interval;

use crate::collaborators::{CommitResult, DestinationStore, ProviderSource};
use crate::engine::{CycleReport, StationIssue, SyncBatch, SyncEngine, SyncError};
use crate::state::CycleSummary;

/// Configuration for the SyncDaemon.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Interval between sync cycles
    pub sync_interval: Duration,
    /// Build batches without committing them
    pub dry_run: bool,
    /// Where to record the last cycle summary (None = don't record)
    pub state_path: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(3600), // provider refreshes hourly
            dry_run: false,
            state_path: Some(CycleSummary::default_path()),
        }
    }
}

/// A batch built from fresh snapshots, not yet committed.
#[derive(Debug)]
pub struct PreparedCycle {
    pub batch: SyncBatch,
    pub report: CycleReport,
    started: Instant,
}

/// Statistics from a sync cycle.
#[derive(Debug, Clone)]
pub struct CycleStats {
    pub batch: SyncBatch,
    pub report: CycleReport,
    /// None for dry runs and empty batches
    pub commit: Option<CommitResult>,
    pub duration_ms: u64,
}

impl CycleStats {
    /// Every station updated, every record accepted.
    pub fn is_success(&self) -> bool {
        self.report.is_clean() && self.commit.as_ref().map_or(true, CommitResult::is_complete)
    }

    /// Surface rejected records as [`SyncError::CommitPartialFailure`].
    pub fn ensure_committed(&self) -> Result<(), SyncError> {
        match &self.commit {
            Some(commit) => commit.ensure_complete(),
            None => Ok(()),
        }
    }
}

/// SyncDaemon drives sync cycles.
///
/// Each cycle:
/// 1. Fetches the provider and destination snapshots (either failing aborts the cycle)
/// 2. Matches, builds and assembles the batch
/// 3. Commits it unless running dry
/// 4. Records the cycle summary
pub struct SyncDaemon<P, D> {
    engine: SyncEngine,
    provider: P,
    destination: D,
    config: DaemonConfig,
}

impl<P: ProviderSource, D: DestinationStore> SyncDaemon<P, D> {
    pub fn new(engine: SyncEngine, provider: P, destination: D, config: DaemonConfig) -> Self {
        Self {
            engine,
            provider,
            destination,
            config,
        }
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Fetch both snapshots and build the batch. Has no side effects on the
    /// destination, so it may be abandoned at any point.
    pub async fn prepare_cycle(&self) -> Result<PreparedCycle> {
        let started = Instant::now();

        let (providers, destinations) = tokio::try_join!(
            async {
                self.provider
                    .fetch_latest_readings()
                    .await
                    .context("Failed to fetch provider readings")
            },
            async {
                self.destination
                    .fetch_current_records()
                    .await
                    .context("Failed to fetch destination records")
            },
        )?;

        let (batch, report) = self.engine.run(&destinations, &providers);
        log_report(&report);

        Ok(PreparedCycle {
            batch,
            report,
            started,
        })
    }

    /// Commit a prepared batch and record the outcome.
    pub async fn commit_cycle(&self, prepared: PreparedCycle) -> Result<CycleStats> {
        let PreparedCycle {
            batch,
            report,
            started,
        } = prepared;

        let commit = if self.config.dry_run {
            tracing::info!("Dry run: {} updates not committed", batch.len());
            None
        } else if batch.is_empty() {
            tracing::warn!("No updates to commit");
            None
        } else {
            let result = self
                .destination
                .commit(&batch)
                .await
                .context("Failed to commit updates")?;
            log_commit(&result);
            Some(result)
        };

        let stats = CycleStats {
            batch,
            report,
            commit,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        if let Some(ref path) = self.config.state_path {
            let summary = CycleSummary::new(
                &stats.report,
                stats.commit.as_ref(),
                self.config.dry_run,
                stats.duration_ms,
            );
            if let Err(e) = summary.save(path).await {
                tracing::warn!("Failed to record cycle summary: {:?}", e);
            }
        }

        Ok(stats)
    }

    /// Run a single sync cycle end to end.
    pub async fn run_sync_cycle(&self) -> Result<CycleStats> {
        let prepared = self.prepare_cycle().await?;
        self.commit_cycle(prepared).await
    }

    /// Run the daemon continuously until stopped.
    ///
    /// A shutdown signal abandons a cycle that is still fetching or building;
    /// once a commit has started it is allowed to finish.
    pub async fn run(&self, mut shutdown: tokio::sync::broadcast::Receiver<()>) -> Result<()> {
        if self.config.sync_interval.is_zero() {
            bail!("Sync interval must be greater than zero");
        }
        let mut sync_interval = interval(self.config.sync_interval);
        let mut cycles = 0u64;

        tracing::info!(
            "Starting SyncDaemon with sync_interval={:?}, dry_run={}",
            self.config.sync_interval,
            self.config.dry_run
        );

        loop {
            tokio::select! {
                biased; // Check shutdown first

                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, stopping SyncDaemon");
                    break;
                }
                _ = sync_interval.tick() => {
                    cycles += 1;
                    tracing::info!("Starting sync cycle {}", cycles);

                    let prepared = tokio::select! {
                        biased;
                        _ = shutdown.recv() => {
                            tracing::info!("Shutdown signal received before commit, abandoning cycle");
                            break;
                        }
                        result = self.prepare_cycle() => result,
                    };

                    match prepared {
                        Ok(prepared) => match self.commit_cycle(prepared).await {
                            Ok(stats) => {
                                tracing::info!(
                                    "Sync cycle {} completed: {} updates in {}ms",
                                    cycles,
                                    stats.batch.len(),
                                    stats.duration_ms
                                );
                                if let Err(e) = stats.ensure_committed() {
                                    tracing::warn!("Sync cycle {}: {}", cycles, e);
                                }
                            }
                            Err(e) => {
                                tracing::error!("Sync cycle {} failed to commit: {:?}", cycles, e);
                            }
                        },
                        Err(e) => {
                            // Log with :? to show full error chain including root cause
                            tracing::error!("Sync cycle {} failed: {:?}", cycles, e);
                        }
                    }
                }
            }
        }

        tracing::info!("SyncDaemon stopped after {} cycles", cycles);
        Ok(())
    }
}

/// Log the cycle counters and every station issue.
pub fn log_report(report: &CycleReport) {
    let c = &report.counts;
    tracing::info!(
        "Stations: {} attempted, {} matched, {} updated ({} partial), {} unmatched, {} ambiguous, {} excluded",
        c.attempted,
        c.matched,
        c.updated,
        c.partial,
        c.unmatched,
        c.ambiguous,
        c.excluded
    );

    for issue in &report.issues {
        match issue {
            StationIssue::NonScalarValue { .. } => tracing::error!("{}", issue),
            _ => tracing::warn!("{}", issue),
        }
    }
}

fn log_commit(result: &CommitResult) {
    tracing::info!(
        "Commit: {} accepted, {} rejected",
        result.succeeded(),
        result.failed_count()
    );
    for outcome in result.failed() {
        tracing::warn!(
            "Update for '{}' (object {}) rejected: {}",
            outcome.station,
            outcome.handle,
            outcome.error.as_deref().unwrap_or("no reason given")
        );
    }
}
