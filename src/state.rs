// ABOUTME: Persisted summary of the last sync cycle
// ABOUTME: Written after each cycle, read back by the status command

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::collaborators::CommitResult;
use crate::engine::{CycleCounts, CycleReport};

/// Outcome of one cycle, without any record contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub finished_at: chrono::DateTime<chrono::Utc>,
    pub dry_run: bool,
    pub counts: CycleCounts,
    /// Rendered station issues, in registry order
    pub issues: Vec<String>,
    /// None when nothing was committed (dry run or empty batch)
    pub committed: Option<usize>,
    pub rejected: Vec<String>,
    pub duration_ms: u64,
}

impl CycleSummary {
    pub fn new(
        report: &CycleReport,
        commit: Option<&CommitResult>,
        dry_run: bool,
        duration_ms: u64,
    ) -> Self {
        Self {
            finished_at: chrono::Utc::now(),
            dry_run,
            counts: report.counts,
            issues: report.issues.iter().map(|i| i.to_string()).collect(),
            committed: commit.map(CommitResult::succeeded),
            rejected: commit
                .map(|c| {
                    c.failed()
                        .map(|o| {
                            format!(
                                "{} (object {}): {}",
                                o.station,
                                o.handle,
                                o.error.as_deref().unwrap_or("rejected")
                            )
                        })
                        .collect()
                })
                .unwrap_or_default(),
            duration_ms,
        }
    }

    /// Default location: ~/.station-sync/last_cycle.json
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".station-sync")
            .join("last_cycle.json")
    }

    /// Load a summary, returning None if no cycle has been recorded yet.
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read cycle summary from {:?}", path))?;
        let summary = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cycle summary from {:?}", path))?;
        Ok(Some(summary))
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create state directory {:?}", parent))?;
        }

        let contents =
            serde_json::to_string_pretty(self).context("Failed to serialize cycle summary")?;

        // Write to temp file first, then rename for atomicity
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &contents)
            .await
            .with_context(|| format!("Failed to write cycle summary to {:?}", temp_path))?;
        fs::rename(&temp_path, path)
            .await
            .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;

        Ok(())
    }
}
