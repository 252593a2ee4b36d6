// ABOUTME: Interfaces between the sync engine and its I/O collaborators
// ABOUTME: Provider polling, destination snapshot/commit, and per-record commit results

use anyhow::Result;
use async_trait::async_trait;

use crate::engine::{DestinationRecord, ProviderRow, RecordHandle, StationId, SyncBatch, SyncError};

/// Source of fresh measurement rows.
#[async_trait]
pub trait ProviderSource: Send + Sync {
    /// Fetch one complete polling snapshot.
    ///
    /// Fails with [`SyncError::ProviderUnavailable`] on a non-success status or
    /// a malformed response envelope.
    async fn fetch_latest_readings(&self) -> Result<Vec<ProviderRow>>;
}

/// The authoritative record store.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Read every record of the configured collection.
    async fn fetch_current_records(&self) -> Result<Vec<DestinationRecord>>;

    /// Submit a batch of updates. The store may apply a batch partially; the
    /// returned result reports each record.
    async fn commit(&self, batch: &SyncBatch) -> Result<CommitResult>;
}

/// Outcome of committing one update record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub station: StationId,
    pub handle: RecordHandle,
    pub success: bool,
    pub error: Option<String>,
}

/// Per-record outcomes of one commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitResult {
    pub outcomes: Vec<RecordOutcome>,
}

impl CommitResult {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &RecordOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }

    pub fn failed_count(&self) -> usize {
        self.failed().count()
    }

    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(|o| o.success)
    }

    /// Convert rejected records into [`SyncError::CommitPartialFailure`].
    pub fn ensure_complete(&self) -> Result<(), SyncError> {
        let failed = self.failed_count();
        if failed > 0 {
            return Err(SyncError::CommitPartialFailure {
                attempted: self.outcomes.len(),
                failed,
            });
        }
        Ok(())
    }
}
