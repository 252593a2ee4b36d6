// ABOUTME: Error taxonomy for field sync cycles
// ABOUTME: Per-station issues are collected into the cycle report; SyncError aborts or flags a cycle

use std::fmt;
use thiserror::Error;

use super::record::StationId;

/// Which snapshot a join problem was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Destination,
    Provider,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Destination => f.write_str("destination"),
            Side::Provider => f.write_str("provider"),
        }
    }
}

/// Snapshot(s) with no record for a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingSide {
    Destination,
    Provider,
    Both,
}

impl MissingSide {
    pub fn from_flags(destination_missing: bool, provider_missing: bool) -> Option<Self> {
        match (destination_missing, provider_missing) {
            (true, true) => Some(MissingSide::Both),
            (true, false) => Some(MissingSide::Destination),
            (false, true) => Some(MissingSide::Provider),
            (false, false) => None,
        }
    }
}

impl fmt::Display for MissingSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingSide::Destination => f.write_str("destination"),
            MissingSide::Provider => f.write_str("provider"),
            MissingSide::Both => f.write_str("destination or provider"),
        }
    }
}

/// Recoverable, per-station problems found while matching or building.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StationIssue {
    /// Station skipped: no record on one or both sides.
    #[error("station '{station}' has no {missing} record")]
    Unmatched {
        station: StationId,
        missing: MissingSide,
    },

    /// Several records share the station id; the first one in snapshot order was used.
    #[error("station '{station}' matched {count} {side} records, using the first")]
    Ambiguous {
        station: StationId,
        side: Side,
        count: usize,
    },

    /// Whitelisted field absent from the provider row; destination value kept.
    #[error("provider row for station '{station}' has no field '{field}'")]
    MissingSourceField { station: StationId, field: String },

    /// Provider value cannot be stored as a record attribute; station excluded.
    #[error("provider value for '{field}' at station '{station}' is not a scalar")]
    NonScalarValue { station: StationId, field: String },
}

impl StationIssue {
    pub fn station(&self) -> &StationId {
        match self {
            StationIssue::Unmatched { station, .. }
            | StationIssue::Ambiguous { station, .. }
            | StationIssue::MissingSourceField { station, .. }
            | StationIssue::NonScalarValue { station, .. } => station,
        }
    }
}

/// Errors that abort a cycle or are surfaced to the caller after commit.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("commit partially failed: {failed} of {attempted} records were rejected")]
    CommitPartialFailure { attempted: usize, failed: usize },
}
