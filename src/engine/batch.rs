// ABOUTME: Batch assembler - orders update records and tallies the cycle report
// ABOUTME: Output order is registry order restricted to included stations

use serde::{Deserialize, Serialize};

use super::error::StationIssue;
use super::record::{StationId, UpdateRecord};

/// All update records produced by one cycle, in registry order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncBatch {
    records: Vec<UpdateRecord>,
}

impl SyncBatch {
    pub fn records(&self) -> &[UpdateRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &UpdateRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stations(&self) -> Vec<&StationId> {
        self.records.iter().map(|r| &r.station).collect()
    }

    pub fn get(&self, station: &StationId) -> Option<&UpdateRecord> {
        self.records.iter().find(|r| &r.station == station)
    }

    pub fn into_records(self) -> Vec<UpdateRecord> {
        self.records
    }
}

/// Counters reported for every cycle, including fully successful ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleCounts {
    /// Stations in the registry
    pub attempted: usize,
    /// Stations found on both sides
    pub matched: usize,
    /// Update records in the batch
    pub updated: usize,
    /// Update records with at least one missing source field
    pub partial: usize,
    pub unmatched: usize,
    /// Ambiguous joins (a station can count once per side)
    pub ambiguous: usize,
    /// Matched stations dropped because their update could not be built
    pub excluded: usize,
}

/// Per-station problems of one cycle plus the counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub counts: CycleCounts,
    /// In registry order
    pub issues: Vec<StationIssue>,
}

impl CycleReport {
    /// True when every registry station was updated without any issue.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues_for<'a>(
        &'a self,
        station: &'a StationId,
    ) -> impl Iterator<Item = &'a StationIssue> + 'a {
        self.issues.iter().filter(move |i| i.station() == station)
    }
}

/// Collects builder output and issues for one cycle.
///
/// Entries carry the station's registry position so the finished batch is
/// in registry order no matter in which order stations were processed.
#[derive(Debug, Default)]
pub struct BatchAssembler {
    records: Vec<(usize, UpdateRecord)>,
    issues: Vec<(usize, StationIssue)>,
    counts: CycleCounts,
}

impl BatchAssembler {
    pub fn new(attempted: usize) -> Self {
        Self {
            counts: CycleCounts {
                attempted,
                ..CycleCounts::default()
            },
            ..Self::default()
        }
    }

    /// Record a station found on both sides.
    pub fn record_match(&mut self) {
        self.counts.matched += 1;
    }

    pub fn record_issue(&mut self, position: usize, issue: StationIssue) {
        match &issue {
            StationIssue::Unmatched { .. } => self.counts.unmatched += 1,
            StationIssue::Ambiguous { .. } => self.counts.ambiguous += 1,
            StationIssue::NonScalarValue { .. } => self.counts.excluded += 1,
            StationIssue::MissingSourceField { .. } => {}
        }
        self.issues.push((position, issue));
    }

    /// Add the builder result for the station at `position`.
    pub fn push(&mut self, position: usize, result: Result<UpdateRecord, StationIssue>) {
        match result {
            Ok(update) => {
                if update.is_partial() {
                    self.counts.partial += 1;
                    for field in &update.missing_fields {
                        self.issues.push((
                            position,
                            StationIssue::MissingSourceField {
                                station: update.station.clone(),
                                field: field.clone(),
                            },
                        ));
                    }
                }
                self.counts.updated += 1;
                self.records.push((position, update));
            }
            Err(issue) => self.record_issue(position, issue),
        }
    }

    pub fn finish(mut self) -> (SyncBatch, CycleReport) {
        // Stable sorts keep per-station issue order
        self.records.sort_by_key(|(position, _)| *position);
        self.issues.sort_by_key(|(position, _)| *position);

        let batch = SyncBatch {
            records: self.records.into_iter().map(|(_, r)| r).collect(),
        };
        let report = CycleReport {
            counts: self.counts,
            issues: self.issues.into_iter().map(|(_, i)| i).collect(),
        };
        (batch, report)
    }
}
