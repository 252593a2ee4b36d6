// ABOUTME: Selective field sync engine - match, build, assemble
// ABOUTME: Pure functions over fully materialized snapshots, no I/O

pub mod batch;
pub mod builder;
pub mod error;
pub mod matcher;
pub mod record;
pub mod registry;

pub use batch::{BatchAssembler, CycleCounts, CycleReport, SyncBatch};
pub use builder::build_update;
pub use error::{MissingSide, Side, StationIssue, SyncError};
pub use matcher::{match_stations, JoinKey, MatchOutcome, MatchedPair};
pub use record::{AttributeMap, DestinationRecord, ProviderRow, RecordHandle, StationId, UpdateRecord};
pub use registry::{FieldWhitelist, StationRegistry};

/// Static inputs of a sync cycle: which stations, which fields, which join key.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    registry: StationRegistry,
    whitelist: FieldWhitelist,
    join_key: JoinKey,
}

impl SyncEngine {
    pub fn new(registry: StationRegistry, whitelist: FieldWhitelist, join_key: JoinKey) -> Self {
        Self {
            registry,
            whitelist,
            join_key,
        }
    }

    pub fn registry(&self) -> &StationRegistry {
        &self.registry
    }

    pub fn whitelist(&self) -> &FieldWhitelist {
        &self.whitelist
    }

    pub fn join_key(&self) -> &JoinKey {
        &self.join_key
    }

    /// Run matching, building and assembling over one pair of snapshots.
    ///
    /// Identical inputs always give identical output, and the batch is in
    /// registry order regardless of snapshot order.
    pub fn run(
        &self,
        destinations: &[DestinationRecord],
        providers: &[ProviderRow],
    ) -> (SyncBatch, CycleReport) {
        let outcome = match_stations(&self.registry, &self.join_key, destinations, providers);

        let mut assembler = BatchAssembler::new(self.registry.len());
        for (position, issue) in outcome.issues {
            assembler.record_issue(position, issue);
        }
        for pair in &outcome.pairs {
            assembler.record_match();
            assembler.push(pair.position, build_update(pair, &self.whitelist));
        }

        let (batch, report) = assembler.finish();
        tracing::debug!(
            "Built {} updates for {} stations ({} issues)",
            batch.len(),
            report.counts.attempted,
            report.issues.len()
        );
        (batch, report)
    }
}
