// ABOUTME: Record matcher - joins destination and provider snapshots per registry station
// ABOUTME: First-seen-wins on duplicate join keys, unmatched stations are reported and skipped

use std::collections::HashMap;

use super::error::{MissingSide, Side, StationIssue};
use super::record::{DestinationRecord, ProviderRow, StationId};
use super::registry::StationRegistry;

/// Default join field on both sides.
pub const DEFAULT_JOIN_FIELD: &str = "stationName";

/// Field names holding the station id in each snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinKey {
    /// Looked up case-insensitively
    pub destination_field: String,
    /// Looked up with exact case
    pub provider_field: String,
}

impl Default for JoinKey {
    fn default() -> Self {
        Self {
            destination_field: DEFAULT_JOIN_FIELD.to_string(),
            provider_field: DEFAULT_JOIN_FIELD.to_string(),
        }
    }
}

/// A station with exactly one chosen record on each side.
#[derive(Debug, Clone, Copy)]
pub struct MatchedPair<'a> {
    /// Index of the station in the registry
    pub position: usize,
    pub station: &'a StationId,
    pub destination: &'a DestinationRecord,
    pub provider: &'a ProviderRow,
}

/// Result of matching one pair of snapshots.
#[derive(Debug, Default)]
pub struct MatchOutcome<'a> {
    /// In registry order
    pub pairs: Vec<MatchedPair<'a>>,
    /// `(registry position, issue)` in registry order
    pub issues: Vec<(usize, StationIssue)>,
}

/// First record seen for a join key plus how many records share it.
type KeyIndex<'a, T> = HashMap<String, (&'a T, usize)>;

fn index_by_key<'a, T, F>(items: &'a [T], key: F) -> KeyIndex<'a, T>
where
    F: Fn(&'a T) -> Option<&'a str>,
{
    let mut index: KeyIndex<'a, T> = HashMap::new();
    for item in items {
        if let Some(value) = key(item) {
            index
                .entry(value.to_lowercase())
                .and_modify(|(_, count)| *count += 1)
                .or_insert((item, 1));
        }
    }
    index
}

/// Match every registry station against both snapshots.
///
/// Snapshots may be in any order. When several records share a station id
/// on either side, the first one in snapshot order is used and an
/// [`StationIssue::Ambiguous`] is recorded. Stations missing on either side
/// produce [`StationIssue::Unmatched`] and no pair.
pub fn match_stations<'a>(
    registry: &'a StationRegistry,
    join_key: &JoinKey,
    destinations: &'a [DestinationRecord],
    providers: &'a [ProviderRow],
) -> MatchOutcome<'a> {
    let destination_field = join_key.destination_field.as_str();
    let provider_field = join_key.provider_field.as_str();

    let destination_index = index_by_key(destinations, |d| d.join_value(destination_field));
    let provider_index = index_by_key(providers, |p| p.join_value(provider_field));

    let mut outcome = MatchOutcome::default();

    for (position, station) in registry.iter().enumerate() {
        let key = station.join_key();
        let destination = destination_index.get(&key).copied();
        let provider = provider_index.get(&key).copied();

        let (Some((destination, destination_count)), Some((provider, provider_count))) =
            (destination, provider)
        else {
            if let Some(missing) = MissingSide::from_flags(destination.is_none(), provider.is_none())
            {
                tracing::debug!("Station '{}' unmatched ({} missing)", station, missing);
                outcome.issues.push((
                    position,
                    StationIssue::Unmatched {
                        station: station.clone(),
                        missing,
                    },
                ));
            }
            continue;
        };

        for (side, count) in [
            (Side::Destination, destination_count),
            (Side::Provider, provider_count),
        ] {
            if count > 1 {
                outcome.issues.push((
                    position,
                    StationIssue::Ambiguous {
                        station: station.clone(),
                        side,
                        count,
                    },
                ));
            }
        }

        outcome.pairs.push(MatchedPair {
            position,
            station,
            destination,
            provider,
        });
    }

    outcome
}
