// ABOUTME: Station registry and field whitelist value objects
// ABOUTME: Both are ordered, de-duplicated case-insensitively, first spelling wins

use std::collections::HashSet;

use super::record::StationId;

/// Ordered set of stations that take part in a sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StationRegistry {
    stations: Vec<StationId>,
}

impl StationRegistry {
    pub fn new<I, S>(stations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut kept = Vec::new();
        for station in stations {
            let station = StationId::new(station);
            if seen.insert(station.join_key()) {
                kept.push(station);
            } else {
                tracing::warn!("Ignoring duplicate station '{}' in registry", station);
            }
        }
        Self { stations: kept }
    }

    pub fn iter(&self) -> impl Iterator<Item = &StationId> {
        self.stations.iter()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn contains(&self, station: &StationId) -> bool {
        self.stations.contains(station)
    }

    /// Registry position of a station, used to order batch output.
    pub fn position(&self, station: &StationId) -> Option<usize> {
        self.stations.iter().position(|s| s == station)
    }
}

/// Ordered set of field names the engine may overwrite.
///
/// Names are the provider's spelling; the destination field is resolved
/// case-insensitively when an update is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldWhitelist {
    fields: Vec<String>,
}

impl FieldWhitelist {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut kept = Vec::new();
        for field in fields {
            let field = field.into();
            if seen.insert(field.to_lowercase()) {
                kept.push(field);
            } else {
                tracing::warn!("Ignoring duplicate field '{}' in whitelist", field);
            }
        }
        Self { fields: kept }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Case-insensitive membership test.
    pub fn contains(&self, field: &str) -> bool {
        let wanted = field.to_lowercase();
        self.fields.iter().any(|f| f.to_lowercase() == wanted)
    }
}
