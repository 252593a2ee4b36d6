// ABOUTME: Record types shared by the field sync engine
// ABOUTME: Attribute maps with case-insensitive lookup, station ids, destination/provider records

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Field name to value mapping backing every record the engine touches.
///
/// Two lookup modes are offered:
/// - [`AttributeMap::get`] matches the field name exactly (provider rows).
/// - [`AttributeMap::get_ignore_case`] returns the first field, in insertion
///   order, whose lower-case name equals the lower-cased query (destination
///   records, whose field names the portal lower-cases).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeMap(Map<String, Value>);

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact-case lookup.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Case-insensitive lookup.
    pub fn get_ignore_case(&self, field: &str) -> Option<&Value> {
        self.key_ignore_case(field).and_then(|key| self.0.get(key))
    }

    /// Exact-case insert, returning the previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    /// Overwrite the field matching `field` case-insensitively, keeping the
    /// existing spelling. Inserts the lower-cased name when no field matches.
    pub fn set_ignore_case(&mut self, field: &str, value: Value) -> Option<Value> {
        let key = self
            .key_ignore_case(field)
            .map(str::to_owned)
            .unwrap_or_else(|| field.to_lowercase());
        self.0.insert(key, value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    fn key_ignore_case(&self, field: &str) -> Option<&str> {
        let wanted = field.to_lowercase();
        self.0
            .keys()
            .find(|key| key.to_lowercase() == wanted)
            .map(String::as_str)
    }
}

impl From<Map<String, Value>> for AttributeMap {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<AttributeMap> for Map<String, Value> {
    fn from(map: AttributeMap) -> Self {
        map.0
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for AttributeMap {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Station identifier used as the join key.
///
/// Equality and hashing use the lower-cased form; `Display` keeps the
/// spelling it was created with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationId(String);

impl StationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Normalized form used for join comparisons.
    pub fn join_key(&self) -> String {
        self.0.to_lowercase()
    }
}

impl PartialEq for StationId {
    fn eq(&self, other: &Self) -> bool {
        self.join_key() == other.join_key()
    }
}

impl Eq for StationId {}

impl Hash for StationId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.join_key().hash(state);
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Address of a remote record (the feature layer's object id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordHandle(pub i64);

impl fmt::Display for RecordHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One station's current state in the destination store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationRecord {
    pub handle: RecordHandle,
    pub attributes: AttributeMap,
    /// Carried through to updates untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,
}

impl DestinationRecord {
    pub fn new(handle: RecordHandle, attributes: AttributeMap) -> Self {
        Self {
            handle,
            attributes,
            geometry: None,
        }
    }

    pub fn with_geometry(mut self, geometry: Value) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Join key value, looked up case-insensitively.
    pub fn join_value(&self, field: &str) -> Option<&str> {
        self.attributes.get_ignore_case(field).and_then(Value::as_str)
    }
}

/// One station's freshly polled measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderRow {
    pub attributes: AttributeMap,
}

impl ProviderRow {
    pub fn new(attributes: AttributeMap) -> Self {
        Self { attributes }
    }

    /// Join key value, looked up with the provider's exact field spelling.
    pub fn join_value(&self, field: &str) -> Option<&str> {
        self.attributes.get(field).and_then(Value::as_str)
    }
}

/// A patched, independently owned copy of a destination record.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRecord {
    pub station: StationId,
    pub handle: RecordHandle,
    pub attributes: AttributeMap,
    pub geometry: Option<Value>,
    /// Whitelisted fields the provider row did not supply
    pub missing_fields: Vec<String>,
}

impl UpdateRecord {
    /// Start an update as a full copy of `destination`.
    pub fn from_destination(station: StationId, destination: &DestinationRecord) -> Self {
        let copy = destination.clone();
        Self {
            station,
            handle: copy.handle,
            attributes: copy.attributes,
            geometry: copy.geometry,
            missing_fields: Vec::new(),
        }
    }

    pub fn is_partial(&self) -> bool {
        !self.missing_fields.is_empty()
    }

    /// Case-insensitive attribute read.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes.get_ignore_case(field)
    }
}
