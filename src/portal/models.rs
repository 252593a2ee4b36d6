// ABOUTME: Data structures of the portal / feature service REST API
// ABOUTME: Token, content search, feature query and applyEdits payloads

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default object id field of hosted feature layers
pub const DEFAULT_OBJECT_ID_FIELD: &str = "objectid";

/// Error body returned with HTTP 200 by the portal
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: PortalError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortalError {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    /// Expiry in epoch milliseconds
    #[serde(default)]
    pub expires: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(default)]
    pub object_id_field_name: Option<String>,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub exceeded_transfer_limit: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyEditsResponse {
    #[serde(default)]
    pub update_results: Vec<EditResult>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditResult {
    pub object_id: i64,
    pub success: bool,
    #[serde(default)]
    pub error: Option<EditError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditError {
    pub code: i64,
    #[serde(default)]
    pub description: String,
}
