// ABOUTME: Static configuration loading and environment resolution
// ABOUTME: Reads station/field lists from text files and resolves provider/portal settings

use anyhow::{Context, Result};
use clap::Args;
use std::fmt;
use std::path::Path;

use crate::engine::{FieldWhitelist, JoinKey, StationRegistry, SyncError};

pub const DEFAULT_STATIONS_FILE: &str = "station_names.txt";
pub const DEFAULT_FIELDS_FILE: &str = "to_be_updated_fields.txt";
pub const DEFAULT_PORTAL_URL: &str = "https://portal.esrikr.com/portal";
pub const DEFAULT_LAYER_TITLE: &str = "KoreaAirQuality";
/// Nationwide readings
pub const DEFAULT_SIDO_NAME: &str = "전국";

/// Split a text resource into entries: one per line, trimmed, blank lines
/// and `#` comments skipped, order preserved.
pub fn parse_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

fn read_list(path: &Path, what: &str) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        SyncError::Configuration(format!(
            "failed to read {} from {}: {}",
            what,
            path.display(),
            e
        ))
    })?;
    let entries = parse_lines(&text);
    if entries.is_empty() {
        return Err(SyncError::Configuration(format!(
            "{} file {} has no entries",
            what,
            path.display()
        ))
        .into());
    }
    tracing::debug!("Loaded {} {} from {}", entries.len(), what, path.display());
    Ok(entries)
}

/// Load the station registry (one station name per line).
pub fn load_station_registry(path: &Path) -> Result<StationRegistry> {
    Ok(StationRegistry::new(read_list(path, "station names")?))
}

/// Load the field whitelist (one provider field name per line).
pub fn load_field_whitelist(path: &Path) -> Result<FieldWhitelist> {
    Ok(FieldWhitelist::new(read_list(path, "update fields")?))
}

/// AirKorea real-time measurement API settings.
#[derive(Clone)]
pub struct ProviderSettings {
    /// Base URL of the measurement service (without the operation name)
    pub base_url: String,
    pub service_key: String,
    pub sido_name: String,
    pub num_of_rows: u32,
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("base_url", &self.base_url)
            .field("service_key", &"***")
            .field("sido_name", &self.sido_name)
            .field("num_of_rows", &self.num_of_rows)
            .finish()
    }
}

/// Destination portal settings.
#[derive(Clone)]
pub struct PortalSettings {
    pub portal_url: String,
    pub username: String,
    pub password: String,
    pub layer_title: String,
    /// Skips the content search when set
    pub layer_url: Option<String>,
}

impl fmt::Debug for PortalSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalSettings")
            .field("portal_url", &self.portal_url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("layer_title", &self.layer_title)
            .field("layer_url", &self.layer_url)
            .finish()
    }
}

/// Resolved connection settings, built once and passed by reference.
#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: ProviderSettings,
    pub portal: PortalSettings,
}

/// Provider and portal flags, each with an environment variable fallback.
#[derive(Args, Clone, Default)]
pub struct ConnectionArgs {
    /// Base URL of the real-time air quality service
    #[arg(long = "aqi-url", env = "AQI_URL")]
    pub aqi_url: Option<String>,
    /// data.go.kr service key
    #[arg(long = "service-key", env = "DATAGOKR_KEY", hide_env_values = true)]
    pub service_key: Option<String>,
    /// Province filter passed to the provider
    #[arg(long = "sido-name", default_value = DEFAULT_SIDO_NAME)]
    pub sido_name: String,
    /// Rows requested per provider call
    #[arg(long = "num-of-rows", default_value_t = 1000)]
    pub num_of_rows: u32,
    /// Portal base URL
    #[arg(long = "portal-url", env = "PORTAL_URL", default_value = DEFAULT_PORTAL_URL)]
    pub portal_url: String,
    /// Portal user name
    #[arg(long = "portal-user", env = "ESRI_USER")]
    pub portal_user: Option<String>,
    /// Portal password
    #[arg(long = "portal-password", env = "ESRI_PW", hide_env_values = true)]
    pub portal_password: Option<String>,
    /// Title of the feature service to update
    #[arg(long = "layer-title", env = "LAYER_TITLE", default_value = DEFAULT_LAYER_TITLE)]
    pub layer_title: String,
    /// Feature layer URL; skips the search by title
    #[arg(long = "layer-url", env = "LAYER_URL")]
    pub layer_url: Option<String>,
}

impl ConnectionArgs {
    /// Resolve all required values, failing with every missing name at once.
    pub fn resolve(&self) -> Result<Settings> {
        let mut missing = Vec::new();
        let mut require = |value: &Option<String>, name: &'static str| -> String {
            match value.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => v.to_string(),
                _ => {
                    missing.push(name);
                    String::new()
                }
            }
        };

        let base_url = require(&self.aqi_url, "AQI_URL");
        let service_key = require(&self.service_key, "DATAGOKR_KEY");
        let username = require(&self.portal_user, "ESRI_USER");
        let password = require(&self.portal_password, "ESRI_PW");

        if !missing.is_empty() {
            return Err(SyncError::Configuration(format!(
                "missing required settings: {}",
                missing.join(", ")
            ))
            .into());
        }

        Ok(Settings {
            provider: ProviderSettings {
                base_url: base_url.trim_end_matches('/').to_string(),
                service_key,
                sido_name: self.sido_name.clone(),
                num_of_rows: self.num_of_rows,
            },
            portal: PortalSettings {
                portal_url: self.portal_url.trim_end_matches('/').to_string(),
                username,
                password,
                layer_title: self.layer_title.clone(),
                layer_url: self
                    .layer_url
                    .as_deref()
                    .map(|u| u.trim_end_matches('/').to_string()),
            },
        })
    }
}

/// Station/field list locations and join key overrides.
#[derive(Args, Clone)]
pub struct EngineArgs {
    /// Station names file, one per line
    #[arg(long, default_value = DEFAULT_STATIONS_FILE)]
    pub stations: std::path::PathBuf,
    /// Whitelisted provider field names file, one per line
    #[arg(long, default_value = DEFAULT_FIELDS_FILE)]
    pub fields: std::path::PathBuf,
    /// Destination field holding the station name (case-insensitive)
    #[arg(long, default_value = crate::engine::matcher::DEFAULT_JOIN_FIELD)]
    pub destination_join_field: String,
    /// Provider field holding the station name (exact case)
    #[arg(long, default_value = crate::engine::matcher::DEFAULT_JOIN_FIELD)]
    pub provider_join_field: String,
}

impl EngineArgs {
    pub fn load(&self) -> Result<(StationRegistry, FieldWhitelist, JoinKey)> {
        let registry = load_station_registry(&self.stations)
            .with_context(|| format!("Failed to load stations from {}", self.stations.display()))?;
        let whitelist = load_field_whitelist(&self.fields)
            .with_context(|| format!("Failed to load fields from {}", self.fields.display()))?;
        let join_key = JoinKey {
            destination_field: self.destination_join_field.clone(),
            provider_field: self.provider_join_field.clone(),
        };
        Ok((registry, whitelist, join_key))
    }
}
