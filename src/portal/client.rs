// ABOUTME: HTTP client for the destination portal and its hosted feature layer
// ABOUTME: Handles token generation, layer lookup, snapshot queries and applyEdits commits

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use reqwest::header::REFERER;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

use super::models::{
    ApplyEditsResponse, ErrorEnvelope, Feature, QueryResponse, SearchResponse, TokenResponse,
    DEFAULT_OBJECT_ID_FIELD,
};
use crate::collaborators::{CommitResult, DestinationStore, RecordOutcome};
use crate::config::PortalSettings;
use crate::engine::{AttributeMap, DestinationRecord, RecordHandle, SyncBatch, UpdateRecord};
use crate::utils::{redact_url, retry_with_backoff, RetryPolicy};

/// Requested token lifetime in minutes
const TOKEN_EXPIRATION_MINUTES: i64 = 60;

/// Tokens this close to expiry are refreshed before use
const TOKEN_REFRESH_MARGIN_SECS: i64 = 120;

/// Portal error codes for an invalid or missing token
const TOKEN_ERROR_CODES: [i64; 2] = [498, 499];

fn is_token_error(body: &str) -> bool {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map_or(false, |envelope| TOKEN_ERROR_CODES.contains(&envelope.error.code))
}

/// Decode a portal response body, surfacing `{"error": ...}` bodies as errors.
fn decode<T: DeserializeOwned>(body: &str, what: &str) -> Result<T> {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        let error = envelope.error;
        if error.details.is_empty() {
            bail!("{} failed with portal error {}: {}", what, error.code, error.message);
        }
        bail!(
            "{} failed with portal error {}: {} ({})",
            what,
            error.code,
            error.message,
            error.details.join("; ")
        );
    }
    serde_json::from_str(body).with_context(|| format!("Failed to parse {} response", what))
}

struct Token {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Token {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now + ChronoDuration::seconds(TOKEN_REFRESH_MARGIN_SECS) < expires_at,
            None => true,
        }
    }
}

/// Authenticated portal session. Tokens are generated on first use and
/// regenerated when close to expiry.
pub struct PortalSession {
    client: Client,
    settings: PortalSettings,
    retry: RetryPolicy,
    token: Mutex<Option<Token>>,
}

impl PortalSession {
    pub fn new(settings: PortalSettings, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            settings,
            retry,
            token: Mutex::new(None),
        })
    }

    pub fn settings(&self) -> &PortalSettings {
        &self.settings
    }

    /// Current token, generating a new one if missing or about to expire.
    pub async fn token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(token.value.clone());
            }
            tracing::debug!("Portal token is about to expire, regenerating");
        }

        let token = retry_with_backoff(
            || self.generate_token(),
            "Portal token generation",
            self.retry,
        )
        .await?;
        let value = token.value.clone();
        *guard = Some(token);
        Ok(value)
    }

    /// Drop the cached token so the next call generates a new one.
    async fn clear_token(&self) {
        *self.token.lock().await = None;
    }

    async fn generate_token(&self) -> Result<Token> {
        let url = format!("{}/sharing/rest/generateToken", self.settings.portal_url);
        let expiration = TOKEN_EXPIRATION_MINUTES.to_string();

        let response = self
            .client
            .post(&url)
            .form(&[
                ("username", self.settings.username.as_str()),
                ("password", self.settings.password.as_str()),
                ("client", "referer"),
                ("referer", self.settings.portal_url.as_str()),
                ("expiration", expiration.as_str()),
                ("f", "json"),
            ])
            .send()
            .await
            .context("Failed to send token request to portal")?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            bail!(
                "Portal rejected the credentials for user '{}'. Check ESRI_USER and ESRI_PW",
                self.settings.username
            );
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Token request failed with status {}: {}", status, body);
        }

        let body = response
            .text()
            .await
            .context("Failed to read token response")?;
        let token: TokenResponse = decode(&body, "Token request")?;

        tracing::info!("Signed in to portal as {}", self.settings.username);
        Ok(Token {
            value: token.token,
            expires_at: token
                .expires
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        })
    }

    /// GET a portal/layer endpoint with the session token appended.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, &str)],
        what: &str,
    ) -> Result<T> {
        let token = self.token().await?;
        let request = self
            .client
            .get(url)
            .header(REFERER, self.settings.portal_url.as_str())
            .query(params)
            .query(&[("f", "json"), ("token", token.as_str())])
            .build()
            .with_context(|| format!("Failed to build {} request", what))?;
        tracing::debug!("GET {}", redact_url(request.url().as_str()));

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| e.without_url())
            .with_context(|| format!("Failed to send {} request", what))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("{} failed with status {}: {}", what, status, body);
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read {} response", what))?;
        if is_token_error(&body) {
            tracing::warn!("Portal rejected the session token, signing in again on retry");
            self.clear_token().await;
        }
        decode(&body, what)
    }

    /// POST a form to a portal/layer endpoint with the session token appended.
    async fn post_form<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, &str)],
        what: &str,
    ) -> Result<T> {
        let token = self.token().await?;
        let mut form: Vec<(&str, &str)> = params.to_vec();
        form.push(("f", "json"));
        form.push(("token", token.as_str()));

        tracing::debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .header(REFERER, self.settings.portal_url.as_str())
            .form(&form)
            .send()
            .await
            .map_err(|e| e.without_url())
            .with_context(|| format!("Failed to send {} request", what))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("{} failed with status {}: {}", what, status, body);
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read {} response", what))?;
        if is_token_error(&body) {
            tracing::warn!("Portal rejected the session token, signing in again on retry");
            self.clear_token().await;
        }
        decode(&body, what)
    }

    /// Find the feature service owned by the signed-in user with the
    /// configured title and return the URL of its first layer.
    pub async fn find_layer_url(&self) -> Result<String> {
        let url = format!("{}/sharing/rest/search", self.settings.portal_url);
        let query = format!(
            "owner:{} AND title:{} AND type:\"Feature Service\"",
            self.settings.username, self.settings.layer_title
        );

        let params = [("q", query.as_str()), ("num", "10")];

        let response: SearchResponse = retry_with_backoff(
            || self.get_json(&url, &params, "Content search"),
            "Content search",
            self.retry,
        )
        .await?;

        let item = response.results.into_iter().next().with_context(|| {
            format!(
                "Could not find feature service '{}' owned by {}. Check the layer title",
                self.settings.layer_title, self.settings.username
            )
        })?;
        let service_url = item.url.with_context(|| {
            format!("Feature service '{}' ({}) has no URL", item.title, item.id)
        })?;

        Ok(format!("{}/0", service_url.trim_end_matches('/')))
    }
}

/// The hosted feature layer holding one record per station.
pub struct FeatureLayer {
    session: PortalSession,
    url: String,
}

impl FeatureLayer {
    /// Open the configured layer, searching by title unless a layer URL is set.
    pub async fn open(session: PortalSession) -> Result<Self> {
        let url = match session.settings().layer_url.clone() {
            Some(url) => url,
            None => session.find_layer_url().await?,
        };
        tracing::info!("Using feature layer {}", url);
        Ok(Self { session, url })
    }

    pub fn with_url(session: PortalSession, url: impl Into<String>) -> Self {
        Self {
            session,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn query_page(&self, offset: usize) -> Result<QueryResponse> {
        let url = format!("{}/query", self.url);
        let offset = offset.to_string();
        let params = [
            ("where", "1=1"),
            ("outFields", "*"),
            ("returnGeometry", "true"),
            ("resultOffset", offset.as_str()),
        ];
        retry_with_backoff(
            || self.session.get_json(&url, &params, "Feature query"),
            "Feature query",
            self.session.retry,
        )
        .await
    }
}

fn to_record(feature: Feature, object_id_field: &str) -> Option<DestinationRecord> {
    let attributes: AttributeMap = feature.attributes.into();
    let handle = attributes
        .get_ignore_case(object_id_field)
        .and_then(|v| v.as_i64())?;
    let mut record = DestinationRecord::new(RecordHandle(handle), attributes);
    record.geometry = feature.geometry;
    Some(record)
}

/// Feature payload for one update; the object id always carries the handle.
pub fn to_feature(update: &UpdateRecord, object_id_field: &str) -> Feature {
    let mut attributes = update.attributes.clone();
    attributes.set_ignore_case(object_id_field, update.handle.0.into());
    Feature {
        attributes: attributes.into(),
        geometry: update.geometry.clone(),
    }
}

fn outcomes_from_response(batch: &SyncBatch, response: ApplyEditsResponse) -> CommitResult {
    let mut results: HashMap<i64, (bool, Option<String>)> = response
        .update_results
        .into_iter()
        .map(|r| {
            let error = r
                .error
                .map(|e| format!("error {}: {}", e.code, e.description));
            (r.object_id, (r.success, error))
        })
        .collect();

    let outcomes = batch
        .iter()
        .map(|update| {
            let (success, error) = results
                .remove(&update.handle.0)
                .unwrap_or_else(|| (false, Some("no edit result returned".to_string())));
            RecordOutcome {
                station: update.station.clone(),
                handle: update.handle,
                success,
                error,
            }
        })
        .collect();

    CommitResult { outcomes }
}

#[async_trait]
impl DestinationStore for FeatureLayer {
    async fn fetch_current_records(&self) -> Result<Vec<DestinationRecord>> {
        let mut records = Vec::new();
        let mut skipped = 0usize;

        loop {
            let page = self.query_page(records.len() + skipped).await?;
            let object_id_field = page
                .object_id_field_name
                .clone()
                .unwrap_or_else(|| DEFAULT_OBJECT_ID_FIELD.to_string());
            let received = page.features.len();

            for feature in page.features {
                match to_record(feature, &object_id_field) {
                    Some(record) => records.push(record),
                    None => skipped += 1,
                }
            }

            if !page.exceeded_transfer_limit || received == 0 {
                break;
            }
        }

        if skipped > 0 {
            tracing::warn!("Skipped {} features without an object id", skipped);
        }
        tracing::info!("Fetched {} destination records", records.len());
        Ok(records)
    }

    async fn commit(&self, batch: &SyncBatch) -> Result<CommitResult> {
        if batch.is_empty() {
            return Ok(CommitResult::default());
        }

        let features: Vec<Feature> = batch
            .iter()
            .map(|u| to_feature(u, DEFAULT_OBJECT_ID_FIELD))
            .collect();
        let updates =
            serde_json::to_string(&features).context("Failed to serialize feature updates")?;
        let url = format!("{}/applyEdits", self.url);

        tracing::info!("Submitting {} feature updates", features.len());
        let params = [("updates", updates.as_str()), ("rollbackOnFailure", "false")];
        let response: ApplyEditsResponse = retry_with_backoff(
            || self.session.post_form(&url, &params, "Apply edits"),
            "Apply edits",
            self.session.retry,
        )
        .await?;

        Ok(outcomes_from_response(batch, response))
    }
}
