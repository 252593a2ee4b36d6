// ABOUTME: HTTP client for the real-time air quality provider
// ABOUTME: Polls nationwide readings and turns the response envelope into provider rows

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::models::{Envelope, RESULT_CODE_OK};
use crate::collaborators::ProviderSource;
use crate::config::ProviderSettings;
use crate::engine::{ProviderRow, SyncError};
use crate::utils::{redact_url, retry_with_backoff, RetryPolicy};

/// Operation returning real-time readings per province
pub const READINGS_OPERATION: &str = "getCtprvnRltmMesureDnsty";

pub struct ProviderClient {
    client: Client,
    settings: ProviderSettings,
    retry: RetryPolicy,
}

impl ProviderClient {
    pub fn new(settings: ProviderSettings, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            settings,
            retry,
        })
    }

    fn readings_url(&self) -> String {
        format!("{}/{}", self.settings.base_url, READINGS_OPERATION)
    }

    async fn fetch_page(&self, page_no: u32) -> Result<ProviderPage> {
        let url = self.readings_url();
        let num_of_rows = self.settings.num_of_rows.to_string();
        let page_param = page_no.to_string();

        let request = self
            .client
            .get(&url)
            .query(&[
                ("serviceKey", self.settings.service_key.as_str()),
                ("returnType", "json"),
                ("numOfRows", num_of_rows.as_str()),
                ("pageNo", page_param.as_str()),
                ("sidoName", self.settings.sido_name.as_str()),
                ("ver", "1.0"),
            ])
            .build()
            .context("Failed to build provider request")?;
        tracing::debug!("GET {}", redact_url(request.url().as_str()));

        let response = self.client.execute(request).await.map_err(|e| {
            SyncError::ProviderUnavailable(format!(
                "request to {} failed: {}",
                url,
                e.without_url()
            ))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::ProviderUnavailable(format!(
                "provider returned status {}: {}",
                status, body
            ))
            .into());
        }

        let body = response.text().await.map_err(|e| {
            SyncError::ProviderUnavailable(format!("failed to read provider response: {}", e))
        })?;
        let page = parse_envelope(&body)?;

        if let Some(returned) = page.page_no {
            if returned != page_no {
                return Err(SyncError::ProviderUnavailable(format!(
                    "requested page {} but provider returned page {}",
                    page_no, returned
                ))
                .into());
            }
        }
        tracing::debug!(
            "Provider page {}: {} rows ({} per page, {} total)",
            page_no,
            page.rows.len(),
            page.num_of_rows.unwrap_or(self.settings.num_of_rows),
            page.total_count.map_or_else(|| "unknown".to_string(), |t| t.to_string())
        );
        Ok(page)
    }
}

/// One page of provider rows plus the paging fields of its envelope.
#[derive(Debug, Clone)]
pub struct ProviderPage {
    pub rows: Vec<ProviderRow>,
    /// Rows available across all pages
    pub total_count: Option<u64>,
    pub page_no: Option<u32>,
    pub num_of_rows: Option<u32>,
}

/// Unwrap `response.body.items` into provider rows.
///
/// A non-`00` result code or an unexpected shape is a provider failure.
pub fn parse_envelope(body: &str) -> Result<ProviderPage, SyncError> {
    let envelope: Envelope = serde_json::from_str(body).map_err(|e| {
        SyncError::ProviderUnavailable(format!("malformed provider response envelope: {}", e))
    })?;

    if let Some(header) = &envelope.response.header {
        if header.result_code != RESULT_CODE_OK {
            return Err(SyncError::ProviderUnavailable(format!(
                "provider result code {}: {}",
                header.result_code,
                header.result_msg.as_deref().unwrap_or("no message")
            )));
        }
    }

    let body = envelope.response.body;
    Ok(ProviderPage {
        rows: body
            .items
            .into_iter()
            .map(|item| ProviderRow::new(item.into()))
            .collect(),
        total_count: body.total_count,
        page_no: body.page_no,
        num_of_rows: body.num_of_rows,
    })
}

#[async_trait]
impl ProviderSource for ProviderClient {
    /// Fetch pages until `totalCount` rows are collected. A page that comes
    /// back empty before then means the snapshot is incomplete.
    async fn fetch_latest_readings(&self) -> Result<Vec<ProviderRow>> {
        let mut rows = Vec::new();
        let mut page_no = 1u32;

        loop {
            let page =
                retry_with_backoff(|| self.fetch_page(page_no), "Provider fetch", self.retry)
                    .await?;
            let received = page.rows.len();
            rows.extend(page.rows);

            let Some(total) = page.total_count else {
                break;
            };
            if rows.len() as u64 >= total {
                break;
            }
            if received == 0 {
                return Err(SyncError::ProviderUnavailable(format!(
                    "provider reported {} rows but page {} was empty after {}",
                    total,
                    page_no,
                    rows.len()
                ))
                .into());
            }
            page_no += 1;
        }

        tracing::info!("Fetched {} provider rows in {} pages", rows.len(), page_no);
        Ok(rows)
    }
}
