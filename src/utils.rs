// ABOUTME: Utility functions shared by the collaborators
// ABOUTME: Provides retry with exponential backoff and secret redaction for logged URLs

use anyhow::Result;
use std::time::Duration;
use url::Url;

/// Query parameters whose values must never reach the logs
const SECRET_PARAMS: &[&str] = &["servicekey", "token", "password", "key"];

/// Retry policy applied to collaborator transport calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = single attempt)
    pub max_retries: u32,
    /// Delay before the first retry, doubled after each
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting. Used by tests.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
        }
    }
}

/// Retry an async operation with exponential backoff.
///
/// # Arguments
///
/// * `operation` - Async function to retry (FnMut returning Future\<Output = Result\<T\>\>)
/// * `what` - Short description used in retry warnings
/// * `policy` - Number of retries and initial delay
///
/// # Returns
///
/// The first successful result, or the last error once all retries are used.
///
/// # Examples
///
/// ```no_run
/// # use anyhow::Result;
/// # use station_sync::utils::{retry_with_backoff, RetryPolicy};
/// # async fn example() -> Result<()> {
/// let value = retry_with_backoff(|| async { Ok(42) }, "fetch", RetryPolicy::default()).await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<F, Fut, T>(
    mut operation: F,
    what: &str,
    policy: RetryPolicy,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = policy.initial_delay;
    let mut last_error = None;

    for attempt in 0..=policy.max_retries {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempt < policy.max_retries {
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}, retrying in {:?}...",
                        what,
                        attempt + 1,
                        policy.max_retries + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("{} failed after retries", what)))
}

/// Replace secret query parameter values (service keys, tokens) with `***`.
///
/// Strings that do not parse as URLs are returned unchanged.
pub fn redact_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };

    if url.query().is_none() {
        return url.to_string();
    }

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            if SECRET_PARAMS.contains(&k.to_lowercase().as_str()) {
                (k.into_owned(), "***".to_string())
            } else {
                (k.into_owned(), v.into_owned())
            }
        })
        .collect();

    url.query_pairs_mut().clear().extend_pairs(pairs);
    url.to_string()
}
