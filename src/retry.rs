//! HTTP retry with exponential backoff, shared by the embedding, generation
//! and Elasticsearch adapters.
//!
//! - HTTP 429 and 5xx → retry
//! - network errors → retry
//! - any other status → returned to the caller without retrying
//! - backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{anyhow, bail, Result};
use std::time::Duration;

/// Delay before retry number `attempt` (1-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.saturating_sub(1).min(5))
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

/// Send the request produced by `build`, retrying transient failures up to
/// `max_retries` times.
pub async fn send_with_retry<F>(
    label: &str,
    max_retries: u32,
    mut build: F,
) -> Result<reqwest::Response>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            tracing::warn!(
                attempt,
                max_retries,
                delay_secs = delay.as_secs(),
                "{} request failed, retrying",
                label
            );
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();
                if !is_retryable(status) {
                    return Ok(response);
                }
                let body_text = response.text().await.unwrap_or_default();
                last_err = Some(anyhow!("{} error {}: {}", label, status, body_text));
            }
            Err(e) => {
                last_err = Some(anyhow!("{} connection error: {}", label, e));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} failed after retries", label)))
}

/// Turn a non-success response into an error carrying the body text.
pub async fn ensure_success(label: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body_text = response.text().await.unwrap_or_default();
    bail!("{} error {}: {}", label, status, body_text)
}
