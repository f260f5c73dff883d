//! Shared HTTP transport with bounded retry.
//!
//! All adapters fetch through one `reqwest::Client`. Transient failures
//! (connect/timeout errors, 429 and 5xx responses) are retried with linear
//! backoff up to the configured attempt count; anything else surfaces
//! immediately.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::warn;

use crate::config::HttpSettings;

/// Build the shared client used for every outbound request in a run.
pub fn build_client(settings: &HttpSettings) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.timeout_s))
        .user_agent(settings.user_agent.clone())
        .build()
        .context("building HTTP client")
}

fn retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// GET a JSON document, retrying transient failures.
///
/// `auth` is a complete `Authorization` header value (vendors disagree on
/// `Bearer` vs `Token` prefixes, so the adapter supplies the whole thing).
pub async fn get_json(
    client: &reqwest::Client,
    settings: &HttpSettings,
    url: &str,
    auth: Option<&str>,
) -> Result<Value> {
    get_checked(client, settings, url, auth)
        .await?
        .json::<Value>()
        .await
        .with_context(|| format!("decoding JSON from {}", url))
}

/// GET a page body as text, retrying transient failures. Used by adapters
/// that scrape pricing tables instead of calling a JSON API.
pub async fn get_text(
    client: &reqwest::Client,
    settings: &HttpSettings,
    url: &str,
    auth: Option<&str>,
) -> Result<String> {
    get_checked(client, settings, url, auth)
        .await?
        .text()
        .await
        .with_context(|| format!("reading body from {}", url))
}

async fn get_checked(
    client: &reqwest::Client,
    settings: &HttpSettings,
    url: &str,
    auth: Option<&str>,
) -> Result<reqwest::Response> {
    let mut last_err: Option<anyhow::Error> = None;

    for attempt in 0..=settings.max_retries {
        if attempt > 0 {
            let backoff = settings.backoff_s * attempt as f64;
            tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
        }

        let mut request = client.get(url);
        if let Some(value) = auth {
            request = request.header(reqwest::header::AUTHORIZATION, value);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if retryable_status(status) {
                    warn!("[HTTP] {} returned {}, attempt {}/{}", url, status, attempt + 1, settings.max_retries + 1);
                    last_err = Some(anyhow!("{} returned {}", url, status));
                    continue;
                }
                if !status.is_success() {
                    return Err(anyhow!("{} returned {}", url, status));
                }
                return Ok(response);
            }
            Err(e) => {
                warn!("[HTTP] {} failed: {} (attempt {}/{})", url, e, attempt + 1, settings.max_retries + 1);
                last_err = Some(anyhow::Error::new(e).context(format!("requesting {}", url)));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{}: no attempts made", url)))
}
