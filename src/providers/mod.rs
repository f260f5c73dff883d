//! Provider adapter interface and static registry.
//!
//! To add a provider, implement [`Provider`] and register its kind in
//! [`build_adapter`]. Adapters are pluggable and independently failable:
//! they extract loosely structured [`RawOffer`]s from a vendor payload and
//! leave all validation to the normalizer. An adapter must never touch
//! shared pipeline state; its only side effects are outbound requests.

pub mod hf_endpoints;
pub mod lambda_labs;
pub mod modal;
pub mod replicate;
pub mod runpod;
pub mod vast_ai;

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use crate::config::{HttpSettings, ProviderConfig};
use crate::schema::RawOffer;

/// Shared transport handle passed to every adapter.
pub struct Transport {
    pub client: reqwest::Client,
    pub http: HttpSettings,
    /// Directory of bundled fallback payloads (`<provider id>.json`).
    snapshots_dir: PathBuf,
}

impl Transport {
    pub fn new(client: reqwest::Client, http: HttpSettings, snapshots_dir: PathBuf) -> Self {
        Transport { client, http, snapshots_dir }
    }

    /// GET a JSON document through the shared client with retry/backoff.
    pub async fn get_json(&self, url: &str, auth: Option<&str>) -> Result<Value> {
        crate::http::get_json(&self.client, &self.http, url, auth).await
    }

    /// GET a page body as text, for adapters that scrape instead of calling
    /// a JSON API.
    pub async fn get_text(&self, url: &str, auth: Option<&str>) -> Result<String> {
        crate::http::get_text(&self.client, &self.http, url, auth).await
    }

    /// Load a provider's bundled payload, if one ships with the repo.
    ///
    /// Used by adapters whose endpoints sit behind auth or flake often, so a
    /// bad day upstream degrades to slightly stale data instead of a hole.
    pub fn load_bundled_snapshot(&self, provider_id: &str) -> Option<Value> {
        let path = self.snapshots_dir.join(format!("{}.json", provider_id));
        let text = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&text) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("[{}] bundled snapshot {} is not valid JSON: {}", provider_id, path.display(), e);
                None
            }
        }
    }
}

/// Result of one adapter fetch: zero or more raw offers, plus a separate
/// warning for input the adapter saw but could not use. Partial data is
/// returned, never raised.
#[derive(Debug, Default)]
pub struct ProviderFetch {
    pub offers: Vec<RawOffer>,
    pub warning: Option<String>,
}

impl ProviderFetch {
    pub fn offers(offers: Vec<RawOffer>) -> Self {
        ProviderFetch { offers, warning: None }
    }
}

/// Contract every provider adapter satisfies.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Adapter kind string as registered in [`build_adapter`].
    fn kind(&self) -> &'static str;

    /// Produce raw offers for the current run, or fail with a transport or
    /// parse error. Failure here is isolated by the orchestrator.
    async fn fetch(
        &self,
        transport: &Transport,
        cfg: &ProviderConfig,
        now: DateTime<Utc>,
    ) -> Result<ProviderFetch>;
}

/// Construct the adapter for a configured kind. Configuration-driven
/// construction against a static registry; no runtime module lookup.
pub fn build_adapter(kind: &str) -> Option<Box<dyn Provider>> {
    match kind {
        "vast_ai" => Some(Box::new(vast_ai::VastAi)),
        "lambda_labs" => Some(Box::new(lambda_labs::LambdaLabs)),
        "runpod" => Some(Box::new(runpod::RunPod)),
        "replicate" => Some(Box::new(replicate::Replicate)),
        "modal" => Some(Box::new(modal::Modal)),
        "hf_endpoints" => Some(Box::new(hf_endpoints::HfEndpoints)),
        _ => None,
    }
}

/// First non-null string-like value among the given keys of a JSON object.
/// Numeric identifiers are stringified; vendors disagree on id types.
pub(crate) fn pick_str(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().filter_map(|k| item.get(*k)).find_map(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First non-null value among the given keys of a JSON object.
pub(crate) fn pick_value(item: &Value, keys: &[&str]) -> Option<Value> {
    keys.iter()
        .filter_map(|k| item.get(*k))
        .find(|v| !v.is_null())
        .cloned()
}
