//! Replicate hardware pricing adapter.
//!
//! Replicate quotes per-minute prices for some hardware classes; those are
//! converted to hourly before normalization. Authentication uses the
//! `Token` header scheme. Falls back to a bundled snapshot payload when the
//! live fetch fails.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use crate::config::ProviderConfig;
use crate::schema::{parse_money, RawOffer};

use super::{pick_str, pick_value, Provider, ProviderFetch, Transport};

const DEFAULT_ENDPOINT: &str = "https://api.replicate.com/v1/pricing";

pub struct Replicate;

#[async_trait]
impl Provider for Replicate {
    fn kind(&self) -> &'static str {
        "replicate"
    }

    async fn fetch(
        &self,
        transport: &Transport,
        cfg: &ProviderConfig,
        _now: DateTime<Utc>,
    ) -> Result<ProviderFetch> {
        let url = cfg.base_url.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        let auth = cfg.token.as_ref().map(|t| format!("Token {}", t));

        let payload = match transport.get_json(url, auth.as_deref()).await {
            Ok(payload) => payload,
            Err(e) => match transport.load_bundled_snapshot(&cfg.id) {
                Some(payload) => {
                    warn!("[{}] live fetch failed ({}), using bundled snapshot", cfg.id, e);
                    payload
                }
                None => return Err(e),
            },
        };

        Ok(ProviderFetch::offers(extract_offers(&payload, url)))
    }
}

fn extract_offers(payload: &Value, url: &str) -> Vec<RawOffer> {
    let items = payload
        .get("prices")
        .or_else(|| payload.get("hardware"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    items
        .iter()
        .filter(|item| item.is_object())
        .map(|item| RawOffer {
            gpu: pick_str(item, &["gpu", "name"]),
            usd_per_hour: hourly_usd(item),
            sku: pick_str(item, &["hardware"]),
            region: pick_str(item, &["region"]),
            source_url: Some(url.to_string()),
        })
        .collect()
}

fn hourly_usd(item: &Value) -> Option<Value> {
    if let Some(hourly) = pick_value(item, &["usd_per_hour"]) {
        return Some(hourly);
    }
    let per_minute = pick_value(item, &["usd_per_minute", "price_per_minute"])?;
    match parse_money(&per_minute) {
        Some(v) => serde_json::Number::from_f64(v * 60.0).map(Value::Number),
        // Pass the raw value through so the normalizer counts the rejection
        None => Some(per_minute),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_per_minute_converts_to_hourly() {
        let payload = json!({
            "prices": [
                {"gpu": "A40", "usd_per_minute": 0.01, "hardware": "gpu-a40-large"}
            ]
        });
        let offers = extract_offers(&payload, "http://mock");
        let price = offers[0].usd_per_hour.as_ref().unwrap().as_f64().unwrap();
        assert!((price - 0.6).abs() < 1e-9);
        assert_eq!(offers[0].sku.as_deref(), Some("gpu-a40-large"));
    }

    #[test]
    fn test_hourly_price_wins_over_per_minute() {
        let item = json!({"gpu": "H100", "usd_per_hour": 3.0, "usd_per_minute": 0.01});
        assert_eq!(hourly_usd(&item), Some(json!(3.0)));
    }

    #[tokio::test]
    async fn test_fetch_failure_uses_bundled_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("replicate.json"),
            serde_json::to_vec(&json!({
                "prices": [{"gpu": "A40", "usd_per_minute": 0.01, "hardware": "gpu-a40-large"}]
            }))
            .unwrap(),
        )
        .unwrap();

        let http = crate::config::HttpSettings {
            max_retries: 0,
            backoff_s: 0.0,
            ..crate::config::HttpSettings::default()
        };
        let transport = Transport::new(reqwest::Client::new(), http, dir.path().to_path_buf());
        let cfg = ProviderConfig {
            id: "replicate".to_string(),
            kind: "replicate".to_string(),
            enabled: true,
            base_url: Some("http://127.0.0.1:9/".to_string()),
            token_env: None,
            token: None,
        };

        let fetch = Replicate.fetch(&transport, &cfg, Utc::now()).await.unwrap();
        assert_eq!(fetch.offers.len(), 1);
        let price = fetch.offers[0].usd_per_hour.as_ref().unwrap().as_f64().unwrap();
        assert!((price - 0.6).abs() < 1e-9);
    }
}
