//! Lambda Labs on-demand instance pricing adapter.
//!
//! The public instance-types endpoint reports `price_cents_per_hour`; this
//! adapter converts to USD before handing offers to the normalizer. When the
//! live fetch fails, a bundled snapshot payload is used if present.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use crate::config::ProviderConfig;
use crate::schema::{parse_money, RawOffer};

use super::{pick_str, pick_value, Provider, ProviderFetch, Transport};

const DEFAULT_ENDPOINT: &str = "https://cloud.lambdalabs.com/api/v1/instance-types";

pub struct LambdaLabs;

#[async_trait]
impl Provider for LambdaLabs {
    fn kind(&self) -> &'static str {
        "lambda_labs"
    }

    async fn fetch(
        &self,
        transport: &Transport,
        cfg: &ProviderConfig,
        _now: DateTime<Utc>,
    ) -> Result<ProviderFetch> {
        let url = cfg.base_url.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        let auth = cfg.token.as_ref().map(|t| format!("Bearer {}", t));

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
    let container = payload
        .get("data")
        .or_else(|| payload.get("instance_types"))
        .unwrap_or(payload);

    // The API keys instance types by name; snapshots may use a plain array.
    let items: Vec<Value> = match container {
        Value::Object(map) => map.values().cloned().collect(),
        Value::Array(arr) => arr.clone(),
        _ => Vec::new(),
    };

    items
        .iter()
        .map(|item| RawOffer {
            gpu: pick_str(item, &["gpu_type", "name"]),
            usd_per_hour: hourly_usd(item),
            sku: pick_str(item, &["instance_type_name", "slug"]),
            region: pick_str(item, &["region"]),
            source_url: Some(url.to_string()),
        })
        .collect()
}

fn hourly_usd(item: &Value) -> Option<Value> {
    if let Some(cents) = item.get("price_cents_per_hour").filter(|v| !v.is_null()) {
        if let Some(cents) = parse_money(cents) {
            return serde_json::Number::from_f64(cents / 100.0).map(Value::Number);
        }
        // Unparseable cents value passes through so the rejection is counted
        return Some(cents.clone());
    }
    pick_value(item, &["usd_per_hour", "price_per_hour"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cents_convert_to_usd() {
        let payload = json!({
            "data": {
                "gpu_1x_a100": {
                    "gpu_type": "A100",
                    "price_cents_per_hour": 110,
                    "instance_type_name": "gpu_1x_a100",
                    "region": "us-east-1"
                }
            }
        });
        let offers = extract_offers(&payload, "http://mock");
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].gpu.as_deref(), Some("A100"));
        assert_eq!(offers[0].usd_per_hour, Some(json!(1.1)));
    }

    #[test]
    fn test_array_payload_with_direct_usd() {
        let payload = json!({
            "instance_types": [
                {"name": "H100", "usd_per_hour": 2.49, "slug": "gpu_1x_h100"}
            ]
        });
        let offers = extract_offers(&payload, "http://mock");
        assert_eq!(offers[0].usd_per_hour, Some(json!(2.49)));
        assert_eq!(offers[0].sku.as_deref(), Some("gpu_1x_h100"));
    }

    mod snapshot_fallback {
        use super::*;
        use crate::config::HttpSettings;
        use std::fs;

        fn cfg(id: &str, base_url: &str) -> ProviderConfig {
            ProviderConfig {
                id: id.to_string(),
                kind: "lambda_labs".to_string(),
                enabled: true,
                base_url: Some(base_url.to_string()),
                token_env: None,
                token: None,
            }
        }

        fn transport(snapshots_dir: std::path::PathBuf) -> Transport {
            // No retries so a dead endpoint fails immediately
            let http = HttpSettings {
                max_retries: 0,
                backoff_s: 0.0,
                ..HttpSettings::default()
            };
            Transport::new(reqwest::Client::new(), http, snapshots_dir)
        }

        #[tokio::test]
        async fn test_fetch_failure_uses_bundled_snapshot() {
            let dir = tempfile::tempdir().unwrap();
            fs::write(
                dir.path().join("lambda.json"),
                serde_json::to_vec(&json!({
                    "data": {
                        "gpu_1x_h100": {"gpu_type": "H100", "price_cents_per_hour": 249}
                    }
                }))
                .unwrap(),
            )
            .unwrap();

            let transport = transport(dir.path().to_path_buf());
            // Port 9 is unbound; the connect fails without touching the network
            let fetch = LambdaLabs
                .fetch(&transport, &cfg("lambda", "http://127.0.0.1:9/"), Utc::now())
                .await
                .unwrap();

            assert_eq!(fetch.offers.len(), 1);
            assert_eq!(fetch.offers[0].gpu.as_deref(), Some("H100"));
            assert_eq!(fetch.offers[0].usd_per_hour, Some(json!(2.49)));
        }

        #[tokio::test]
        async fn test_fetch_failure_without_snapshot_is_an_error() {
            let dir = tempfile::tempdir().unwrap();
            let transport = transport(dir.path().to_path_buf());
            let result = LambdaLabs
                .fetch(&transport, &cfg("lambda", "http://127.0.0.1:9/"), Utc::now())
                .await;
            assert!(result.is_err());
        }
    }
}
