//! RunPod GPU cloud pricing adapter.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::ProviderConfig;
use crate::schema::RawOffer;

use super::{pick_str, pick_value, Provider, ProviderFetch, Transport};

const DEFAULT_ENDPOINT: &str = "https://api.runpod.io/pricing";

pub struct RunPod;

#[async_trait]
impl Provider for RunPod {
    fn kind(&self) -> &'static str {
        "runpod"
    }

    async fn fetch(
        &self,
        transport: &Transport,
        cfg: &ProviderConfig,
        _now: DateTime<Utc>,
    ) -> Result<ProviderFetch> {
        let url = cfg.base_url.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        let auth = cfg.token.as_ref().map(|t| format!("Bearer {}", t));
        let payload = transport.get_json(url, auth.as_deref()).await?;
        Ok(ProviderFetch::offers(extract_offers(&payload, url)))
    }
}

fn extract_offers(payload: &Value, url: &str) -> Vec<RawOffer> {
    // Payload shape varies: {"data": [..]}, {"pricings": [..]}, {"gpus": [..]}
    // or a bare array.
    let items = payload
        .get("data")
        .or_else(|| payload.get("pricings"))
        .or_else(|| payload.get("gpus"))
        .unwrap_or(payload)
        .as_array()
        .cloned()
        .unwrap_or_default();

    items
        .iter()
        .filter(|item| item.is_object())
        .map(|item| RawOffer {
            gpu: pick_str(item, &["gpu", "name"]),
            usd_per_hour: pick_value(item, &["usd_per_hour", "price_per_hour", "hourly"]),
            sku: pick_str(item, &["instance_type", "sku"]),
            region: pick_str(item, &["region"]),
            source_url: Some(url.to_string()),
        })
        .collect()
}
