//! Vast.ai spot marketplace pricing adapter.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::ProviderConfig;
use crate::schema::RawOffer;

use super::{pick_str, pick_value, Provider, ProviderFetch, Transport};

const DEFAULT_ENDPOINT: &str = "https://api.vast.ai/v0/bundles/public";

pub struct VastAi;

#[async_trait]
impl Provider for VastAi {
    fn kind(&self) -> &'static str {
        "vast_ai"
    }

    async fn fetch(
        &self,
        transport: &Transport,
        cfg: &ProviderConfig,
        _now: DateTime<Utc>,
    ) -> Result<ProviderFetch> {
        let url = cfg.base_url.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        let payload = transport.get_json(url, None).await?;

        let items = payload
            .get("offers")
            .or_else(|| payload.get("data"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut offers = Vec::with_capacity(items.len());
        let mut skipped = 0usize;
        for item in &items {
            if !item.is_object() {
                skipped += 1;
                continue;
            }
            offers.push(RawOffer {
                gpu: pick_str(item, &["gpu_name", "gpu_type", "gpu"]),
                usd_per_hour: pick_value(item, &["dph_total", "price_per_gpu_hour", "total_hourly_cost"]),
                sku: pick_str(item, &["id", "instance_id"]),
                region: pick_str(item, &["region", "geolocation"]),
                source_url: Some(url.to_string()),
            });
        }

        let warning = (skipped > 0).then(|| format!("skipped {} non-object entries", skipped));
        Ok(ProviderFetch { offers, warning })
    }
}
