//! Hugging Face Inference Endpoints adapter.
//!
//! There is no public pricing feed today; this adapter reports zero offers
//! so the provider stays wired into configuration for the day one appears.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::ProviderConfig;

use super::{Provider, ProviderFetch, Transport};

pub struct HfEndpoints;

#[async_trait]
impl Provider for HfEndpoints {
    fn kind(&self) -> &'static str {
        "hf_endpoints"
    }

    async fn fetch(
        &self,
        _transport: &Transport,
        cfg: &ProviderConfig,
        _now: DateTime<Utc>,
    ) -> Result<ProviderFetch> {
        info!("[{}] skipped (no public pricing feed)", cfg.id);
        Ok(ProviderFetch::default())
    }
}
