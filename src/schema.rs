//! Canonical data model and validation for GPU price offers.
//!
//! This module provides the foundational types for the pipeline: the loosely
//! structured offers adapters emit, the validated canonical price record, the
//! persisted snapshot document, and the pure normalization function that
//! converts one into the other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// === Raw adapter output ===

/// One loosely structured offer as extracted by a provider adapter.
///
/// Every field is optional; validation happens in [`normalize`], not in the
/// adapters. Price is kept as raw JSON so string-typed vendor payloads
/// ("$1.50", "1,200") survive until the normalizer decides their fate.
#[derive(Debug, Clone, Default)]
pub struct RawOffer {
    pub gpu: Option<String>,
    pub usd_per_hour: Option<Value>,
    pub region: Option<String>,
    pub sku: Option<String>,
    pub source_url: Option<String>,
}

// === Canonical record ===

/// Canonical GPU price record: one validated offer from one provider.
///
/// The field set is a public contract consumed by the dashboard feed; do not
/// rename or retype fields without versioning the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    /// Display name of the GPU model. Vendor free-text after light alias
    /// cleanup; "A40" and "NVIDIA A40" remain distinct keys.
    pub gpu: String,
    /// Stable identifier of the source provider.
    pub provider_id: String,
    /// Hourly price in USD. Non-negative and finite.
    pub usd_per_hour: f64,
    /// Optional location string, passed through verbatim.
    pub region: Option<String>,
    /// Optional provider-specific catalog identifier.
    pub sku: Option<String>,
    /// Endpoint the offer was fetched from.
    #[serde(default)]
    pub source_url: String,
    /// Timestamp of the fetch run that observed this offer.
    pub observed_at: DateTime<Utc>,
}

/// Full output of one pipeline run plus run metadata. Immutable once built;
/// the publisher alone decides whether it supersedes the persisted one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    pub offer_count: usize,
    pub provider_count: usize,
    pub records: Vec<PriceRecord>,
}

impl Snapshot {
    /// Build a snapshot from a run's canonical records, sorting them into
    /// the deterministic published order.
    pub fn new(generated_at: DateTime<Utc>, mut records: Vec<PriceRecord>) -> Self {
        sort_records(&mut records);
        let mut providers: Vec<&str> = records.iter().map(|r| r.provider_id.as_str()).collect();
        providers.sort_unstable();
        providers.dedup();
        Snapshot {
            generated_at,
            offer_count: records.len(),
            provider_count: providers.len(),
            records,
        }
    }
}

/// One append-only history line: proof the pipeline ran, not that data changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub run_timestamp: DateTime<Utc>,
    pub offer_count: usize,
}

/// Sort records into the canonical published order. Input permutation must
/// never leak into artifacts.
pub fn sort_records(records: &mut [PriceRecord]) {
    records.sort_by(|a, b| {
        (&a.provider_id, &a.gpu, &a.region, &a.sku)
            .cmp(&(&b.provider_id, &b.gpu, &b.region, &b.sku))
            .then(a.usd_per_hour.total_cmp(&b.usd_per_hour))
    });
}

// === Validation ===

/// Why a raw offer was rejected by the normalizer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectReason {
    #[error("missing or empty gpu name")]
    MissingGpu,
    #[error("missing or empty provider id")]
    MissingProvider,
    #[error("missing usd_per_hour")]
    MissingPrice,
    #[error("unparseable usd_per_hour: {0}")]
    UnparseablePrice(String),
    #[error("non-finite usd_per_hour")]
    NonFinitePrice,
    #[error("negative usd_per_hour: {0}")]
    NegativePrice(f64),
}

/// Convert one raw offer into a canonical record or reject it.
///
/// Pure: the same input always yields the same output, independent of which
/// order the orchestrator delivered it in.
pub fn normalize(
    provider_id: &str,
    raw: &RawOffer,
    observed_at: DateTime<Utc>,
) -> Result<PriceRecord, RejectReason> {
    let provider_id = provider_id.trim();
    if provider_id.is_empty() {
        return Err(RejectReason::MissingProvider);
    }

    let gpu = raw.gpu.as_deref().unwrap_or("").trim();
    if gpu.is_empty() {
        return Err(RejectReason::MissingGpu);
    }

    let price_value = raw.usd_per_hour.as_ref().ok_or(RejectReason::MissingPrice)?;
    let usd_per_hour = parse_money(price_value)
        .ok_or_else(|| RejectReason::UnparseablePrice(price_value.to_string()))?;
    if !usd_per_hour.is_finite() {
        return Err(RejectReason::NonFinitePrice);
    }
    if usd_per_hour < 0.0 {
        return Err(RejectReason::NegativePrice(usd_per_hour));
    }

    Ok(PriceRecord {
        gpu: canonical_gpu_name(gpu),
        provider_id: provider_id.to_string(),
        usd_per_hour,
        region: trimmed_opt(raw.region.as_deref()),
        sku: trimmed_opt(raw.sku.as_deref()),
        source_url: raw.source_url.as_deref().unwrap_or("").trim().to_string(),
        observed_at,
    })
}

fn trimmed_opt(value: Option<&str>) -> Option<String> {
    match value.map(str::trim) {
        Some("") | None => None,
        Some(v) => Some(v.to_string()),
    }
}

/// Parse a money-ish JSON value: plain numbers, or strings with an optional
/// dollar sign and thousands separators.
pub fn parse_money(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned = s.trim().replace('$', "").replace(',', "");
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    }
}

/// Collapse well-known vendor spellings of a GPU model onto one display name.
///
/// This is a fixed alias table, not cross-vendor unification: names outside
/// the table pass through trimmed but otherwise untouched.
pub fn canonical_gpu_name(name: &str) -> String {
    let key: String = name
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| *c != ' ' && *c != '/')
        .collect();
    match key.as_str() {
        "a100_80g" | "a100-80g" => "A100 80GB".to_string(),
        "a100" => "A100".to_string(),
        "rtx_3090" | "rtx3090" => "RTX 3090".to_string(),
        "rtx_4090" | "rtx4090" => "RTX 4090".to_string(),
        "h100" => "H100".to_string(),
        "l40s" => "L40S".to_string(),
        _ => name.trim().to_string(),
    }
}
