//! Modal Labs pricing adapter.
//!
//! Modal publishes no pricing API; this adapter scrapes the first table on
//! the public pricing page. Header names map columns to fields, so column
//! reordering upstream is harmless; a page without a table yields zero
//! offers and a warning rather than an error.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::ProviderConfig;
use crate::schema::RawOffer;

use super::{Provider, ProviderFetch, Transport};

const DEFAULT_ENDPOINT: &str = "https://modal.com/pricing";

pub struct Modal;

#[async_trait]
impl Provider for Modal {
    fn kind(&self) -> &'static str {
        "modal"
    }

    async fn fetch(
        &self,
        transport: &Transport,
        cfg: &ProviderConfig,
        _now: DateTime<Utc>,
    ) -> Result<ProviderFetch> {
        let url = cfg.base_url.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        let html = transport.get_text(url, None).await?;
        let (offers, warning) = extract_offers(&html, url);
        Ok(ProviderFetch { offers, warning })
    }
}

fn extract_offers(html: &str, url: &str) -> (Vec<RawOffer>, Option<String>) {
    let Some(table) = blocks(html, "table").into_iter().next() else {
        return (Vec::new(), Some("pricing table not found".to_string()));
    };

    let headers: Vec<String> = blocks(&table, "th")
        .iter()
        .map(|h| cell_text(h).to_lowercase())
        .collect();

    let mut offers = Vec::new();
    for row in blocks(&table, "tr") {
        let cells: Vec<String> = blocks(&row, "td").iter().map(|c| cell_text(c)).collect();
        // Header rows carry <th> cells and fall out here
        if cells.is_empty() || cells.len() != headers.len() {
            continue;
        }
        let column = |names: &[&str]| -> Option<String> {
            names
                .iter()
                .find_map(|name| headers.iter().position(|h| h == name))
                .map(|i| cells[i].clone())
                .filter(|v| !v.is_empty())
        };
        offers.push(RawOffer {
            gpu: column(&["gpu", "hardware"]),
            usd_per_hour: column(&["price", "$/hr", "usd/hr"]).map(Value::String),
            sku: column(&["plan", "sku"]),
            region: column(&["region"]),
            source_url: Some(url.to_string()),
        });
    }
    (offers, None)
}

// === Minimal HTML scanning ===

/// Inner content of every `<tag ...>...</tag>` block, in document order.
/// Tag matching is case-insensitive and requires a tag-name boundary, so
/// `th` never matches `thead`.
fn blocks(html: &str, tag: &str) -> Vec<String> {
    let lower: String = html.chars().map(|c| c.to_ascii_lowercase()).collect();
    let open = format!("<{}", tag);
    let close = format!("</{}", tag);

    let mut out = Vec::new();
    let mut from = 0;
    while let Some(found) = lower.get(from..).and_then(|rest| rest.find(&open)) {
        let start = from + found;
        let boundary = lower.as_bytes().get(start + open.len()).copied();
        if !matches!(boundary, Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'/')) {
            from = start + open.len();
            continue;
        }
        let Some(inner_start) = html[start..].find('>').map(|i| start + i + 1) else {
            break;
        };
        let Some(inner_end) = lower.get(inner_start..).and_then(|rest| rest.find(&close)) else {
            break;
        };
        let inner_end = inner_start + inner_end;
        out.push(html[inner_start..inner_end].to_string());
        from = inner_end + close.len();
    }
    out
}

/// Visible text of one cell: tags stripped, whitespace collapsed.
fn cell_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for ch in s.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
