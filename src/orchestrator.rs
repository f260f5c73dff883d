//! Concurrent provider invocation with failure isolation.
//!
//! Every enabled adapter runs exactly once per pipeline run, under a bounded
//! time budget, with bounded parallelism. One adapter failing — transport
//! error, bad payload, timeout — never aborts the run or disturbs another
//! adapter's results. Output order is configuration order regardless of
//! completion order.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use tracing::{info, warn};

use crate::config::{ProviderConfig, RunSettings};
use crate::providers::{Provider, Transport};
use crate::schema::{normalize, PriceRecord};

/// A configured adapter ready to run.
pub struct ConfiguredProvider {
    pub cfg: ProviderConfig,
    pub adapter: Box<dyn Provider>,
}

/// Outcome of one adapter invocation, after normalization.
#[derive(Debug)]
pub struct ProviderRun {
    pub provider_id: String,
    /// Canonical records that survived validation.
    pub records: Vec<PriceRecord>,
    /// Raw offers dropped by the normalizer.
    pub rejected: usize,
    /// Partial-data note from the adapter (input it saw but could not use).
    /// Distinct from `failure`: the adapter still succeeded.
    pub warning: Option<String>,
    /// Failure note if the adapter errored or exceeded its time budget.
    /// Records salvaged before the failure are still in `records`.
    pub failure: Option<String>,
}

/// Invoke all providers concurrently and aggregate results in config order.
pub async fn collect_all(
    providers: &[ConfiguredProvider],
    transport: &Transport,
    run: &RunSettings,
    now: DateTime<Utc>,
) -> Vec<ProviderRun> {
    let budget = Duration::from_secs(run.provider_budget_s);
    let concurrency = run.max_concurrency.max(1);

    let mut outcomes: Vec<_> = stream::iter(providers.iter().enumerate())
        .map(|(idx, provider)| async move {
            let fetched =
                tokio::time::timeout(budget, provider.adapter.fetch(transport, &provider.cfg, now))
                    .await;
            (idx, fetched)
        })
        .buffer_unordered(concurrency)
        .collect::<Vec<_>>()
        .await;

    // Completion order must not leak into output
    outcomes.sort_by_key(|(idx, _)| *idx);

    outcomes
        .into_iter()
        .map(|(idx, outcome)| {
            let cfg = &providers[idx].cfg;
            match outcome {
                Ok(Ok(fetch)) => {
                    if let Some(note) = &fetch.warning {
                        warn!("[ORCHESTRATOR] {}: {}", cfg.id, note);
                    }
                    let mut records = Vec::with_capacity(fetch.offers.len());
                    let mut rejected = 0usize;
                    for offer in &fetch.offers {
                        match normalize(&cfg.id, offer, now) {
                            Ok(record) => records.push(record),
                            Err(reason) => {
                                rejected += 1;
                                warn!("[ORCHESTRATOR] {}: rejected offer ({})", cfg.id, reason);
                            }
                        }
                    }
                    info!(
                        "[ORCHESTRATOR] {}: {} offers ({} rejected)",
                        cfg.id,
                        records.len(),
                        rejected
                    );
                    ProviderRun {
                        provider_id: cfg.id.clone(),
                        records,
                        rejected,
                        warning: fetch.warning,
                        failure: None,
                    }
                }
                Ok(Err(e)) => {
                    warn!("[ORCHESTRATOR] {}: failed with {:#}", cfg.id, e);
                    ProviderRun {
                        provider_id: cfg.id.clone(),
                        records: Vec::new(),
                        rejected: 0,
                        warning: None,
                        failure: Some(format!("{:#}", e)),
                    }
                }
                Err(_) => {
                    warn!(
                        "[ORCHESTRATOR] {}: timed out after {}s",
                        cfg.id, run.provider_budget_s
                    );
                    ProviderRun {
                        provider_id: cfg.id.clone(),
                        records: Vec::new(),
                        rejected: 0,
                        warning: None,
                        failure: Some(format!("timed out after {}s", run.provider_budget_s)),
                    }
                }
            }
        })
        .collect()
}

/// Flatten per-provider runs into one record set for merging.
pub fn valid_records(runs: &[ProviderRun]) -> Vec<PriceRecord> {
    runs.iter().flat_map(|r| r.records.iter().cloned()).collect()
}
