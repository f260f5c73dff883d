//! GPU Market Watch entry point.
//!
//! One invocation is one complete pipeline run: load configuration, fetch
//! from all enabled providers, normalize and merge, publish changed
//! artifacts, append history, exit. Scheduling lives outside this binary.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use gpu_market_watch::config::{load_providers, load_settings, Paths};
use gpu_market_watch::http::build_client;
use gpu_market_watch::orchestrator::{collect_all, valid_records, ConfiguredProvider};
use gpu_market_watch::providers::{build_adapter, Transport};
use gpu_market_watch::publish::publish;

#[tokio::main]
async fn main() -> Result<()> {
    // Logging to both stdout and a file alongside the data
    let file_appender = tracing_appender::rolling::never(".", "gpu_market_watch.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("gpu_market_watch=info".parse()?);

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    dotenvy::dotenv().ok();

    let root = std::env::var("GPU_MARKET_ROOT").unwrap_or_else(|_| ".".to_string());
    let paths = Paths::new(&root);

    let settings = load_settings(&paths.settings_yaml())?;
    let provider_configs = load_providers(&paths.providers_yaml())
        .context("loading provider configuration")?;

    let now = Utc::now();
    info!("GPU Market Watch run starting at {}", now.to_rfc3339());
    info!(
        "   {} providers configured, {} enabled",
        provider_configs.len(),
        provider_configs.iter().filter(|p| p.enabled).count()
    );

    let mut providers = Vec::new();
    for cfg in provider_configs.into_iter().filter(|p| p.enabled) {
        match build_adapter(&cfg.kind) {
            Some(adapter) => providers.push(ConfiguredProvider { cfg, adapter }),
            None => {
                warn!("[CONFIG] {}: unknown adapter kind '{}', skipping", cfg.id, cfg.kind);
            }
        }
    }
    if providers.is_empty() {
        bail!("no usable providers configured");
    }

    let client = build_client(&settings.http)?;
    let transport = Transport::new(client, settings.http.clone(), paths.snapshots_dir());

    let runs = collect_all(&providers, &transport, &settings.run, now).await;

    let failures: Vec<&str> = runs
        .iter()
        .filter(|r| r.failure.is_some())
        .map(|r| r.provider_id.as_str())
        .collect();
    if !failures.is_empty() {
        warn!("[ORCHESTRATOR] {} provider(s) failed: {}", failures.len(), failures.join(", "));
        if settings.run.fail_on_any_error {
            bail!("provider(s) failed and fail_on_any_error is set: {}", failures.join(", "));
        }
    }

    let records = valid_records(&runs);
    let report = publish(&paths, &settings.run, records, now)?;

    info!(
        "Run complete: {} offers, changed: {}",
        report.offer_count, report.changed
    );
    println!(
        "{}",
        serde_json::json!({ "changed": report.changed, "records": report.offer_count })
    );

    Ok(())
}
