//! Configuration loading for runtime settings and provider definitions.
//!
//! Settings and provider lists are read from YAML once per run and passed
//! through the pipeline by reference; nothing here is process-global.
//! Credentials are never stored in YAML, only referenced and resolved from
//! the environment.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

/// Environment variable prefix for per-provider token overrides,
/// e.g. `GPU_MARKET_REPLICATE_TOKEN`.
const ENV_PREFIX: &str = "GPU_MARKET";

// === Settings ===

/// HTTP transport settings shared by all adapters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Per-request timeout in seconds.
    pub timeout_s: u64,
    /// Retry attempts on transport errors and 429/5xx responses.
    pub max_retries: u32,
    /// Base backoff between retries in seconds (linear).
    pub backoff_s: f64,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        HttpSettings {
            timeout_s: 30,
            max_retries: 2,
            backoff_s: 2.0,
            user_agent: "gpu-market-watch/1.0".to_string(),
        }
    }
}

/// Run-level behavior flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Append a history line for each successful run.
    pub write_history: bool,
    /// Treat any single adapter failure as fatal for the whole run.
    pub fail_on_any_error: bool,
    /// Time budget per adapter in seconds; exceeding it counts as a failure.
    pub provider_budget_s: u64,
    /// Max adapters fetching concurrently.
    pub max_concurrency: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        RunSettings {
            write_history: true,
            fail_on_any_error: false,
            provider_budget_s: 60,
            max_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub http: HttpSettings,
    pub run: RunSettings,
}

/// Load settings from `config/settings.yaml`. A missing file yields defaults
/// so a fresh checkout runs without ceremony.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        info!("[CONFIG] {} not found, using default settings", path.display());
        return Ok(Settings::default());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading settings from {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

// === Providers ===

/// Declarative configuration for one provider adapter.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Stable provider identifier; becomes `provider_id` on every record.
    pub id: String,
    /// Adapter kind, resolved against the static registry.
    pub kind: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Endpoint override; each adapter has a built-in default.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Name of an environment variable holding the API token.
    #[serde(default)]
    pub token_env: Option<String>,
    /// Resolved token. Never set this in YAML; filled from the environment.
    #[serde(default)]
    pub token: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ProvidersFile {
    #[serde(default)]
    providers: Vec<ProviderConfig>,
}

/// Load the provider list from `config/providers.yaml` and resolve token
/// references from the environment.
///
/// Resolution order per provider: `GPU_MARKET_<ID>_TOKEN` beats the
/// configured `token_env`, which beats the well-known vendor variable.
pub fn load_providers(path: &Path) -> Result<Vec<ProviderConfig>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading providers from {}", path.display()))?;
    let file: ProvidersFile =
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    let mut providers = file.providers;
    for cfg in &mut providers {
        resolve_token(cfg);
    }
    Ok(providers)
}

fn resolve_token(cfg: &mut ProviderConfig) {
    let prefixed = format!("{}_{}_TOKEN", ENV_PREFIX, cfg.id.to_uppercase());
    if let Ok(value) = env::var(&prefixed) {
        cfg.token = Some(value);
        return;
    }
    if let Some(name) = &cfg.token_env {
        if let Ok(value) = env::var(name) {
            cfg.token = Some(value);
            return;
        }
    }
    if cfg.token.is_none() {
        if let Some(name) = known_token_env(&cfg.id) {
            if let Ok(value) = env::var(name) {
                cfg.token = Some(value);
            }
        }
    }
}

/// Well-known vendor credential variables, usable without any YAML wiring.
fn known_token_env(provider_id: &str) -> Option<&'static str> {
    match provider_id {
        "runpod" => Some("RUNPOD_API_KEY"),
        "replicate" => Some("REPLICATE_API_TOKEN"),
        "vast_ai" => Some("VAST_API_KEY"),
        "lambda" => Some("LAMBDA_API_KEY"),
        _ => None,
    }
}

// === Paths ===

/// Well-known file locations under the project root.
#[derive(Debug, Clone)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Paths { root: root.into() }
    }

    pub fn settings_yaml(&self) -> PathBuf {
        self.root.join("config").join("settings.yaml")
    }

    pub fn providers_yaml(&self) -> PathBuf {
        self.root.join("config").join("providers.yaml")
    }

    /// Bundled fallback payloads, used when a provider's live fetch fails.
    pub fn snapshots_dir(&self) -> PathBuf {
        self.root.join("config").join("snapshots")
    }

    /// Persisted snapshot document; doubles as "previous state" for the next run.
    pub fn snapshot_json(&self) -> PathBuf {
        self.root.join("data").join("gpu_prices.json")
    }

    pub fn csv_export(&self) -> PathBuf {
        self.root.join("data").join("gpu_prices.csv")
    }

    pub fn history_jsonl(&self) -> PathBuf {
        self.root.join("data").join("history.jsonl")
    }

    /// Dashboard feed consumed by the static rendering layer.
    pub fn dashboard_feed(&self) -> PathBuf {
        self.root.join("docs").join("data").join("gpu_prices.json")
    }

    pub fn report_md(&self) -> PathBuf {
        self.root.join("reports").join("README.md")
    }
}
