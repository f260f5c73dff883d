//! Artifact publication with fingerprint-gated writes.
//!
//! The publisher is the sole writer of pipeline state. For each artifact it
//! serializes deterministically, fingerprints the bytes with SHA-256, and
//! compares against the file already on disk; identical fingerprints mean no
//! filesystem mutation at all. The history log is the one exception: it is
//! appended for every successful run, changed data or not.
//!
//! Byte-level idempotence depends on timestamps: when the incoming record
//! content matches the persisted snapshot (compared excluding `observed_at`),
//! the persisted snapshot is republished as-is, timestamps included, so every
//! artifact reproduces bit-for-bit.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::config::{Paths, RunSettings};
use crate::merge::{cheapest_per_gpu, deltas, provider_coverage};
use crate::report::generate_report;
use crate::schema::{sort_records, HistoryEntry, PriceRecord, Snapshot};

/// What a publish run did.
#[derive(Debug)]
pub struct PublishReport {
    /// True if any artifact's content changed on disk.
    pub changed: bool,
    pub offer_count: usize,
}

// === Fingerprinting ===

fn fingerprint(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

/// Stable fingerprint of a record set's price-relevant content.
///
/// Excludes `observed_at` and is order-independent, so two runs observing
/// identical market state hash identically regardless of fetch timing.
pub fn content_fingerprint(records: &[PriceRecord]) -> [u8; 32] {
    let mut sorted = records.to_vec();
    sort_records(&mut sorted);
    let mut hasher = Sha256::new();
    for record in &sorted {
        hasher.update(record.provider_id.as_bytes());
        hasher.update([0]);
        hasher.update(record.gpu.as_bytes());
        hasher.update([0]);
        hasher.update(format!("{:.4}", record.usd_per_hour).as_bytes());
        hasher.update([0]);
        hasher.update(record.region.as_deref().unwrap_or("").as_bytes());
        hasher.update([0]);
        hasher.update(record.sku.as_deref().unwrap_or("").as_bytes());
        hasher.update([0]);
        hasher.update(record.source_url.as_bytes());
        hasher.update([0xff]);
    }
    hasher.finalize().into()
}

// === Persisted state ===

/// Load the previous snapshot. Corrupt or unreadable state degrades to
/// cold-start semantics with a warning, never a fatal error.
pub fn load_previous_snapshot(path: &Path) -> Option<Snapshot> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("[PUBLISH] cannot read previous snapshot {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str::<Snapshot>(&text) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!(
                "[PUBLISH] previous snapshot {} is corrupt ({}), treating as first run",
                path.display(),
                e
            );
            None
        }
    }
}

/// Read history entries, skipping unparseable lines.
pub fn load_history(path: &Path) -> Vec<HistoryEntry> {
    let Ok(text) = fs::read_to_string(path) else {
        return Vec::new();
    };
    text.lines()
        .filter_map(|line| serde_json::from_str::<HistoryEntry>(line).ok())
        .collect()
}

fn append_history(path: &Path, entry: &HistoryEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let mut line = serde_json::to_string(entry).context("encoding history entry")?;
    line.push('\n');
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("appending to {}", path.display()))?;
    Ok(())
}

// === Gated writes ===

/// Write `bytes` to `path` only if the content fingerprint differs from what
/// is already there. Returns whether a write happened. Writes go through a
/// temp file and rename so a crash never leaves a half-written artifact.
pub fn write_if_changed(path: &Path, bytes: &[u8]) -> Result<bool> {
    if let Ok(existing) = fs::read(path) {
        if fingerprint(&existing) == fingerprint(bytes) {
            return Ok(false);
        }
    }
    let parent = path
        .parent()
        .with_context(|| format!("{} has no parent directory", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{} has no file name", path.display()))?;
    let tmp = parent.join(format!(".{}.tmp", file_name));
    fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} into place", tmp.display()))?;
    Ok(true)
}

// === Artifact rendering ===

fn render_json<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(value).context("encoding JSON artifact")?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// CSV field escaping: quote when the value contains a comma, quote, or
/// newline, doubling embedded quotes.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Flat export, one row per canonical record, fixed column order.
fn render_csv(records: &[PriceRecord]) -> String {
    let mut out = String::from("gpu,provider_id,usd_per_hour,region,sku,source_url,observed_at\n");
    for record in records {
        out.push_str(&format!(
            "{},{},{:.4},{},{},{},{}\n",
            csv_field(&record.gpu),
            csv_field(&record.provider_id),
            record.usd_per_hour,
            csv_field(record.region.as_deref().unwrap_or("")),
            csv_field(record.sku.as_deref().unwrap_or("")),
            csv_field(&record.source_url),
            record.observed_at.to_rfc3339(),
        ));
    }
    out
}

// === Publish ===

/// Publish the run's canonical records: decide what changed, write only
/// that, and append the history line.
///
/// Fails without touching the filesystem when `records` is empty — an
/// all-providers-down run must never overwrite good state.
pub fn publish(
    paths: &Paths,
    run: &RunSettings,
    records: Vec<PriceRecord>,
    now: DateTime<Utc>,
) -> Result<PublishReport> {
    if records.is_empty() {
        bail!("no valid records collected from any provider; refusing to publish");
    }

    let previous = load_previous_snapshot(&paths.snapshot_json());
    let current_fp = content_fingerprint(&records);
    let unchanged = previous
        .as_ref()
        .map(|p| content_fingerprint(&p.records) == current_fp)
        .unwrap_or(false);

    // Carry the persisted timestamps forward when content is unchanged so
    // every artifact reproduces byte-for-byte.
    let snapshot = if unchanged {
        previous.clone().unwrap_or_else(|| Snapshot::new(now, records))
    } else {
        Snapshot::new(now, records)
    };

    fn attempt(
        name: &str,
        path: &Path,
        rendered: Result<Vec<u8>>,
        changed: &mut bool,
        errors: &mut Vec<String>,
    ) {
        match rendered.and_then(|bytes| {
            let wrote = write_if_changed(path, &bytes)?;
            Ok((wrote, bytes.len()))
        }) {
            Ok((true, len)) => {
                info!("[PUBLISH] wrote {} ({} bytes)", path.display(), len);
                *changed = true;
            }
            Ok((false, _)) => {}
            Err(e) => errors.push(format!("{}: {:#}", name, e)),
        }
    }

    let mut changed = false;
    let mut errors: Vec<String> = Vec::new();

    attempt(
        "snapshot",
        &paths.snapshot_json(),
        render_json(&snapshot),
        &mut changed,
        &mut errors,
    );
    attempt(
        "dashboard feed",
        &paths.dashboard_feed(),
        render_json(&snapshot.records),
        &mut changed,
        &mut errors,
    );
    attempt(
        "csv",
        &paths.csv_export(),
        Ok(render_csv(&snapshot.records).into_bytes()),
        &mut changed,
        &mut errors,
    );

    // The summary is only regenerated for runs that produce changed data;
    // an unchanged run would otherwise rewrite it with an empty delta table.
    if !unchanged {
        let cheapest = cheapest_per_gpu(&snapshot.records);
        let previous_cheapest = previous
            .as_ref()
            .map(|p| cheapest_per_gpu(&p.records))
            .unwrap_or_default();
        let delta_rows = deltas(&cheapest, &previous_cheapest);
        let coverage = provider_coverage(&snapshot.records);

        let mut history = load_history(&paths.history_jsonl());
        // The current run only shows up in the report if it will actually
        // land in the history log
        if run.write_history {
            history.push(HistoryEntry {
                run_timestamp: now,
                offer_count: snapshot.offer_count,
            });
        }
        let report = generate_report(&snapshot, &cheapest, &delta_rows, &coverage, &history);
        attempt(
            "report",
            &paths.report_md(),
            Ok(report.into_bytes()),
            &mut changed,
            &mut errors,
        );
    }

    if !errors.is_empty() {
        bail!("publish failed for {} artifact(s): {}", errors.len(), errors.join("; "));
    }

    if run.write_history {
        append_history(
            &paths.history_jsonl(),
            &HistoryEntry {
                run_timestamp: now,
                offer_count: snapshot.offer_count,
            },
        )?;
    }

    if unchanged {
        info!("[PUBLISH] content unchanged, artifacts left untouched");
    }

    Ok(PublishReport {
        changed,
        offer_count: snapshot.offer_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    use crate::schema::{normalize, RawOffer};

    fn record(gpu: &str, provider: &str, usd: f64, at: DateTime<Utc>) -> PriceRecord {
        let raw = RawOffer {
            gpu: Some(gpu.to_string()),
            usd_per_hour: Some(json!(usd)),
            ..RawOffer::default()
        };
        normalize(provider, &raw, at).unwrap()
    }

    #[test]
    fn test_write_if_changed_skips_identical_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.json");
        assert!(write_if_changed(&path, b"hello").unwrap());
        assert!(!write_if_changed(&path, b"hello").unwrap());
        assert!(write_if_changed(&path, b"world").unwrap());
        assert_eq!(fs::read(&path).unwrap(), b"world");
    }

    #[test]
    fn test_content_fingerprint_ignores_observed_at_and_order() {
        let t1 = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap();
        let a = vec![record("A40", "vast", 0.95, t1), record("H100", "lambda", 2.5, t1)];
        let b = vec![record("H100", "lambda", 2.5, t2), record("A40", "vast", 0.95, t2)];
        assert_eq!(content_fingerprint(&a), content_fingerprint(&b));

        let c = vec![record("A40", "vast", 0.96, t1), record("H100", "lambda", 2.5, t1)];
        assert_ne!(content_fingerprint(&a), content_fingerprint(&c));
    }

    #[test]
    fn test_second_identical_run_only_appends_history() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());
        let run = RunSettings::default();

        let t1 = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let first = publish(&paths, &run, vec![record("A40", "vast", 0.95, t1)], t1).unwrap();
        assert!(first.changed);

        let before = fs::read(paths.snapshot_json()).unwrap();
        let report_before = fs::read(paths.report_md()).unwrap();

        // Same upstream data observed a day later
        let t2 = Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap();
        let second = publish(&paths, &run, vec![record("A40", "vast", 0.95, t2)], t2).unwrap();
        assert!(!second.changed);

        assert_eq!(fs::read(paths.snapshot_json()).unwrap(), before);
        assert_eq!(fs::read(paths.report_md()).unwrap(), report_before);
        assert_eq!(load_history(&paths.history_jsonl()).len(), 2);
    }

    #[test]
    fn test_zero_records_is_fatal_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());
        let now = Utc::now();

        let result = publish(&paths, &RunSettings::default(), vec![], now);
        assert!(result.is_err());
        assert!(!paths.snapshot_json().exists());
        assert!(!paths.history_jsonl().exists());
    }

    #[test]
    fn test_corrupt_previous_snapshot_cold_starts() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());
        fs::create_dir_all(paths.snapshot_json().parent().unwrap()).unwrap();
        fs::write(paths.snapshot_json(), b"{ not json").unwrap();

        let now = Utc::now();
        let report = publish(&paths, &RunSettings::default(), vec![record("A40", "vast", 0.95, now)], now).unwrap();
        assert!(report.changed);
        assert!(load_previous_snapshot(&paths.snapshot_json()).is_some());
    }

    #[test]
    fn test_price_change_produces_delta_row() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());
        let run = RunSettings::default();

        let t1 = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        publish(&paths, &run, vec![record("A100", "vast", 3.0, t1)], t1).unwrap();

        let t2 = Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap();
        publish(
            &paths,
            &run,
            vec![record("A100", "vast", 3.2, t2), record("B200", "vast", 9.0, t2)],
            t2,
        )
        .unwrap();

        let report = fs::read_to_string(paths.report_md()).unwrap();
        assert!(report.contains("| A100 | 3.2000 | 3.0000 | 0.2000 |"));
        // New GPU has no previous endpoint, so no delta row
        assert!(!report.contains("| B200 | 9.0000 | "));
    }

    #[test]
    fn test_csv_fixed_columns_and_escaping() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let mut rec = record("A40", "vast", 0.95, now);
        rec.region = Some("Warsaw, PL".to_string());
        let csv = render_csv(&[rec]);
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "gpu,provider_id,usd_per_hour,region,sku,source_url,observed_at"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("A40,vast,0.9500,\"Warsaw, PL\","));
    }

    #[test]
    fn test_history_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());
        let run = RunSettings {
            write_history: false,
            ..RunSettings::default()
        };
        let now = Utc::now();
        publish(&paths, &run, vec![record("A40", "vast", 0.95, now)], now).unwrap();
        assert!(!paths.history_jsonl().exists());

        // The report must not show a run that never landed in the log
        let report = fs::read_to_string(paths.report_md()).unwrap();
        assert!(!report.contains("Recent Runs"));
    }

    #[test]
    fn test_artifact_write_failure_still_attempts_remaining() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());
        // A plain file where the feed's directory belongs makes that one
        // write fail while the others can proceed
        fs::write(dir.path().join("docs"), b"").unwrap();

        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let result = publish(
            &paths,
            &RunSettings::default(),
            vec![record("A40", "vast", 0.95, now)],
            now,
        );

        assert!(result.is_err());
        assert!(!paths.dashboard_feed().exists());
        // Artifacts ordered after the failing one were still written
        assert!(paths.snapshot_json().exists());
        assert!(paths.csv_export().exists());
        assert!(paths.report_md().exists());
        // A failed run leaves no history line
        assert!(!paths.history_jsonl().exists());
    }
}
