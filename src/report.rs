//! Human-readable markdown summary of one run.
//!
//! Regenerated in full on every run that produces changed data. Currency is
//! always printed with four decimal places so the report diffs cleanly.

use crate::merge::DeltaRow;
use crate::schema::{HistoryEntry, PriceRecord, Snapshot};

/// Delta rows shown in the movers table.
const MAX_MOVERS: usize = 10;

/// History lines shown in the recent-runs section.
const MAX_RECENT_RUNS: usize = 5;

pub fn generate_report(
    snapshot: &Snapshot,
    cheapest: &[PriceRecord],
    delta_rows: &[DeltaRow],
    coverage: &[(String, usize)],
    recent_runs: &[HistoryEntry],
) -> String {
    let mut out = String::new();

    out.push_str("# GPU Market Daily Report\n\n");
    out.push_str(&format!(
        "Generated at: `{}`\n\n",
        snapshot.generated_at.to_rfc3339()
    ));
    out.push_str(&format!("Total providers: **{}**\n", snapshot.provider_count));
    out.push_str(&format!("Total offers: **{}**\n", snapshot.offer_count));

    if !cheapest.is_empty() {
        out.push_str("\n## Cheapest per GPU\n\n");
        out.push_str("| gpu | usd_per_hour | provider_id | region | sku |\n");
        out.push_str("|---|---|---|---|---|\n");
        for record in cheapest {
            out.push_str(&format!(
                "| {} | {:.4} | {} | {} | {} |\n",
                record.gpu,
                record.usd_per_hour,
                record.provider_id,
                record.region.as_deref().unwrap_or(""),
                record.sku.as_deref().unwrap_or(""),
            ));
        }
    }

    if !delta_rows.is_empty() {
        out.push_str("\n## Top Movers vs Previous\n\n");
        out.push_str("| gpu | usd_per_hour | prev_usd_per_hour | delta |\n");
        out.push_str("|---|---|---|---|\n");
        for row in delta_rows.iter().take(MAX_MOVERS) {
            out.push_str(&format!(
                "| {} | {:.4} | {:.4} | {:.4} |\n",
                row.gpu, row.usd_per_hour, row.prev_usd_per_hour, row.delta
            ));
        }
    }

    if !coverage.is_empty() {
        out.push_str("\n## Provider Coverage\n\n");
        out.push_str("| provider_id | offers |\n");
        out.push_str("|---|---|\n");
        for (provider_id, offers) in coverage {
            out.push_str(&format!("| {} | {} |\n", provider_id, offers));
        }
    }

    if !recent_runs.is_empty() {
        out.push_str("\n## Recent Runs\n\n");
        let start = recent_runs.len().saturating_sub(MAX_RECENT_RUNS);
        for entry in &recent_runs[start..] {
            out.push_str(&format!(
                "- `{}` - {} offers\n",
                entry.run_timestamp.to_rfc3339(),
                entry.offer_count
            ));
        }
    }

    out
}
