//! Derived views over canonical record sets.
//!
//! Everything here is a pure function of its inputs: the cheapest-per-GPU
//! view, the per-GPU delta against the previous run, and provider coverage.
//! Tie-breaks are lexicographic so output is identical for any permutation
//! of the input.

use std::collections::BTreeMap;

use crate::schema::PriceRecord;

/// Cheapest current offer for each distinct GPU name.
///
/// Exact price ties resolve by `provider_id` ascending, then `sku` ascending
/// (`None` sorts first). Output is sorted by GPU name.
pub fn cheapest_per_gpu(records: &[PriceRecord]) -> Vec<PriceRecord> {
    let mut best: BTreeMap<&str, &PriceRecord> = BTreeMap::new();
    for record in records {
        match best.get(record.gpu.as_str()) {
            Some(current) if !beats(record, current) => {}
            _ => {
                best.insert(record.gpu.as_str(), record);
            }
        }
    }
    best.into_values().cloned().collect()
}

/// Does `candidate` win over `incumbent` for the cheapest slot?
fn beats(candidate: &PriceRecord, incumbent: &PriceRecord) -> bool {
    match candidate.usd_per_hour.total_cmp(&incumbent.usd_per_hour) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Greater => false,
        std::cmp::Ordering::Equal => {
            (&candidate.provider_id, &candidate.sku) < (&incumbent.provider_id, &incumbent.sku)
        }
    }
}

/// Per-GPU price movement between two cheapest views.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaRow {
    pub gpu: String,
    pub usd_per_hour: f64,
    pub prev_usd_per_hour: f64,
    /// `current - previous`; negative means the GPU got cheaper.
    pub delta: f64,
}

/// Deltas for GPUs present in *both* cheapest views. A GPU appearing on only
/// one side is omitted; absence is not a delta to zero.
///
/// Sorted by delta ascending (biggest price drops first), then GPU name.
pub fn deltas(current_cheapest: &[PriceRecord], previous_cheapest: &[PriceRecord]) -> Vec<DeltaRow> {
    let previous: BTreeMap<&str, f64> = previous_cheapest
        .iter()
        .map(|r| (r.gpu.as_str(), r.usd_per_hour))
        .collect();

    let mut rows: Vec<DeltaRow> = current_cheapest
        .iter()
        .filter_map(|record| {
            let prev = *previous.get(record.gpu.as_str())?;
            Some(DeltaRow {
                gpu: record.gpu.clone(),
                usd_per_hour: record.usd_per_hour,
                prev_usd_per_hour: prev,
                delta: record.usd_per_hour - prev,
            })
        })
        .collect();

    rows.sort_by(|a, b| a.delta.total_cmp(&b.delta).then_with(|| a.gpu.cmp(&b.gpu)));
    rows
}

/// Offer count per provider in the current run, sorted by provider id.
pub fn provider_coverage(records: &[PriceRecord]) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in records {
        *counts.entry(record.provider_id.as_str()).or_insert(0) += 1;
    }
    counts.into_iter().map(|(id, n)| (id.to_string(), n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rec(gpu: &str, provider: &str, usd: f64) -> PriceRecord {
        PriceRecord {
            gpu: gpu.to_string(),
            provider_id: provider.to_string(),
            usd_per_hour: usd,
            region: None,
            sku: None,
            source_url: String::new(),
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_cheapest_picks_minimum_price() {
        let records = vec![
            rec("A100", "vast", 1.5),
            rec("A100", "lambda", 1.1),
            rec("H100", "vast", 2.5),
        ];
        let cheapest = cheapest_per_gpu(&records);
        assert_eq!(cheapest.len(), 2);
        assert_eq!(cheapest[0].gpu, "A100");
        assert_eq!(cheapest[0].provider_id, "lambda");
        assert_eq!(cheapest[1].gpu, "H100");
    }

    #[test]
    fn test_exact_tie_resolves_alphabetically_by_provider() {
        // "lambda" < "vast" lexicographically, so lambda wins the tie
        let records = vec![rec("A40", "vast", 0.95), rec("A40", "lambda", 0.95)];
        let cheapest = cheapest_per_gpu(&records);
        assert_eq!(cheapest[0].provider_id, "lambda");

        // Same result with input order flipped
        let flipped = vec![rec("A40", "lambda", 0.95), rec("A40", "vast", 0.95)];
        assert_eq!(cheapest_per_gpu(&flipped)[0].provider_id, "lambda");
    }

    #[test]
    fn test_tie_on_provider_falls_back_to_sku() {
        let mut a = rec("A40", "vast", 0.95);
        a.sku = Some("zz-9".to_string());
        let mut b = rec("A40", "vast", 0.95);
        b.sku = Some("aa-1".to_string());
        let cheapest = cheapest_per_gpu(&[a, b]);
        assert_eq!(cheapest[0].sku.as_deref(), Some("aa-1"));
    }

    #[test]
    fn test_determinism_under_permutation() {
        let records = vec![
            rec("A100", "vast", 3.0),
            rec("A100", "runpod", 2.0),
            rec("RTX 4090", "vast", 0.7),
            rec("RTX 4090", "runpod", 0.7),
            rec("H100", "lambda", 2.49),
        ];
        let baseline = cheapest_per_gpu(&records);
        let baseline_cov = provider_coverage(&records);

        let mut reversed = records.clone();
        reversed.reverse();
        assert_eq!(cheapest_per_gpu(&reversed), baseline);
        assert_eq!(provider_coverage(&reversed), baseline_cov);

        let mut rotated = records.clone();
        rotated.rotate_left(2);
        assert_eq!(cheapest_per_gpu(&rotated), baseline);
    }

    #[test]
    fn test_delta_requires_both_endpoints() {
        let previous = vec![rec("A100", "vast", 3.0), rec("RTX 3090", "vast", 0.4)];
        let current = vec![rec("A100", "vast", 3.2), rec("H100", "lambda", 2.5)];
        let rows = deltas(&cheapest_per_gpu(&current), &cheapest_per_gpu(&previous));

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].gpu, "A100");
        assert!((rows[0].delta - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_deltas_sorted_by_movement() {
        let previous = vec![rec("A", "p", 1.0), rec("B", "p", 1.0), rec("C", "p", 1.0)];
        let current = vec![rec("A", "p", 1.5), rec("B", "p", 0.5), rec("C", "p", 1.0)];
        let rows = deltas(&current, &previous);
        assert_eq!(rows[0].gpu, "B"); // biggest drop first
        assert_eq!(rows[2].gpu, "A");
    }

    #[test]
    fn test_coverage_counts_all_offers() {
        let records = vec![
            rec("A100", "vast", 1.0),
            rec("H100", "vast", 2.0),
            rec("A100", "lambda", 1.2),
        ];
        assert_eq!(
            provider_coverage(&records),
            vec![("lambda".to_string(), 1), ("vast".to_string(), 2)]
        );
    }
}
