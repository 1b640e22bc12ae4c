use super::{EstimationRecord, Histogram};
use rayon::prelude::*;
use serde::Serialize;

/// Index-based percentiles over values sorted ascending.
///
/// P50/P90/P99 are read at `n*50/100`, `n*90/100` and `n*99/100` with integer
/// division; no interpolation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PercentileStats {
    pub total: usize,
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
    pub max: f64,
}

impl PercentileStats {
    pub fn from_sorted(values: &[f64]) -> Self {
        let n = values.len();
        if n == 0 {
            return Self::default();
        }
        Self {
            total: n,
            p50: values[n * 50 / 100],
            p90: values[n * 90 / 100],
            p99: values[n * 99 / 100],
            max: values[n - 1],
        }
    }

    /// Percentiles of records sorted ascending by p-error.
    pub fn from_records(records: &[EstimationRecord]) -> Self {
        let values: Vec<f64> = records.iter().map(|r| r.p_error).collect();
        Self::from_sorted(&values)
    }
}

/// The `k` records with the largest |p-error|, largest first.
pub fn worst_k(records: &[EstimationRecord], k: usize) -> Vec<EstimationRecord> {
    let mut sorted = records.to_vec();
    sorted.par_sort_by(|a, b| a.p_error.abs().total_cmp(&b.p_error.abs()));
    let start = sorted.len().saturating_sub(k);
    sorted.drain(start..).rev().collect()
}

/// Records with |p-error| >= `threshold`, largest first.
pub fn above_threshold(records: &[EstimationRecord], threshold: f64) -> Vec<EstimationRecord> {
    let mut sorted = records.to_vec();
    sorted.par_sort_by(|a, b| b.p_error.abs().total_cmp(&a.p_error.abs()));
    let keep = sorted
        .iter()
        .take_while(|r| r.p_error.abs() >= threshold)
        .count();
    sorted.truncate(keep);
    sorted
}

/// Everything the report shows for one group of records.
#[derive(Debug, Clone, Serialize)]
pub struct EstimationSummary {
    pub total: usize,
    pub exact: usize,
    /// Over-estimations, p-error ascending.
    pub over: PercentileStats,
    /// Under-estimations ordered by magnitude, values keep their sign.
    pub under: PercentileStats,
    pub histogram: Histogram,
}

impl EstimationSummary {
    pub fn build(records: &[EstimationRecord]) -> Self {
        let mut sorted = records.to_vec();
        sorted.par_sort_by(|a, b| a.p_error.total_cmp(&b.p_error));

        let over: Vec<f64> = sorted
            .iter()
            .map(|r| r.p_error)
            .filter(|&p| p > 0.0)
            .collect();
        // Ascending magnitude means walking the negatives from zero outwards.
        let under: Vec<f64> = sorted
            .iter()
            .rev()
            .map(|r| r.p_error)
            .filter(|&p| p < 0.0)
            .collect();
        let exact = sorted.iter().filter(|r| r.p_error == 0.0).count();

        Self {
            total: sorted.len(),
            exact,
            over: PercentileStats::from_sorted(&over),
            under: PercentileStats::from_sorted(&under),
            histogram: Histogram::from_sorted(&sorted),
        }
    }
}
