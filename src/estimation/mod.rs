//! Estimation records and the metrics derived from them.

pub mod histogram;
pub mod stats;

pub use histogram::{Histogram, BUCKET_COUNT, BUCKET_LABELS};
pub use stats::{above_threshold, worst_k, EstimationSummary, PercentileStats};

use crate::error::{Error, Result};
use crate::statement::Statement;
use crate::task::QueryResult;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::hash::{Hash, Hasher};

/// One (estimated, actual) observation for a filter expression.
///
/// Identity is `(expr, kind, estimated, actual)`; `p_error` is derived from the
/// two counts and ignored by equality and hashing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimationRecord {
    #[serde(rename = "Expr")]
    pub expr: String,
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "Est")]
    pub estimated: u64,
    #[serde(rename = "Actual")]
    pub actual: u64,
    #[serde(rename = "pError", default)]
    pub p_error: f64,
}

impl EstimationRecord {
    pub fn new(expr: impl Into<String>, kind: impl Into<String>, estimated: u64, actual: u64) -> Self {
        Self {
            expr: expr.into(),
            kind: kind.into(),
            estimated,
            actual,
            p_error: p_error(estimated, actual),
        }
    }

    /// Build a record from the result of a derived count statement.
    pub fn from_result(result: &QueryResult) -> Result<Self> {
        let Statement::ActualCount(trace) = &result.statement else {
            return Err(Error::MalformedCount(format!(
                "not a count statement: {}",
                result.statement
            )));
        };

        let raw = result.scalar().ok_or_else(|| {
            Error::MalformedCount(format!("no rows returned for {}", result.statement))
        })?;
        let actual = raw.trim().parse::<u64>().map_err(|err| {
            Error::MalformedCount(format!("{raw:?} returned for {}: {err}", result.statement))
        })?;

        Ok(Self::new(trace.expr.clone(), trace.kind.clone(), trace.row_count, actual))
    }

    /// Recompute `p_error` from the counts.
    pub fn refresh_p_error(&mut self) {
        self.p_error = p_error(self.estimated, self.actual);
    }

    pub fn q_error(&self) -> f64 {
        q_error(self.estimated, self.actual)
    }
}

impl PartialEq for EstimationRecord {
    fn eq(&self, other: &Self) -> bool {
        self.expr == other.expr
            && self.kind == other.kind
            && self.estimated == other.estimated
            && self.actual == other.actual
    }
}

impl Eq for EstimationRecord {}

impl Hash for EstimationRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.expr.hash(state);
        self.kind.hash(state);
        self.estimated.hash(state);
        self.actual.hash(state);
    }
}

/// Signed relative deviation of `estimated` from `actual`.
///
/// Positive for over-estimation, negative for under-estimation. When the
/// smaller count is zero both counts are incremented by one.
pub fn p_error(estimated: u64, actual: u64) -> f64 {
    if estimated == actual {
        return 0.0;
    }
    let sign = if estimated > actual { 1.0 } else { -1.0 };
    let (mut larger, mut smaller) = (estimated.max(actual) as f64, estimated.min(actual) as f64);
    if smaller == 0.0 {
        larger += 1.0;
        smaller += 1.0;
    }
    sign * (larger / smaller - 1.0)
}

/// Unsigned worst-case ratio between the two counts, same zero smoothing.
pub fn q_error(estimated: u64, actual: u64) -> f64 {
    if estimated == actual {
        return 1.0;
    }
    let (mut larger, mut smaller) = (estimated.max(actual) as f64, estimated.min(actual) as f64);
    if smaller == 0.0 {
        larger += 1.0;
        smaller += 1.0;
    }
    larger / smaller
}

/// Convert terminal results into records.
pub fn collect<I>(results: I) -> Result<Vec<EstimationRecord>>
where
    I: IntoIterator<Item = QueryResult>,
{
    results
        .into_iter()
        .map(|result| EstimationRecord::from_result(&result))
        .collect()
}

/// One representative per identity. Order of the survivors is unspecified.
pub fn dedup(records: Vec<EstimationRecord>) -> Vec<EstimationRecord> {
    records
        .into_iter()
        .collect::<HashSet<_>>()
        .into_iter()
        .collect()
}

/// Records grouped by estimator kind.
pub fn group_by_kind(records: &[EstimationRecord]) -> BTreeMap<String, Vec<EstimationRecord>> {
    let mut groups: BTreeMap<String, Vec<EstimationRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.kind.clone()).or_default().push(record.clone());
    }
    groups
}

/// Append-only record store shared by concurrently running pipelines.
#[derive(Debug, Default)]
pub struct EstimationStore {
    records: Mutex<Vec<EstimationRecord>>,
}

impl EstimationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: EstimationRecord) {
        self.records.lock().push(record);
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Take every record collected so far, deduplicated when `dedup_enabled`.
    pub fn drain(&self, dedup_enabled: bool) -> Vec<EstimationRecord> {
        let records = std::mem::take(&mut *self.records.lock());
        if dedup_enabled {
            dedup(records)
        } else {
            records
        }
    }
}
