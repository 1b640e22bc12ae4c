use super::EstimationRecord;
use serde::Serialize;

pub const BUCKET_COUNT: usize = 19;

/// Powers of three bounding the p-error magnitude of each bucket.
const EDGES: [i64; 9] = [1, 3, 9, 27, 81, 243, 729, 2187, 6561];

/// Index of the bucket holding p-errors that truncate to zero.
const CENTER: usize = 9;

pub const BUCKET_LABELS: [&str; BUCKET_COUNT] = [
    "(-inf,-6561)",
    "[-6561,-2187)",
    "[-2187,-729)",
    "[-729,-243)",
    "[-243,-81)",
    "[-81,-27)",
    "[-27,-9)",
    "[-9,-3)",
    "[-3,-1)",
    "[-1,1]",
    "(1,3]",
    "(3,9]",
    "(9,27]",
    "(27,81]",
    "(81,243]",
    "(243,729]",
    "(729,2187]",
    "(2187,6561]",
    "(6561,+inf)",
];

/// Fixed 19-bucket distribution of p-errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Histogram {
    counts: [u64; BUCKET_COUNT],
}

impl Histogram {
    /// Bucket records already sorted by ascending p-error.
    pub fn from_sorted(records: &[EstimationRecord]) -> Self {
        debug_assert!(records
            .windows(2)
            .all(|pair| pair[0].p_error <= pair[1].p_error));

        let mut counts = [0u64; BUCKET_COUNT];
        let mut bucket = 0;
        for record in records {
            let truncated = record.p_error as i64;
            while bucket < BUCKET_COUNT - 1 && exceeds_upper_edge(bucket, truncated) {
                bucket += 1;
            }
            counts[bucket] += 1;
        }
        Self { counts }
    }

    /// Sort a copy of `records` by p-error and bucket it.
    pub fn build(records: &[EstimationRecord]) -> Self {
        let mut sorted = records.to_vec();
        sorted.sort_by(|a, b| a.p_error.total_cmp(&b.p_error));
        Self::from_sorted(&sorted)
    }

    pub fn counts(&self) -> &[u64; BUCKET_COUNT] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Bucket index a single p-error falls into.
    pub fn bucket_of(p_error: f64) -> usize {
        let truncated = p_error as i64;
        (0..BUCKET_COUNT - 1)
            .find(|&bucket| !exceeds_upper_edge(bucket, truncated))
            .unwrap_or(BUCKET_COUNT - 1)
    }

    /// `(label, count)` pairs in bucket order.
    pub fn labeled(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        BUCKET_LABELS.iter().copied().zip(self.counts.iter().copied())
    }
}

/// Whether a truncated p-error lies above bucket `bucket`.
fn exceeds_upper_edge(bucket: usize, truncated: i64) -> bool {
    match bucket {
        b if b < CENTER => truncated > -EDGES[CENTER - 1 - b],
        CENTER => truncated >= EDGES[0],
        b => truncated >= EDGES[b - CENTER],
    }
}
