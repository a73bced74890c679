use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Bucket, ProcessingOutcome};
use crate::error::ErrorKind;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketCounts {
    pub excellent: u64,
    pub good: u64,
    pub moderate: u64,
    pub low: u64,
    pub none: u64,
    pub error: u64,
}

impl BucketCounts {
    pub fn get(&self, b: Bucket) -> u64 {
        match b {
            Bucket::Excellent => self.excellent,
            Bucket::Good => self.good,
            Bucket::Moderate => self.moderate,
            Bucket::Low => self.low,
            Bucket::None => self.none,
            Bucket::Error => self.error,
        }
    }

    fn slot(&mut self, b: Bucket) -> &mut u64 {
        match b {
            Bucket::Excellent => &mut self.excellent,
            Bucket::Good => &mut self.good,
            Bucket::Moderate => &mut self.moderate,
            Bucket::Low => &mut self.low,
            Bucket::None => &mut self.none,
            Bucket::Error => &mut self.error,
        }
    }
}

/// Running totals; persisted verbatim in the checkpoint and the log summary.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Counters {
    pub attempted: u64,
    pub buckets: BucketCounts,
    pub errors: BTreeMap<ErrorKind, u64>,
    pub original_bytes: u64,
    pub final_bytes: u64,
    pub bytes_saved: u64,
}

impl Counters {
    /// Outcomes whose output replaced the original.
    pub fn reduced(&self) -> u64 {
        self.buckets.excellent + self.buckets.good + self.buckets.moderate + self.buckets.low
    }

    pub fn error_count(&self, kind: ErrorKind) -> u64 {
        self.errors.get(&kind).copied().unwrap_or(0)
    }
}

/// Read-only view handed to the log and the final report.
pub type StatsSnapshot = Counters;

#[derive(Clone, Debug, Default)]
pub struct StatsAggregator {
    totals: Counters,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from totals persisted alongside a checkpoint.
    pub fn seeded(totals: Counters) -> Self {
        Self { totals }
    }

    pub fn fold<'a, I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = &'a ProcessingOutcome>,
    {
        let mut agg = Self::new();
        for o in outcomes {
            agg.apply(o);
        }
        agg
    }

    pub fn apply(&mut self, o: &ProcessingOutcome) {
        let t = &mut self.totals;
        t.attempted += 1;
        *t.buckets.slot(o.bucket) += 1;
        if let Some(kind) = o.error_kind {
            *t.errors.entry(kind).or_insert(0) += 1;
        }
        t.original_bytes += o.original_size;
        t.final_bytes += o.final_size();
        t.bytes_saved += o.bytes_saved();
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.totals.clone()
    }

    pub fn totals(&self) -> &Counters {
        &self.totals
    }
}
