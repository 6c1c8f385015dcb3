use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::plan::PlanSignature;

/// Row-cache outcome reported by the executor for a primary-key read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOutcome {
    Hit,
    Miss,
    /// The key was looked up and does not exist in the table.
    Absent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub hits: u64,
    pub misses: u64,
    pub absent: u64,
}

impl Counters {
    fn record(&mut self, outcome: CacheOutcome) {
        match outcome {
            CacheOutcome::Hit => self.hits += 1,
            CacheOutcome::Miss => self.misses += 1,
            CacheOutcome::Absent => self.absent += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub tables: BTreeMap<String, Counters>,
    /// Keyed by the rendered plan signature.
    pub plans: BTreeMap<String, Counters>,
}

/// Cache counters shared by every rewriter handle; clone the `Arc`, not the recorder.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    inner: Mutex<StatsSnapshot>,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: CacheOutcome, tables: &[String], signature: &PlanSignature) {
        let mut inner = self.lock();
        for table in tables {
            inner.tables.entry(table.clone()).or_default().record(outcome);
        }
        inner
            .plans
            .entry(signature.to_string())
            .or_default()
            .record(outcome);
    }

    pub fn table_counters(&self, table: &str) -> Counters {
        self.lock().tables.get(table).copied().unwrap_or_default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.lock().clone()
    }

    pub fn reset(&self) {
        *self.lock() = StatsSnapshot::default();
    }

    fn lock(&self) -> MutexGuard<'_, StatsSnapshot> {
        // Counters stay consistent even if a holder panicked mid-update.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
