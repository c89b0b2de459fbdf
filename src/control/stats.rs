// Dispatch statistics with serialization traits
// src/control/stats.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::control::types::BatchReport;

/// Cumulative dispatch statistics for monitoring
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DispatchStats {
    pub batches_dispatched: usize,
    pub batches_failed: usize,
    pub items_processed: usize,
    pub total_time_ms: u64,
    pub items_per_worker: BTreeMap<String, usize>,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, report: &BatchReport) {
        self.batches_dispatched += 1;
        self.items_processed += report.results.len();
        self.total_time_ms += report.elapsed_ms;
        for (worker, count) in &report.per_worker {
            *self.items_per_worker.entry(worker.clone()).or_insert(0) += count;
        }
    }

    pub fn record_failure(&mut self) {
        self.batches_dispatched += 1;
        self.batches_failed += 1;
    }

    pub fn success_rate(&self) -> f64 {
        if self.batches_dispatched == 0 {
            return 0.0;
        }

        let successful = self.batches_dispatched.saturating_sub(self.batches_failed);
        (successful as f64) / (self.batches_dispatched as f64)
    }

    pub fn average_batch_time_ms(&self) -> u64 {
        let successful = self.batches_dispatched.saturating_sub(self.batches_failed);
        if successful == 0 {
            return 0;
        }

        self.total_time_ms / (successful as u64)
    }
}
