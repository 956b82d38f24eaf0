//! # Sync Metrics
//!
//! Running totals over every drain the engine has attempted.

use crate::client::sync::SyncReport;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncMetrics {
    /// Drains that reached the queue
    pub total_runs: u64,
    /// Calls that returned without draining (offline or already syncing)
    pub skipped_runs: u64,
    pub items_synced: u64,
    pub items_failed: u64,
    pub last_run_duration: Option<Duration>,
    pub average_run_duration: Duration,
    last_run_start: Option<Instant>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_start(&mut self) {
        self.last_run_start = Some(Instant::now());
    }

    pub fn record_skip(&mut self) {
        self.skipped_runs += 1;
    }

    pub fn record_finish(&mut self, report: &SyncReport) {
        self.total_runs += 1;
        self.items_synced += report.synced as u64;
        self.items_failed += report.failed as u64;

        if let Some(start) = self.last_run_start.take() {
            let duration = start.elapsed();
            self.last_run_duration = Some(duration);

            // Rolling average over completed runs
            let runs = self.total_runs as u32;
            let total = self.average_run_duration * (runs - 1) + duration;
            self.average_run_duration = total / runs;
        }
    }

    /// Share of replayed items that succeeded, 1.0 when nothing was replayed
    pub fn success_rate(&self) -> f64 {
        let attempted = self.items_synced + self.items_failed;
        if attempted == 0 {
            1.0
        } else {
            self.items_synced as f64 / attempted as f64
        }
    }
}
