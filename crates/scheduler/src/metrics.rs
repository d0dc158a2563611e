use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::report::RecomputeReport;

/// Recompute counters, cumulative over the scheduler's lifetime.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecomputeMetrics {
    /// Completed recompute cycles.
    pub cycles: u64,
    /// Cycles that ended in `StoresUnreachable`.
    pub failed_cycles: u64,
    /// Successful upserts by tier name.
    pub upserts_by_tier: HashMap<String, u64>,
    /// Failed upserts by tier name.
    pub failures_by_tier: HashMap<String, u64>,
    /// Skipped candidate queries by tier name.
    pub skipped_by_tier: HashMap<String, u64>,
    /// Rolling mean duration of completed cycles.
    pub avg_cycle_duration: Duration,
    /// Cycle time of the last completed recompute.
    pub last_cycle: Option<DateTime<Utc>>,
}

impl RecomputeMetrics {
    /// Record a completed cycle.
    pub fn record_cycle(&mut self, report: &RecomputeReport, duration: Duration) {
        self.cycles += 1;
        self.last_cycle = Some(report.cycle_time);
        for outcome in &report.tiers {
            let name = outcome.tier.name().to_string();
            if outcome.skipped.is_some() {
                *self.skipped_by_tier.entry(name).or_default() += 1;
                continue;
            }
            *self.upserts_by_tier.entry(name.clone()).or_default() += outcome.upserted as u64;
            *self.failures_by_tier.entry(name).or_default() += outcome.failed as u64;
        }

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        self.avg_cycle_duration = if self.cycles == 1 {
            duration
        } else {
            let prev = self.avg_cycle_duration.as_nanos() as f64;
            let cur = duration.as_nanos() as f64;
            Duration::from_nanos((prev + (cur - prev) / self.cycles as f64) as u64)
        };
    }

    pub fn record_failure(&mut self) {
        self.failed_cycles += 1;
    }
}
