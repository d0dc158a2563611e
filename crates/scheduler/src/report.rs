use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::tier::Tier;

/// What one tier contributed to a recompute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierOutcome {
    pub tier: Tier,
    /// Candidates returned by the tier's query.
    pub candidates: usize,
    /// Successful upserts.
    pub upserted: usize,
    /// Upserts that failed and were skipped.
    pub failed: usize,
    /// Set when the candidate query itself failed and the tier was skipped.
    pub skipped: Option<String>,
}

impl TierOutcome {
    pub fn new(tier: Tier, candidates: usize) -> Self {
        Self { tier, candidates, upserted: 0, failed: 0, skipped: None }
    }

    pub fn skipped(tier: Tier, reason: String) -> Self {
        Self { skipped: Some(reason), ..Self::new(tier, 0) }
    }
}

/// Result of one `recompute_schedule` cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecomputeReport {
    /// The single timestamp every upsert of the cycle used.
    pub cycle_time: DateTime<Utc>,
    /// One outcome per tier, in application order.
    pub tiers: Vec<TierOutcome>,
}

impl RecomputeReport {
    pub fn new(cycle_time: DateTime<Utc>) -> Self {
        Self { cycle_time, tiers: Vec::new() }
    }

    pub fn upserted(&self) -> usize {
        self.tiers.iter().map(|t| t.upserted).sum()
    }

    pub fn failed(&self) -> usize {
        self.tiers.iter().map(|t| t.failed).sum()
    }

    pub fn skipped_tiers(&self) -> usize {
        self.tiers.iter().filter(|t| t.skipped.is_some()).count()
    }

    pub fn all_tiers_skipped(&self) -> bool {
        !self.tiers.is_empty() && self.skipped_tiers() == self.tiers.len()
    }
}
