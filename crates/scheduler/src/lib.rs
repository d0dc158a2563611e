//! Frequency scheduler: decides how often each author is observed.
//!
//! Authors are sorted into tiers (fan thresholds, operator flags, visit and
//! rate leaderboards) and each tier maps to a crawl interval. The result is
//! written as [`ScheduleEntry`](fanwatch_core::ScheduleEntry) records that
//! the external crawler polls.

pub mod error;
pub mod metrics;
pub mod report;
pub mod runner;
pub mod tier;

pub use error::SchedulerError;
pub use metrics::RecomputeMetrics;
pub use report::{RecomputeReport, TierOutcome};
pub use runner::FrequencyScheduler;
pub use tier::{Tier, TIER_ORDER};
