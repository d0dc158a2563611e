//! Related-author discovery.
//!
//! Finds authors whose recent content shares the host's heaviest tags,
//! widening the tag filter until enough candidates have been collected.

pub mod engine;

pub use engine::{DiscoveryEngine, DiscoveryError};
