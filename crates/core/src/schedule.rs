use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::author::AuthorId;

/// Seconds in one day, the base unit every tier interval is derived from.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Persisted polling state for one author.
///
/// The serialized field names (`authorId`, `lastUpdated`, `intervalSeconds`,
/// `nextDue`) are what the crawler reads; every backend keeps them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub author_id: AuthorId,
    pub last_updated: DateTime<Utc>,
    pub interval_seconds: i64,
    pub next_due: DateTime<Utc>,
}

impl ScheduleEntry {
    /// Whether the crawler should re-sample this author at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_due <= now
    }
}

/// A conditional schedule write.
///
/// `last_updated` and `interval_seconds` are always written. `next_due` is
/// written as `now` when `force_now` is set, seeded as `now + interval` when
/// the entry does not exist yet, and left alone otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleUpsert {
    pub author_id: AuthorId,
    pub interval_seconds: i64,
    pub now: DateTime<Utc>,
    pub force_now: bool,
}

impl ScheduleUpsert {
    /// `next_due` to use when the entry is created by this write.
    pub fn seed_next_due(&self) -> DateTime<Utc> {
        if self.force_now {
            self.now
        } else {
            self.now + Duration::seconds(self.interval_seconds)
        }
    }

    /// Apply this write to an existing entry (or create one).
    ///
    /// Backends without a native conditional upsert call this while holding
    /// their per-author write lock.
    pub fn apply(&self, existing: Option<&ScheduleEntry>) -> ScheduleEntry {
        let next_due = match existing {
            Some(entry) if !self.force_now => entry.next_due,
            _ => self.seed_next_due(),
        };
        ScheduleEntry {
            author_id: self.author_id,
            last_updated: self.now,
            interval_seconds: self.interval_seconds,
            next_due,
        }
    }
}
