use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use fanwatch_core::{AuthorId, RateOrder, SECONDS_PER_DAY};
use fanwatch_store::{AuthorStore, StoreError, VisitLog};

/// Fan count above which an author is observed daily.
pub const POPULAR_FAN_THRESHOLD: i64 = 100_000;
/// Fan count above which an author is observed four times a day.
pub const HOT_FAN_THRESHOLD: i64 = 1_000_000;
/// Size of the visit and rate leaderboards.
pub const LEADERBOARD_SIZE: usize = 100;
/// Look-back window of the most-visited leaderboard.
pub const VISIT_WINDOW_DAYS: i64 = 1;

/// One observation tier: a candidate predicate and the interval it assigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// More than 100k fans.
    Popular,
    /// More than 1M fans.
    Hot,
    /// Flagged by an operator.
    Force,
    /// Top visited over the last day.
    MostVisited,
    /// Fastest growing.
    RateDesc,
    /// Fastest shrinking.
    RateAsc,
}

/// Application order of the tiers, loosest first.
///
/// Later tiers overwrite the interval written by earlier ones, so an author
/// matching several tiers ends up with the last one's interval.
pub const TIER_ORDER: [Tier; 6] = [
    Tier::Popular,
    Tier::Hot,
    Tier::Force,
    Tier::MostVisited,
    Tier::RateDesc,
    Tier::RateAsc,
];

impl Tier {
    pub fn name(self) -> &'static str {
        match self {
            Tier::Popular => "popular",
            Tier::Hot => "hot",
            Tier::Force => "force",
            Tier::MostVisited => "most_visited",
            Tier::RateDesc => "rate_desc",
            Tier::RateAsc => "rate_asc",
        }
    }

    /// Observation interval assigned to members of this tier.
    pub fn interval_seconds(self) -> i64 {
        match self {
            Tier::Popular => SECONDS_PER_DAY,
            Tier::Hot => SECONDS_PER_DAY / 4,
            Tier::Force => SECONDS_PER_DAY / 8,
            Tier::MostVisited | Tier::RateDesc | Tier::RateAsc => SECONDS_PER_DAY / 96,
        }
    }

    /// Authors belonging to this tier at `now`.
    pub async fn candidates(
        self,
        authors: &dyn AuthorStore,
        visits: &dyn VisitLog,
        now: DateTime<Utc>,
    ) -> Result<Vec<AuthorId>, StoreError> {
        match self {
            Tier::Popular => authors.ids_with_min_fans(POPULAR_FAN_THRESHOLD).await,
            Tier::Hot => authors.ids_with_min_fans(HOT_FAN_THRESHOLD).await,
            Tier::Force => authors.force_priority_ids().await,
            Tier::MostVisited => {
                let since = now - Duration::days(VISIT_WINDOW_DAYS);
                let ranked = visits.most_visited(since, LEADERBOARD_SIZE).await?;
                Ok(ranked.into_iter().map(|v| v.author_id).collect())
            }
            Tier::RateDesc => authors.top_by_rate(LEADERBOARD_SIZE, RateOrder::Descending).await,
            Tier::RateAsc => authors.top_by_rate(LEADERBOARD_SIZE, RateOrder::Ascending).await,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
