//! Store traits consumed by the scheduler and discovery engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use fanwatch_core::{
    Author, AuthorId, CandidateScore, RateOrder, ScheduleEntry, ScheduleUpsert, TagQuery,
    TagWeight, VisitCount,
};

use crate::error::StoreError;

/// Read access to author records.
#[async_trait]
pub trait AuthorStore: Send + Sync {
    /// Fetch one author, `None` if it was never registered.
    async fn author(&self, id: AuthorId) -> Result<Option<Author>, StoreError>;

    /// Ids of authors whose fan count is strictly greater than `threshold`.
    async fn ids_with_min_fans(&self, threshold: i64) -> Result<Vec<AuthorId>, StoreError>;

    /// Ids of authors an operator flagged for forced observation.
    async fn force_priority_ids(&self) -> Result<Vec<AuthorId>, StoreError>;

    /// Up to `limit` author ids ordered by rate of change.
    async fn top_by_rate(&self, limit: usize, order: RateOrder) -> Result<Vec<AuthorId>, StoreError>;
}

/// Read access to the append-only "author detail viewed" log.
#[async_trait]
pub trait VisitLog: Send + Sync {
    /// Visit counts for events strictly after `since`, most visited first
    /// (ties by author id), at most `limit` entries.
    async fn most_visited(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<VisitCount>, StoreError>;
}

/// Read access to per-author tagged content.
#[async_trait]
pub trait ContentCorpus: Send + Sync {
    /// The author's tags ranked by summed views, at most `limit`.
    async fn top_tags(&self, author_id: AuthorId, limit: usize) -> Result<Vec<TagWeight>, StoreError>;

    /// Aggregate over all of the author's content, `None` if it has none.
    async fn author_profile(&self, author_id: AuthorId) -> Result<Option<CandidateScore>, StoreError>;

    /// Authors whose recent content carries every tag of `query`.
    ///
    /// Scans at most `query.item_cap` matching items in ascending item id
    /// order, groups them by author and returns the top `query.limit` by
    /// mean views.
    async fn candidates_by_tags(&self, query: &TagQuery) -> Result<Vec<CandidateScore>, StoreError>;
}

/// Schedule persistence, written only by the frequency scheduler.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Apply `upsert` atomically for its author and return the stored entry.
    async fn upsert_conditional(&self, upsert: ScheduleUpsert) -> Result<ScheduleEntry, StoreError>;

    async fn entry(&self, author_id: AuthorId) -> Result<Option<ScheduleEntry>, StoreError>;

    /// Entries with `next_due <= now`, earliest first, at most `limit`.
    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<ScheduleEntry>, StoreError>;
}
