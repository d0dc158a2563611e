//! In-memory backend implementing every store trait.
//!
//! Loadable from a JSON [`Dataset`] file; the schedule can be snapshotted back
//! to JSON so a dataset-driven run leaves the crawler something to read.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use fanwatch_core::{
    group_by_author, rank_tags, Author, AuthorId, CandidateScore, ContentItem, RateOrder,
    ScheduleEntry, ScheduleUpsert, TagQuery, TagWeight, VisitCount, VisitEvent,
};

use crate::error::StoreError;
use crate::traits::{AuthorStore, ContentCorpus, ScheduleStore, VisitLog};

/// Everything a [`MemoryStore`] holds, in file form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    #[serde(default)]
    pub authors: Vec<Author>,
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(default)]
    pub visits: Vec<VisitEvent>,
    #[serde(default)]
    pub schedule: Vec<ScheduleEntry>,
}

impl Dataset {
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// `RwLock`-guarded maps. Content is kept sorted by item id so capped scans
/// see items in a stable order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    authors: RwLock<HashMap<AuthorId, Author>>,
    content: RwLock<Vec<ContentItem>>,
    visits: RwLock<Vec<VisitEvent>>,
    schedule: RwLock<HashMap<AuthorId, ScheduleEntry>>,
}

fn read<'a, T>(lock: &'a RwLock<T>, what: &str) -> Result<RwLockReadGuard<'a, T>, StoreError> {
    lock.read()
        .map_err(|e| StoreError::LockPoisoned(format!("{} read lock: {}", what, e)))
}

fn write<'a, T>(lock: &'a RwLock<T>, what: &str) -> Result<RwLockWriteGuard<'a, T>, StoreError> {
    lock.write()
        .map_err(|e| StoreError::LockPoisoned(format!("{} write lock: {}", what, e)))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_dataset(dataset: Dataset) -> Self {
        let mut content = dataset.content;
        content.sort_by_key(|item| item.id);
        Self {
            authors: RwLock::new(dataset.authors.into_iter().map(|a| (a.id, a)).collect()),
            content: RwLock::new(content),
            visits: RwLock::new(dataset.visits),
            schedule: RwLock::new(dataset.schedule.into_iter().map(|e| (e.author_id, e)).collect()),
        }
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let dataset = Dataset::load(path)?;
        debug!(
            authors = dataset.authors.len(),
            items = dataset.content.len(),
            visits = dataset.visits.len(),
            path = %path.display(),
            "dataset loaded"
        );
        Ok(Self::from_dataset(dataset))
    }

    // ── Seeding ─────────────────────────────────────────────────

    pub fn insert_author(&self, author: Author) -> Result<(), StoreError> {
        write(&self.authors, "authors")?.insert(author.id, author);
        Ok(())
    }

    pub fn insert_content(&self, item: ContentItem) -> Result<(), StoreError> {
        let mut content = write(&self.content, "content")?;
        let pos = content.partition_point(|existing| existing.id < item.id);
        content.insert(pos, item);
        Ok(())
    }

    pub fn record_visit(&self, author_id: AuthorId, user: Option<String>, at: DateTime<Utc>) -> Result<(), StoreError> {
        write(&self.visits, "visits")?.push(VisitEvent { author_id, user, visited_at: at });
        Ok(())
    }

    // ── Schedule snapshots ──────────────────────────────────────

    /// All schedule entries, ordered by author id.
    pub fn schedule_snapshot(&self) -> Result<Vec<ScheduleEntry>, StoreError> {
        let mut entries: Vec<ScheduleEntry> = read(&self.schedule, "schedule")?.values().cloned().collect();
        entries.sort_by_key(|e| e.author_id);
        Ok(entries)
    }

    /// Write the schedule as pretty JSON, creating parent directories.
    pub fn save_schedule(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.schedule_snapshot()?)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Replace the schedule with the snapshot at `path`. A missing file is not an error.
    pub fn load_schedule(&self, path: &Path) -> Result<usize, StoreError> {
        if !path.exists() {
            return Ok(0);
        }
        let entries: Vec<ScheduleEntry> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        let count = entries.len();
        *write(&self.schedule, "schedule")? = entries.into_iter().map(|e| (e.author_id, e)).collect();
        Ok(count)
    }
}

#[async_trait]
impl AuthorStore for MemoryStore {
    async fn author(&self, id: AuthorId) -> Result<Option<Author>, StoreError> {
        Ok(read(&self.authors, "authors")?.get(&id).cloned())
    }

    async fn ids_with_min_fans(&self, threshold: i64) -> Result<Vec<AuthorId>, StoreError> {
        let authors = read(&self.authors, "authors")?;
        let mut ids: Vec<AuthorId> = authors
            .values()
            .filter(|a| a.fan_count > threshold)
            .map(|a| a.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn force_priority_ids(&self) -> Result<Vec<AuthorId>, StoreError> {
        let authors = read(&self.authors, "authors")?;
        let mut ids: Vec<AuthorId> = authors.values().filter(|a| a.force_priority).map(|a| a.id).collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn top_by_rate(&self, limit: usize, order: RateOrder) -> Result<Vec<AuthorId>, StoreError> {
        let authors = read(&self.authors, "authors")?;
        let mut ranked: Vec<&Author> = authors.values().collect();
        ranked.sort_by(|a, b| {
            let by_rate = match order {
                RateOrder::Descending => b.rate_of_change.total_cmp(&a.rate_of_change),
                RateOrder::Ascending => a.rate_of_change.total_cmp(&b.rate_of_change),
            };
            by_rate.then_with(|| a.id.cmp(&b.id))
        });
        Ok(ranked.into_iter().take(limit).map(|a| a.id).collect())
    }
}

#[async_trait]
impl VisitLog for MemoryStore {
    async fn most_visited(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<VisitCount>, StoreError> {
        let visits = read(&self.visits, "visits")?;
        let mut counts: HashMap<AuthorId, u64> = HashMap::new();
        for visit in visits.iter().filter(|v| v.visited_at > since) {
            *counts.entry(visit.author_id).or_default() += 1;
        }

        let mut ranked: Vec<VisitCount> = counts
            .into_iter()
            .map(|(author_id, visits)| VisitCount { author_id, visits })
            .collect();
        ranked.sort_by(|a, b| b.visits.cmp(&a.visits).then_with(|| a.author_id.cmp(&b.author_id)));
        ranked.truncate(limit);
        Ok(ranked)
    }
}

#[async_trait]
impl ContentCorpus for MemoryStore {
    async fn top_tags(&self, author_id: AuthorId, limit: usize) -> Result<Vec<TagWeight>, StoreError> {
        let content = read(&self.content, "content")?;
        Ok(rank_tags(content.iter().filter(|item| item.author_id == author_id), limit))
    }

    async fn author_profile(&self, author_id: AuthorId) -> Result<Option<CandidateScore>, StoreError> {
        let content = read(&self.content, "content")?;
        let authors = read(&self.authors, "authors")?;
        let own = content.iter().filter(|item| item.author_id == author_id);
        Ok(group_by_author(own, &authors, 1).pop())
    }

    async fn candidates_by_tags(&self, query: &TagQuery) -> Result<Vec<CandidateScore>, StoreError> {
        let content = read(&self.content, "content")?;
        let authors = read(&self.authors, "authors")?;
        let matched = content
            .iter()
            .filter(|item| {
                item.author_id != query.exclude_author
                    && item.published_at > query.since
                    && item.has_all_tags(&query.tags)
            })
            .take(query.item_cap);
        Ok(group_by_author(matched, &authors, query.limit))
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn upsert_conditional(&self, upsert: ScheduleUpsert) -> Result<ScheduleEntry, StoreError> {
        // The exists-check and the write happen under one write lock.
        let mut schedule = write(&self.schedule, "schedule")?;
        let entry = upsert.apply(schedule.get(&upsert.author_id));
        schedule.insert(upsert.author_id, entry.clone());
        Ok(entry)
    }

    async fn entry(&self, author_id: AuthorId) -> Result<Option<ScheduleEntry>, StoreError> {
        Ok(read(&self.schedule, "schedule")?.get(&author_id).cloned())
    }

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<ScheduleEntry>, StoreError> {
        let schedule = read(&self.schedule, "schedule")?;
        let mut due: Vec<ScheduleEntry> = schedule.values().filter(|e| e.is_due(now)).cloned().collect();
        due.sort_by(|a, b| a.next_due.cmp(&b.next_due).then_with(|| a.author_id.cmp(&b.author_id)));
        due.truncate(limit);
        Ok(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 14, 10, 0, 0).unwrap()
    }

    fn author(id: AuthorId, fans: i64, rate: f64) -> Author {
        Author { fan_count: fans, rate_of_change: rate, ..Author::new(id) }
    }

    fn item(id: i64, author_id: AuthorId, views: i64, tags: &[&str], published_at: DateTime<Utc>) -> ContentItem {
        ContentItem {
            id,
            author_id,
            title: String::new(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            views,
            published_at,
        }
    }

    #[tokio::test]
    async fn fan_threshold_is_strict() {
        let store = MemoryStore::new();
        store.insert_author(author(1, 100_000, 0.0)).unwrap();
        store.insert_author(author(2, 100_001, 0.0)).unwrap();
        assert_eq!(store.ids_with_min_fans(100_000).await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn rate_leaderboards_both_directions() {
        let store = MemoryStore::new();
        store.insert_author(author(1, 0, 5.0)).unwrap();
        store.insert_author(author(2, 0, -3.0)).unwrap();
        store.insert_author(author(3, 0, 1.0)).unwrap();
        assert_eq!(store.top_by_rate(2, RateOrder::Descending).await.unwrap(), vec![1, 3]);
        assert_eq!(store.top_by_rate(2, RateOrder::Ascending).await.unwrap(), vec![2, 3]);
    }

    #[tokio::test]
    async fn most_visited_counts_window_only() {
        let store = MemoryStore::new();
        store.record_visit(1, None, t0() - Duration::days(2)).unwrap();
        store.record_visit(2, None, t0()).unwrap();
        store.record_visit(2, Some("u".into()), t0()).unwrap();
        store.record_visit(3, None, t0()).unwrap();

        let ranked = store.most_visited(t0() - Duration::days(1), 10).await.unwrap();
        assert_eq!(
            ranked,
            vec![VisitCount { author_id: 2, visits: 2 }, VisitCount { author_id: 3, visits: 1 }]
        );
    }

    #[tokio::test]
    async fn candidate_scan_respects_item_cap_in_id_order() {
        let store = MemoryStore::new();
        // Inserted out of order; the scan must still see ids 1 and 2 first.
        store.insert_content(item(3, 30, 900, &["a"], t0())).unwrap();
        store.insert_content(item(1, 10, 100, &["a"], t0())).unwrap();
        store.insert_content(item(2, 20, 200, &["a"], t0())).unwrap();

        let query = TagQuery {
            tags: vec!["a".into()],
            exclude_author: 99,
            since: t0() - Duration::days(1),
            item_cap: 2,
            limit: 20,
        };
        let ids: Vec<AuthorId> = store
            .candidates_by_tags(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.author_id)
            .collect();
        assert_eq!(ids, vec![20, 10]);
    }

    #[tokio::test]
    async fn candidate_scan_filters_window_author_and_tags() {
        let store = MemoryStore::new();
        store.insert_content(item(1, 1, 100, &["a", "b"], t0())).unwrap();
        store.insert_content(item(2, 2, 100, &["a"], t0())).unwrap();
        store.insert_content(item(3, 3, 100, &["a", "b"], t0() - Duration::days(200))).unwrap();
        store.insert_content(item(4, 4, 100, &["b", "a", "c"], t0())).unwrap();

        let query = TagQuery {
            tags: vec!["a".into(), "b".into()],
            exclude_author: 1,
            since: t0() - Duration::days(90),
            item_cap: 5_000,
            limit: 20,
        };
        let found = store.candidates_by_tags(&query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].author_id, 4);
        assert_eq!(found[0].tags.len(), 3);
    }

    #[tokio::test]
    async fn upsert_seeds_then_preserves() {
        let store = MemoryStore::new();
        let first = store
            .upsert_conditional(ScheduleUpsert { author_id: 5, interval_seconds: 60, now: t0(), force_now: false })
            .await
            .unwrap();
        let second = store
            .upsert_conditional(ScheduleUpsert {
                author_id: 5,
                interval_seconds: 30,
                now: t0() + Duration::seconds(10),
                force_now: false,
            })
            .await
            .unwrap();
        assert_eq!(second.next_due, first.next_due);
        assert_eq!(store.entry(5).await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn due_orders_by_next_due() {
        let store = MemoryStore::new();
        for (id, interval) in [(1, 300), (2, 60), (3, 86_400)] {
            store
                .upsert_conditional(ScheduleUpsert { author_id: id, interval_seconds: interval, now: t0(), force_now: false })
                .await
                .unwrap();
        }
        let due = store.due(t0() + Duration::seconds(600), 10).await.unwrap();
        let ids: Vec<AuthorId> = due.iter().map(|e| e.author_id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn schedule_snapshot_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("schedule.json");

        let store = MemoryStore::new();
        store
            .upsert_conditional(ScheduleUpsert { author_id: 9, interval_seconds: 900, now: t0(), force_now: true })
            .await
            .unwrap();
        store.save_schedule(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"nextDue\""));

        let restored = MemoryStore::new();
        assert_eq!(restored.load_schedule(&path).unwrap(), 1);
        assert_eq!(restored.schedule_snapshot().unwrap(), store.schedule_snapshot().unwrap());
        assert_eq!(restored.load_schedule(&dir.path().join("missing.json")).unwrap(), 0);
    }
}
