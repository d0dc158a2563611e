use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::{Mutex, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use fanwatch_core::config::SchedulerConfig;
use fanwatch_core::{AuthorId, Clock, ScheduleEntry, ScheduleUpsert, SystemClock, VisitCount, SECONDS_PER_DAY};
use fanwatch_store::{AuthorStore, ScheduleStore, VisitLog};

use crate::error::SchedulerError;
use crate::metrics::RecomputeMetrics;
use crate::report::{RecomputeReport, TierOutcome};
use crate::tier::{TIER_ORDER, VISIT_WINDOW_DAYS};

/// Maintains the per-author observation schedule the crawler reads.
///
/// The only writer of [`ScheduleEntry`] records. Whole-schedule recomputes are
/// serialized; single upserts rely on the store's atomic conditional upsert.
pub struct FrequencyScheduler {
    config: SchedulerConfig,
    authors: Arc<dyn AuthorStore>,
    visits: Arc<dyn VisitLog>,
    schedule: Arc<dyn ScheduleStore>,
    clock: Arc<dyn Clock>,
    recompute_lock: Mutex<()>,
    metrics: Arc<RwLock<RecomputeMetrics>>,
}

impl FrequencyScheduler {
    pub fn new(
        config: SchedulerConfig,
        authors: Arc<dyn AuthorStore>,
        visits: Arc<dyn VisitLog>,
        schedule: Arc<dyn ScheduleStore>,
    ) -> Self {
        Self {
            config,
            authors,
            visits,
            schedule,
            clock: Arc::new(SystemClock),
            recompute_lock: Mutex::new(()),
            metrics: Arc::new(RwLock::new(RecomputeMetrics::default())),
        }
    }

    /// Build over one backend implementing every store trait.
    pub fn with_store<S>(config: SchedulerConfig, store: Arc<S>) -> Self
    where
        S: AuthorStore + VisitLog + ScheduleStore + 'static,
    {
        Self::new(config, store.clone(), store.clone(), store)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Snapshot of the recompute metrics.
    pub fn metrics(&self) -> Result<RecomputeMetrics, SchedulerError> {
        self.metrics
            .read()
            .map(|m| m.clone())
            .map_err(|e| SchedulerError::LockPoisoned(format!("RecomputeMetrics read lock: {}", e)))
    }

    fn update_metrics(&self, update: impl FnOnce(&mut RecomputeMetrics)) {
        match self.metrics.write() {
            Ok(mut m) => update(&mut m),
            Err(e) => error!("Failed to acquire RecomputeMetrics write lock: {}", e),
        }
    }

    // ── Single-author operations ────────────────────────────────

    /// Set an author's interval; `force_now` also makes it due immediately.
    ///
    /// Without `force_now` an existing `next_due` is left alone, so an author
    /// moving tiers is picked up at its old due time and then at the new pace.
    pub async fn upsert_frequency(
        &self,
        author_id: AuthorId,
        interval_seconds: i64,
        force_now: bool,
    ) -> Result<ScheduleEntry, SchedulerError> {
        self.upsert_at(author_id, interval_seconds, force_now, self.clock.now()).await
    }

    async fn upsert_at(
        &self,
        author_id: AuthorId,
        interval_seconds: i64,
        force_now: bool,
        now: DateTime<Utc>,
    ) -> Result<ScheduleEntry, SchedulerError> {
        if interval_seconds <= 0 {
            return Err(SchedulerError::InvalidInterval(interval_seconds));
        }
        let entry = self
            .schedule
            .upsert_conditional(ScheduleUpsert { author_id, interval_seconds, now, force_now })
            .await?;
        debug!(author_id, interval_seconds, force_now, next_due = %entry.next_due, "schedule upserted");
        Ok(entry)
    }

    /// First registration of an author: daily interval, crawl immediately.
    pub async fn register_author(&self, author_id: AuthorId) -> Result<ScheduleEntry, SchedulerError> {
        info!(author_id, "registering author");
        self.upsert_frequency(author_id, SECONDS_PER_DAY, true).await
    }

    /// Seed a daily entry for an author that has none. Existing entries are
    /// returned untouched.
    ///
    /// Waits for a running recompute, so a tier interval written by that
    /// cycle is never replaced with the daily seed.
    pub async fn ensure_tracked(&self, author_id: AuthorId) -> Result<ScheduleEntry, SchedulerError> {
        let _guard = self.recompute_lock.lock().await;
        if let Some(existing) = self.schedule.entry(author_id).await? {
            return Ok(existing);
        }
        self.upsert_frequency(author_id, SECONDS_PER_DAY, false).await
    }

    // ── Queries ─────────────────────────────────────────────────

    /// Most visited authors over the last day. `None` uses `hot_list_size`.
    pub async fn hot_authors(&self, limit: Option<usize>) -> Result<Vec<VisitCount>, SchedulerError> {
        let limit = limit.unwrap_or(self.config.hot_list_size);
        let since = self.clock.now() - ChronoDuration::days(VISIT_WINDOW_DAYS);
        Ok(self.visits.most_visited(since, limit).await?)
    }

    /// Entries due for a crawl, earliest first.
    pub async fn due_authors(&self, limit: usize) -> Result<Vec<ScheduleEntry>, SchedulerError> {
        Ok(self.schedule.due(self.clock.now(), limit).await?)
    }

    // ── Recompute ───────────────────────────────────────────────

    /// Re-evaluate every tier in [`TIER_ORDER`] and upsert its members.
    ///
    /// One timestamp is sampled for the whole cycle. A failed upsert skips
    /// that author; a failed candidate query skips that tier. Only when no
    /// tier could be queried is the cycle an error.
    pub async fn recompute_schedule(&self) -> Result<RecomputeReport, SchedulerError> {
        let _guard = self.recompute_lock.lock().await;
        let started = Instant::now();
        let now = self.clock.now();
        let mut report = RecomputeReport::new(now);

        for tier in TIER_ORDER {
            let ids = match tier.candidates(self.authors.as_ref(), self.visits.as_ref(), now).await {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(tier = %tier, error = %e, "candidate query failed, skipping tier");
                    report.tiers.push(TierOutcome::skipped(tier, e.to_string()));
                    continue;
                }
            };

            let mut outcome = TierOutcome::new(tier, ids.len());
            for author_id in ids {
                match self.upsert_at(author_id, tier.interval_seconds(), false, now).await {
                    Ok(_) => outcome.upserted += 1,
                    Err(e) => {
                        warn!(tier = %tier, author_id, error = %e, "upsert failed, skipping author");
                        outcome.failed += 1;
                    }
                }
            }
            debug!(tier = %tier, candidates = outcome.candidates, upserted = outcome.upserted, "tier applied");
            report.tiers.push(outcome);
        }

        if report.all_tiers_skipped() {
            self.update_metrics(|m| m.record_failure());
            let reasons: Vec<String> = report
                .tiers
                .iter()
                .filter_map(|t| t.skipped.as_ref().map(|r| format!("{}: {}", t.tier, r)))
                .collect();
            return Err(SchedulerError::StoresUnreachable(reasons.join("; ")));
        }

        let elapsed = started.elapsed();
        self.update_metrics(|m| m.record_cycle(&report, elapsed));
        info!(
            upserted = report.upserted(),
            failed = report.failed(),
            skipped_tiers = report.skipped_tiers(),
            "Schedule recomputed in {:?}",
            elapsed
        );
        Ok(report)
    }

    /// Recompute once per `period` until `shutdown` is notified.
    ///
    /// The first cycle runs immediately. Failed cycles are logged and the
    /// loop keeps going.
    pub async fn run_every(&self, period: Duration, shutdown: Arc<Notify>) {
        info!("Frequency scheduler starting, period {:?}", period);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.notified() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.recompute_schedule().await {
                        warn!("Recompute cycle failed: {}", e);
                    }
                }
            }
        }

        info!("Frequency scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::Tier;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use fanwatch_core::{Author, ManualClock, RateOrder};
    use fanwatch_store::{MemoryStore, StoreError};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 14, 10, 0, 0).unwrap()
    }

    fn author(id: AuthorId, fans: i64) -> Author {
        Author { fan_count: fans, ..Author::new(id) }
    }

    fn scheduler(store: Arc<MemoryStore>) -> (FrequencyScheduler, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(t0()));
        let s = FrequencyScheduler::with_store(SchedulerConfig::default(), store).with_clock(clock.clone());
        (s, clock)
    }

    /// Author store and visit log that are always down.
    struct Unreachable;

    #[async_trait]
    impl AuthorStore for Unreachable {
        async fn author(&self, _id: AuthorId) -> Result<Option<Author>, StoreError> {
            Err(StoreError::Unavailable("authors down".into()))
        }
        async fn ids_with_min_fans(&self, _threshold: i64) -> Result<Vec<AuthorId>, StoreError> {
            Err(StoreError::Unavailable("authors down".into()))
        }
        async fn force_priority_ids(&self) -> Result<Vec<AuthorId>, StoreError> {
            Err(StoreError::Unavailable("authors down".into()))
        }
        async fn top_by_rate(&self, _limit: usize, _order: RateOrder) -> Result<Vec<AuthorId>, StoreError> {
            Err(StoreError::Unavailable("authors down".into()))
        }
    }

    #[async_trait]
    impl VisitLog for Unreachable {
        async fn most_visited(&self, _since: DateTime<Utc>, _limit: usize) -> Result<Vec<VisitCount>, StoreError> {
            Err(StoreError::Unavailable("visits down".into()))
        }
    }

    /// Schedule store that rejects writes for one author.
    struct RejectOne {
        inner: MemoryStore,
        reject: AuthorId,
    }

    #[async_trait]
    impl ScheduleStore for RejectOne {
        async fn upsert_conditional(&self, upsert: ScheduleUpsert) -> Result<ScheduleEntry, StoreError> {
            if upsert.author_id == self.reject {
                return Err(StoreError::Unavailable("write rejected".into()));
            }
            self.inner.upsert_conditional(upsert).await
        }
        async fn entry(&self, author_id: AuthorId) -> Result<Option<ScheduleEntry>, StoreError> {
            self.inner.entry(author_id).await
        }
        async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<ScheduleEntry>, StoreError> {
            self.inner.due(now, limit).await
        }
    }

    #[tokio::test]
    async fn upsert_seeds_then_preserves_next_due() {
        let store = Arc::new(MemoryStore::new());
        let (s, clock) = scheduler(store);

        let first = s.upsert_frequency(42, 3_600, false).await.unwrap();
        assert_eq!(first.next_due, t0() + ChronoDuration::seconds(3_600));

        clock.advance(ChronoDuration::seconds(600));
        let second = s.upsert_frequency(42, 900, false).await.unwrap();
        assert_eq!(second.interval_seconds, 900);
        assert_eq!(second.last_updated, t0() + ChronoDuration::seconds(600));
        assert_eq!(second.next_due, first.next_due);
    }

    #[tokio::test]
    async fn force_now_overwrites_next_due() {
        let store = Arc::new(MemoryStore::new());
        let (s, clock) = scheduler(store);

        s.upsert_frequency(42, 86_400, false).await.unwrap();
        clock.advance(ChronoDuration::seconds(60));
        let forced = s.upsert_frequency(42, 86_400, true).await.unwrap();
        assert_eq!(forced.next_due, t0() + ChronoDuration::seconds(60));
    }

    #[tokio::test]
    async fn rejects_non_positive_interval() {
        let (s, _) = scheduler(Arc::new(MemoryStore::new()));
        let err = s.upsert_frequency(1, 0, false).await.unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidInterval(0)));
    }

    #[tokio::test]
    async fn register_forces_immediate_crawl() {
        let (s, _) = scheduler(Arc::new(MemoryStore::new()));
        let entry = s.register_author(7).await.unwrap();
        assert_eq!(entry.interval_seconds, SECONDS_PER_DAY);
        assert_eq!(entry.next_due, t0());
        assert_eq!(s.due_authors(10).await.unwrap(), vec![entry]);
    }

    #[tokio::test]
    async fn ensure_tracked_only_seeds_once() {
        let (s, clock) = scheduler(Arc::new(MemoryStore::new()));
        s.upsert_frequency(7, 900, false).await.unwrap();
        clock.advance(ChronoDuration::hours(1));

        let kept = s.ensure_tracked(7).await.unwrap();
        assert_eq!(kept.interval_seconds, 900);
        assert_eq!(kept.last_updated, t0());

        let seeded = s.ensure_tracked(8).await.unwrap();
        assert_eq!(seeded.interval_seconds, SECONDS_PER_DAY);
        assert_eq!(seeded.next_due, clock.now() + ChronoDuration::days(1));
    }

    #[tokio::test]
    async fn hot_tier_wins_over_popular() {
        let store = Arc::new(MemoryStore::new());
        store.insert_author(author(1, 2_000_000)).unwrap();
        store.insert_author(author(2, 200_000)).unwrap();
        store.insert_author(author(3, 10)).unwrap();
        // Fill both rate leaderboards so authors 1..=3 stay off them.
        for id in 1_000..1_100 {
            store.insert_author(Author { rate_of_change: 10.0, ..author(id, 0) }).unwrap();
            store.insert_author(Author { rate_of_change: -10.0, ..author(id + 1_000, 0) }).unwrap();
        }
        let (s, _) = scheduler(store.clone());

        s.recompute_schedule().await.unwrap();

        assert_eq!(store.entry(1).await.unwrap().unwrap().interval_seconds, 21_600);
        assert_eq!(store.entry(2).await.unwrap().unwrap().interval_seconds, 86_400);
        assert!(store.entry(3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn later_tiers_override_earlier_ones() {
        let store = Arc::new(MemoryStore::new());
        store.insert_author(Author { force_priority: true, ..author(1, 5_000_000) }).unwrap();
        store.record_visit(1, None, t0() - ChronoDuration::hours(2)).unwrap();
        let (s, _) = scheduler(store.clone());

        let report = s.recompute_schedule().await.unwrap();

        let tiers: Vec<Tier> = report.tiers.iter().map(|t| t.tier).collect();
        assert_eq!(tiers, TIER_ORDER.to_vec());
        assert_eq!(store.entry(1).await.unwrap().unwrap().interval_seconds, 900);
        assert_eq!(report.upserted(), 6);
    }

    #[tokio::test]
    async fn recompute_is_idempotent_on_next_due() {
        let store = Arc::new(MemoryStore::new());
        store.insert_author(author(1, 2_000_000)).unwrap();
        let (s, clock) = scheduler(store.clone());

        s.recompute_schedule().await.unwrap();
        let first = store.entry(1).await.unwrap().unwrap();

        clock.advance(ChronoDuration::minutes(5));
        s.recompute_schedule().await.unwrap();
        let second = store.entry(1).await.unwrap().unwrap();

        assert_eq!(second.interval_seconds, first.interval_seconds);
        assert_eq!(second.next_due, first.next_due);
        assert_eq!(second.last_updated, t0() + ChronoDuration::minutes(5));
        assert_eq!(s.metrics().unwrap().cycles, 2);
    }

    #[tokio::test]
    async fn failed_upsert_skips_author_only() {
        let store = Arc::new(MemoryStore::new());
        store.insert_author(author(1, 2_000_000)).unwrap();
        store.insert_author(author(2, 2_000_000)).unwrap();
        let schedule = Arc::new(RejectOne { inner: MemoryStore::new(), reject: 1 });
        let s = FrequencyScheduler::new(SchedulerConfig::default(), store.clone(), store, schedule.clone())
            .with_clock(Arc::new(ManualClock::new(t0())));

        let report = s.recompute_schedule().await.unwrap();

        assert!(report.failed() > 0);
        assert!(schedule.entry(1).await.unwrap().is_none());
        assert!(schedule.entry(2).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn partial_outage_skips_tiers() {
        let store = Arc::new(MemoryStore::new());
        store.insert_author(author(1, 2_000_000)).unwrap();
        let s = FrequencyScheduler::new(SchedulerConfig::default(), store.clone(), Arc::new(Unreachable), store.clone())
            .with_clock(Arc::new(ManualClock::new(t0())));

        let report = s.recompute_schedule().await.unwrap();

        assert_eq!(report.skipped_tiers(), 1);
        assert!(report.tiers.iter().any(|t| t.tier == Tier::MostVisited && t.skipped.is_some()));
        assert!(store.entry(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn total_outage_is_an_error() {
        let down = Arc::new(Unreachable);
        let s = FrequencyScheduler::new(
            SchedulerConfig::default(),
            down.clone(),
            down,
            Arc::new(MemoryStore::new()),
        );

        let err = s.recompute_schedule().await.unwrap_err();
        assert!(matches!(err, SchedulerError::StoresUnreachable(_)));
        assert_eq!(s.metrics().unwrap().failed_cycles, 1);
    }

    #[tokio::test]
    async fn hot_authors_reads_last_day() {
        let store = Arc::new(MemoryStore::new());
        store.record_visit(1, None, t0() - ChronoDuration::days(3)).unwrap();
        store.record_visit(2, None, t0() - ChronoDuration::hours(1)).unwrap();
        let (s, _) = scheduler(store);

        let hot = s.hot_authors(Some(10)).await.unwrap();
        assert_eq!(hot, vec![VisitCount { author_id: 2, visits: 1 }]);
    }

    #[tokio::test]
    async fn hot_authors_defaults_to_configured_size() {
        let store = Arc::new(MemoryStore::new());
        for id in 1..=5 {
            store.record_visit(id, None, t0() - ChronoDuration::minutes(id)).unwrap();
        }
        let config = SchedulerConfig { hot_list_size: 3, ..SchedulerConfig::default() };
        let s = FrequencyScheduler::with_store(config, store).with_clock(Arc::new(ManualClock::new(t0())));

        assert_eq!(s.hot_authors(None).await.unwrap().len(), 3);
        assert_eq!(s.hot_authors(Some(5)).await.unwrap().len(), 5);
    }

    /// Schedule store whose first write blocks until `release` is notified.
    struct GatedSchedule {
        inner: MemoryStore,
        armed: std::sync::atomic::AtomicBool,
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl ScheduleStore for GatedSchedule {
        async fn upsert_conditional(&self, upsert: ScheduleUpsert) -> Result<ScheduleEntry, StoreError> {
            if self.armed.swap(false, std::sync::atomic::Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.upsert_conditional(upsert).await
        }
        async fn entry(&self, author_id: AuthorId) -> Result<Option<ScheduleEntry>, StoreError> {
            self.inner.entry(author_id).await
        }
        async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<ScheduleEntry>, StoreError> {
            self.inner.due(now, limit).await
        }
    }

    #[tokio::test]
    async fn ensure_tracked_waits_for_running_recompute() {
        let store = Arc::new(MemoryStore::new());
        store.insert_author(author(1, 2_000_000)).unwrap();
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let schedule = Arc::new(GatedSchedule {
            inner: MemoryStore::new(),
            armed: std::sync::atomic::AtomicBool::new(true),
            entered: Arc::clone(&entered),
            release: Arc::clone(&release),
        });
        let s = Arc::new(
            FrequencyScheduler::new(SchedulerConfig::default(), store.clone(), store, schedule.clone())
                .with_clock(Arc::new(ManualClock::new(t0()))),
        );

        let recompute = {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.recompute_schedule().await })
        };
        entered.notified().await;

        let tracked = {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.ensure_tracked(1).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!tracked.is_finished(), "ensure_tracked ran inside a recompute");

        release.notify_one();
        recompute.await.unwrap().unwrap();
        let entry = tracked.await.unwrap().unwrap();

        // Author 1 tops both rate leaderboards, so the cycle ends on 900s.
        assert_eq!(entry.interval_seconds, 900);
        assert_eq!(schedule.entry(1).await.unwrap().unwrap().interval_seconds, 900);
    }

    #[tokio::test]
    async fn poisoned_metrics_do_not_fail_recompute() {
        let store = Arc::new(MemoryStore::new());
        store.insert_author(author(1, 2_000_000)).unwrap();
        let (s, _) = scheduler(store.clone());

        let metrics = Arc::clone(&s.metrics);
        let _ = std::thread::spawn(move || {
            let _guard = metrics.write().unwrap();
            panic!("poison the metrics lock");
        })
        .join();

        s.recompute_schedule().await.unwrap();
        assert!(matches!(s.metrics(), Err(SchedulerError::LockPoisoned(_))));
        assert!(store.entry(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn run_every_stops_on_shutdown() {
        let store = Arc::new(MemoryStore::new());
        store.insert_author(author(1, 2_000_000)).unwrap();
        let (s, _) = scheduler(store);
        let s = Arc::new(s);
        let shutdown = Arc::new(Notify::new());

        let handle = {
            let s = Arc::clone(&s);
            let shutdown = Arc::clone(&shutdown);
            tokio::spawn(async move { s.run_every(Duration::from_millis(10), shutdown).await })
        };

        while s.metrics().unwrap().cycles < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown.notify_one();
        handle.await.unwrap();
        assert!(s.metrics().unwrap().cycles >= 2);
    }
}
