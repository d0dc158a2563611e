//! PostgreSQL backend.
//!
//! Tag filtering uses array containment (`tags @> $n`) over a GIN index.
//! The schedule upsert is a single `INSERT ... ON CONFLICT` statement so the
//! create-or-update branch is decided by the database, never by a prior read.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use fanwatch_core::config::PostgresConfig;
use fanwatch_core::{
    group_by_author, Author, AuthorId, CandidateScore, ContentItem, RateOrder, ScheduleEntry,
    ScheduleUpsert, TagQuery, TagWeight, VisitCount,
};

use crate::error::StoreError;
use crate::traits::{AuthorStore, ContentCorpus, ScheduleStore, VisitLog};

#[derive(Debug, sqlx::FromRow)]
struct AuthorRow {
    mid: i64,
    name: String,
    face: Option<String>,
    fans: i64,
    views: i64,
    rate: f64,
    force_priority: bool,
}

impl From<AuthorRow> for Author {
    fn from(row: AuthorRow) -> Self {
        Author {
            id: row.mid,
            name: row.name,
            face: row.face,
            fan_count: row.fans,
            view_count: row.views,
            rate_of_change: row.rate,
            force_priority: row.force_priority,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ContentRow {
    item_id: i64,
    author_id: i64,
    title: String,
    tags: Vec<String>,
    views: i64,
    published_at: DateTime<Utc>,
}

impl From<ContentRow> for ContentItem {
    fn from(row: ContentRow) -> Self {
        ContentItem {
            id: row.item_id,
            author_id: row.author_id,
            title: row.title,
            tags: row.tags,
            views: row.views,
            published_at: row.published_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ScheduleRow {
    #[sqlx(rename = "authorId")]
    author_id: i64,
    #[sqlx(rename = "lastUpdated")]
    last_updated: DateTime<Utc>,
    #[sqlx(rename = "intervalSeconds")]
    interval_seconds: i64,
    #[sqlx(rename = "nextDue")]
    next_due: DateTime<Utc>,
}

impl From<ScheduleRow> for ScheduleEntry {
    fn from(row: ScheduleRow) -> Self {
        ScheduleEntry {
            author_id: row.author_id,
            last_updated: row.last_updated,
            interval_seconds: row.interval_seconds,
            next_due: row.next_due,
        }
    }
}

const AUTHOR_COLUMNS: &str = "mid, name, face, fans, views, rate, force_priority";
const CONTENT_COLUMNS: &str = "item_id, author_id, title, tags, views, published_at";
const SCHEDULE_COLUMNS: &str = r#""authorId", "lastUpdated", "intervalSeconds", "nextDue""#;

/// Pooled PostgreSQL store implementing every store trait.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect using the profiled env config and apply migrations.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.connection_string())
            .await?;
        info!("PostgreSQL connected: {}", config.host);

        let store = Self::from_pool(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        info!("Database migrations applied successfully");
        Ok(())
    }

    async fn authors_by_ids(&self, ids: Vec<AuthorId>) -> Result<HashMap<AuthorId, Author>, StoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, AuthorRow>(&format!(
            "SELECT {AUTHOR_COLUMNS} FROM author WHERE mid = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| (r.mid, Author::from(r))).collect())
    }

    async fn ids_where(&self, sql: &str) -> Result<Vec<AuthorId>, StoreError> {
        let rows = sqlx::query_as::<_, (i64,)>(sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

fn as_limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[async_trait]
impl AuthorStore for PgStore {
    async fn author(&self, id: AuthorId) -> Result<Option<Author>, StoreError> {
        let row = sqlx::query_as::<_, AuthorRow>(&format!("SELECT {AUTHOR_COLUMNS} FROM author WHERE mid = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Author::from))
    }

    async fn ids_with_min_fans(&self, threshold: i64) -> Result<Vec<AuthorId>, StoreError> {
        let rows = sqlx::query_as::<_, (i64,)>("SELECT mid FROM author WHERE fans > $1 ORDER BY mid")
            .bind(threshold)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn force_priority_ids(&self) -> Result<Vec<AuthorId>, StoreError> {
        self.ids_where("SELECT mid FROM author WHERE force_priority ORDER BY mid").await
    }

    async fn top_by_rate(&self, limit: usize, order: RateOrder) -> Result<Vec<AuthorId>, StoreError> {
        let sql = match order {
            RateOrder::Descending => "SELECT mid FROM author ORDER BY rate DESC, mid LIMIT $1",
            RateOrder::Ascending => "SELECT mid FROM author ORDER BY rate ASC, mid LIMIT $1",
        };
        let rows = sqlx::query_as::<_, (i64,)>(sql)
            .bind(as_limit(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[async_trait]
impl VisitLog for PgStore {
    async fn most_visited(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<VisitCount>, StoreError> {
        let rows = sqlx::query_as::<_, (i64, i64)>(
            "SELECT author_id, COUNT(*) AS visits FROM author_visit \
             WHERE visited_at > $1 \
             GROUP BY author_id ORDER BY visits DESC, author_id LIMIT $2",
        )
        .bind(since)
        .bind(as_limit(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(author_id, visits)| VisitCount { author_id, visits: visits.max(0) as u64 })
            .collect())
    }
}

#[async_trait]
impl ContentCorpus for PgStore {
    async fn top_tags(&self, author_id: AuthorId, limit: usize) -> Result<Vec<TagWeight>, StoreError> {
        let rows = sqlx::query_as::<_, (String, i64, i64)>(
            "SELECT tag, SUM(views)::BIGINT AS total_views, COUNT(*) AS item_count \
             FROM content CROSS JOIN LATERAL unnest(tags) AS tag \
             WHERE author_id = $1 \
             GROUP BY tag ORDER BY total_views DESC, tag LIMIT $2",
        )
        .bind(author_id)
        .bind(as_limit(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(tag, total_views, item_count)| TagWeight {
                tag,
                total_views,
                item_count: item_count.max(0) as usize,
            })
            .collect())
    }

    async fn author_profile(&self, author_id: AuthorId) -> Result<Option<CandidateScore>, StoreError> {
        let items: Vec<ContentItem> = sqlx::query_as::<_, ContentRow>(&format!(
            "SELECT {CONTENT_COLUMNS} FROM content WHERE author_id = $1"
        ))
        .bind(author_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(ContentItem::from)
        .collect();
        if items.is_empty() {
            return Ok(None);
        }
        let authors = self.authors_by_ids(vec![author_id]).await?;
        Ok(group_by_author(&items, &authors, 1).pop())
    }

    async fn candidates_by_tags(&self, query: &TagQuery) -> Result<Vec<CandidateScore>, StoreError> {
        let items: Vec<ContentItem> = sqlx::query_as::<_, ContentRow>(&format!(
            "SELECT {CONTENT_COLUMNS} FROM content \
             WHERE author_id <> $1 AND published_at > $2 AND tags @> $3 \
             ORDER BY item_id LIMIT $4"
        ))
        .bind(query.exclude_author)
        .bind(query.since)
        .bind(&query.tags)
        .bind(as_limit(query.item_cap))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(ContentItem::from)
        .collect();

        let mut ids: Vec<AuthorId> = items.iter().map(|i| i.author_id).collect();
        ids.sort_unstable();
        ids.dedup();
        let authors = self.authors_by_ids(ids).await?;
        Ok(group_by_author(&items, &authors, query.limit))
    }
}

#[async_trait]
impl ScheduleStore for PgStore {
    async fn upsert_conditional(&self, upsert: ScheduleUpsert) -> Result<ScheduleEntry, StoreError> {
        let row = sqlx::query_as::<_, ScheduleRow>(&format!(
            r#"INSERT INTO author_schedule ({SCHEDULE_COLUMNS}) VALUES ($1, $2, $3, $4)
               ON CONFLICT ("authorId") DO UPDATE SET
                   "lastUpdated" = EXCLUDED."lastUpdated",
                   "intervalSeconds" = EXCLUDED."intervalSeconds",
                   "nextDue" = CASE WHEN $5 THEN EXCLUDED."nextDue" ELSE author_schedule."nextDue" END
               RETURNING {SCHEDULE_COLUMNS}"#
        ))
        .bind(upsert.author_id)
        .bind(upsert.now)
        .bind(upsert.interval_seconds)
        .bind(upsert.seed_next_due())
        .bind(upsert.force_now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn entry(&self, author_id: AuthorId) -> Result<Option<ScheduleEntry>, StoreError> {
        let row = sqlx::query_as::<_, ScheduleRow>(&format!(
            r#"SELECT {SCHEDULE_COLUMNS} FROM author_schedule WHERE "authorId" = $1"#
        ))
        .bind(author_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ScheduleEntry::from))
    }

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<ScheduleEntry>, StoreError> {
        let rows = sqlx::query_as::<_, ScheduleRow>(&format!(
            r#"SELECT {SCHEDULE_COLUMNS} FROM author_schedule
               WHERE "nextDue" <= $1 ORDER BY "nextDue", "authorId" LIMIT $2"#
        ))
        .bind(now)
        .bind(as_limit(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ScheduleEntry::from).collect())
    }
}
