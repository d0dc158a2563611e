use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable author identifier (the platform's member id).
pub type AuthorId = i64;

/// A tracked content creator with its cumulative metrics.
///
/// Metrics are written by the external crawler; this workspace only reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: AuthorId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub face: Option<String>,
    #[serde(default)]
    pub fan_count: i64,
    #[serde(default)]
    pub view_count: i64,
    #[serde(default)]
    pub rate_of_change: f64,
    #[serde(default)]
    pub force_priority: bool,
}

impl Author {
    /// Bare record for an author that was registered but never crawled.
    pub fn new(id: AuthorId) -> Self {
        Self {
            id,
            name: String::new(),
            face: None,
            fan_count: 0,
            view_count: 0,
            rate_of_change: 0.0,
            force_priority: false,
        }
    }
}

/// One published content item (video, article) owned by an author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: i64,
    pub author_id: AuthorId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub views: i64,
    pub published_at: DateTime<Utc>,
}

impl ContentItem {
    /// Whether this item carries every tag in `filter`.
    pub fn has_all_tags(&self, filter: &[String]) -> bool {
        filter.iter().all(|t| self.tags.contains(t))
    }
}

/// An "author detail viewed" event from the visit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitEvent {
    pub author_id: AuthorId,
    #[serde(default)]
    pub user: Option<String>,
    pub visited_at: DateTime<Utc>,
}

/// Sort direction for rate-of-change leaderboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RateOrder {
    /// Fastest growing first.
    Descending,
    /// Fastest shrinking first.
    Ascending,
}

impl std::fmt::Display for RateOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateOrder::Descending => write!(f, "desc"),
            RateOrder::Ascending => write!(f, "asc"),
        }
    }
}
