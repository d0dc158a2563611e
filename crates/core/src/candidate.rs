use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::author::{Author, AuthorId, ContentItem};

/// A similar author produced by discovery. Used for ranking only, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateScore {
    pub author_id: AuthorId,
    pub name: Option<String>,
    pub face: Option<String>,
    /// Number of matched content items.
    pub item_count: usize,
    /// Mean view count across the matched items.
    pub avg_views: f64,
    /// Distinct tags observed on the matched items.
    pub tags: BTreeSet<String>,
}

impl CandidateScore {
    /// Keep only the tags this candidate shares with `host_tags`.
    pub fn restrict_tags(&mut self, host_tags: &BTreeSet<String>) {
        self.tags.retain(|t| host_tags.contains(t));
    }
}

/// Aggregate view weight of one tag across an author's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagWeight {
    pub tag: String,
    pub total_views: i64,
    pub item_count: usize,
}

/// Visit count for one author within a time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitCount {
    pub author_id: AuthorId,
    pub visits: u64,
}

/// Parameters of one discovery round against the content corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct TagQuery {
    /// Every tag a matching item must carry.
    pub tags: Vec<String>,
    /// The source author, never returned as a candidate.
    pub exclude_author: AuthorId,
    /// Only items published strictly after this instant match.
    pub since: DateTime<Utc>,
    /// Maximum number of matching items scanned.
    pub item_cap: usize,
    /// Maximum number of grouped candidates returned.
    pub limit: usize,
}

/// Rank tag weights: views descending, tag name ascending on ties.
pub fn rank_tags<'a>(items: impl IntoIterator<Item = &'a ContentItem>, limit: usize) -> Vec<TagWeight> {
    let mut by_tag: HashMap<&str, (i64, usize)> = HashMap::new();
    for item in items {
        for tag in &item.tags {
            let slot = by_tag.entry(tag.as_str()).or_default();
            slot.0 += item.views;
            slot.1 += 1;
        }
    }

    let mut weights: Vec<TagWeight> = by_tag
        .into_iter()
        .map(|(tag, (total_views, item_count))| TagWeight {
            tag: tag.to_string(),
            total_views,
            item_count,
        })
        .collect();
    weights.sort_by(|a, b| b.total_views.cmp(&a.total_views).then_with(|| a.tag.cmp(&b.tag)));
    weights.truncate(limit);
    weights
}

/// Group content items by author into candidate scores.
///
/// Output is sorted by mean views descending, then author id ascending, and
/// truncated to `limit`. `authors` supplies names and faces; authors missing
/// from it still produce a candidate without them.
pub fn group_by_author<'a>(
    items: impl IntoIterator<Item = &'a ContentItem>,
    authors: &HashMap<AuthorId, Author>,
    limit: usize,
) -> Vec<CandidateScore> {
    let mut groups: HashMap<AuthorId, (usize, i64, BTreeSet<String>)> = HashMap::new();
    for item in items {
        let group = groups.entry(item.author_id).or_default();
        group.0 += 1;
        group.1 += item.views;
        group.2.extend(item.tags.iter().cloned());
    }

    let mut candidates: Vec<CandidateScore> = groups
        .into_iter()
        .map(|(author_id, (count, views, tags))| {
            let author = authors.get(&author_id);
            CandidateScore {
                author_id,
                name: author.map(|a| a.name.clone()),
                face: author.and_then(|a| a.face.clone()),
                item_count: count,
                avg_views: views as f64 / count as f64,
                tags,
            }
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.avg_views
            .total_cmp(&a.avg_views)
            .then_with(|| a.author_id.cmp(&b.author_id))
    });
    candidates.truncate(limit);
    candidates
}
