use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, warn};

use fanwatch_core::config::DiscoveryConfig;
use fanwatch_core::{AuthorId, CandidateScore, Clock, SystemClock, TagQuery, TagWeight};
use fanwatch_store::{AuthorStore, ContentCorpus, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Tag-overlap similarity search over the content corpus.
pub struct DiscoveryEngine {
    config: DiscoveryConfig,
    authors: Arc<dyn AuthorStore>,
    corpus: Arc<dyn ContentCorpus>,
    clock: Arc<dyn Clock>,
}

impl DiscoveryEngine {
    pub fn new(config: DiscoveryConfig, authors: Arc<dyn AuthorStore>, corpus: Arc<dyn ContentCorpus>) -> Self {
        Self { config, authors, corpus, clock: Arc::new(SystemClock) }
    }

    /// Engine over a single backend serving both authors and content.
    pub fn with_store<S>(config: DiscoveryConfig, store: Arc<S>) -> Self
    where
        S: AuthorStore + ContentCorpus + 'static,
    {
        Self::new(config, store.clone(), store)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// The author's heaviest tags, as used to seed the discovery filter.
    pub async fn top_tags(&self, author_id: AuthorId) -> Result<Vec<TagWeight>, DiscoveryError> {
        Ok(self.corpus.top_tags(author_id, self.config.top_tags).await?)
    }

    /// Authors related to `author_id`, followed by the author's own profile.
    ///
    /// Starts with a filter of the author's top tags and drops the weakest tag
    /// after each round, until at least `result_limit` candidates have been
    /// collected or a single tag remains. Earlier (narrower) rounds come first
    /// in the output; later rounds only add authors not seen yet. Candidate
    /// tags are cut down to the ones the host also uses.
    ///
    /// Returns an empty list when the author is not registered or has no
    /// tagged content. Store failures never surface: a failed round ends the
    /// search with what has been gathered so far.
    pub async fn discover(&self, author_id: AuthorId, result_limit: usize) -> Vec<CandidateScore> {
        match self.authors.author(author_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!(author_id, "unknown author, nothing to discover");
                return Vec::new();
            }
            Err(e) => {
                warn!(author_id, error = %e, "author lookup failed");
                return Vec::new();
            }
        }

        let tags = match self.top_tags(author_id).await {
            Ok(tags) => tags,
            Err(e) => {
                warn!(author_id, error = %e, "top tags lookup failed");
                return Vec::new();
            }
        };
        if tags.is_empty() {
            debug!(author_id, "no tagged content, nothing to discover");
            return Vec::new();
        }

        let host = match self.corpus.author_profile(author_id).await {
            Ok(Some(host)) => host,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(author_id, error = %e, "host profile lookup failed");
                return Vec::new();
            }
        };

        let since = self.clock.now() - Duration::days(self.config.window_days);
        let mut filter: Vec<String> = tags.into_iter().map(|t| t.tag).collect();
        let mut seen: HashSet<AuthorId> = HashSet::new();
        let mut related: Vec<CandidateScore> = Vec::new();

        loop {
            let query = TagQuery {
                tags: filter.clone(),
                exclude_author: author_id,
                since,
                item_cap: self.config.item_cap,
                limit: self.config.round_limit,
            };
            let found = match self.corpus.candidates_by_tags(&query).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(author_id, tags = ?filter, error = %e, "discovery round failed, returning partial result");
                    break;
                }
            };

            let before = related.len();
            for mut candidate in found {
                if seen.insert(candidate.author_id) {
                    candidate.restrict_tags(&host.tags);
                    related.push(candidate);
                }
            }
            debug!(author_id, tags = ?filter, added = related.len() - before, total = related.len(), "discovery round");

            if related.len() < result_limit && filter.len() > 1 {
                filter.pop();
            } else {
                break;
            }
        }

        related.push(host);
        related
    }
}
