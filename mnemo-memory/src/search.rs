//! Recency and context aware reranking
//!
//! Nearest-neighbour hits are oversampled from the vector store, filtered,
//! and reordered by
//! `adjusted = raw_similarity × time_weight(age) × context_boost`.
//! Plain similarity over an ever-growing store keeps surfacing stale
//! matches; the multiplicative weights pull recent and situationally
//! relevant memories forward.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::embedding::EmbeddingGateway;
use crate::error::Result;
use crate::item::{ConversationExchange, ItemKind, MemoryItem};
use crate::storage::{QueryHit, VectorStore};
use crate::temporal::weight_at;

/// Multiplier for candidates from the caller's current context
pub const CONTEXT_BOOST: f32 = 1.5;

/// How many times a filtered query may double its candidate window
pub const MAX_WIDENING: usize = 4;

/// Returned alongside empty results when the index has nothing in it
pub const REBUILD_HINT: &str = "The memory index is empty. Run `mnemo rebuild` to build it.";

/// Options for [`MemorySearch::search`]
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Maximum results to return
    pub limit: usize,
    /// Only return items of this kind
    pub kind: Option<ItemKind>,
    /// Only return items at or after this time
    pub since: Option<DateTime<Utc>>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            kind: None,
            since: None,
        }
    }
}

/// Options for [`MemorySearch::search_conversations`]
#[derive(Debug, Clone)]
pub struct ConversationSearchOptions {
    pub limit: usize,
    /// Drop exchanges from other projects instead of just ranking them lower
    pub project_only: bool,
    /// Project directory the caller is working in
    pub current_context: Option<String>,
}

impl Default for ConversationSearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            project_only: false,
            current_context: None,
        }
    }
}

/// Everything the ranking engine needs besides the hits
#[derive(Debug, Clone)]
pub struct RankQuery<'a> {
    pub limit: usize,
    pub kind: Option<ItemKind>,
    pub since: Option<DateTime<Utc>>,
    pub current_context: Option<&'a str>,
    pub restrict_to_context: bool,
    pub now: DateTime<Utc>,
}

/// A ranked memory item
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub item: MemoryItem,
    /// Similarity as returned by the vector store (for display)
    pub score: f32,
    /// Reranked score (the ordering key)
    pub adjusted_score: f32,
}

/// A ranked conversation exchange
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeResult {
    pub exchange: ConversationExchange,
    pub score: f32,
    pub adjusted_score: f32,
}

/// Results plus an optional hint for the caller
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome<T> {
    pub results: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl<T> SearchOutcome<T> {
    fn found(results: Vec<T>) -> Self {
        Self {
            results,
            hint: None,
        }
    }

    fn empty_index() -> Self {
        Self {
            results: Vec::new(),
            hint: Some(REBUILD_HINT.to_string()),
        }
    }
}

/// Whether a candidate's context matches the caller's.
///
/// Matches when the caller is working in the candidate's project directory
/// or anywhere beneath it.
pub fn context_matches(candidate: Option<&str>, current: Option<&str>) -> bool {
    match (candidate, current) {
        (Some(candidate), Some(current)) if !candidate.is_empty() && !current.is_empty() => {
            Path::new(current).starts_with(Path::new(candidate))
        }
        _ => false,
    }
}

/// Rerank oversampled hits. Undecodable hits are dropped.
pub fn rank(hits: Vec<QueryHit>, query: &RankQuery<'_>) -> Vec<SearchResult> {
    let mut ranked: Vec<SearchResult> = hits
        .into_iter()
        .filter_map(|hit| match MemoryItem::from_fields(&hit.item.metadata) {
            Ok(item) => Some((item, hit.score)),
            Err(e) => {
                log::debug!("Skipping undecodable item {}: {}", hit.item.id, e);
                None
            }
        })
        .filter(|(item, _)| query.kind.map_or(true, |kind| item.kind() == kind))
        .filter(|(item, _)| match query.since {
            Some(since) => item.timestamp.map_or(false, |ts| ts >= since),
            None => true,
        })
        .filter_map(|(item, raw)| {
            let matched = context_matches(item.context(), query.current_context);
            if query.restrict_to_context && !matched {
                return None;
            }
            let boost = if matched { CONTEXT_BOOST } else { 1.0 };
            let adjusted = raw * weight_at(item.timestamp, query.now) * boost;
            Some(SearchResult {
                item,
                score: raw,
                adjusted_score: adjusted,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.adjusted_score
            .partial_cmp(&a.adjusted_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(query.limit);
    ranked
}

/// Query side of the memory layer
pub struct MemorySearch {
    gateway: Arc<dyn EmbeddingGateway>,
    store: Arc<dyn VectorStore>,
    oversample: usize,
}

impl MemorySearch {
    pub fn new(
        gateway: Arc<dyn EmbeddingGateway>,
        store: Arc<dyn VectorStore>,
        oversample: usize,
    ) -> Self {
        Self {
            gateway,
            store,
            oversample: oversample.max(crate::config::MIN_OVERSAMPLE_FACTOR),
        }
    }

    /// Search every kind of memory
    pub async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<SearchOutcome<SearchResult>> {
        let ranked = self
            .ranked(
                query,
                &RankQuery {
                    limit: options.limit,
                    kind: options.kind,
                    since: options.since,
                    current_context: None,
                    restrict_to_context: false,
                    now: Utc::now(),
                },
            )
            .await?;

        Ok(match ranked {
            Some(results) => SearchOutcome::found(results),
            None => SearchOutcome::empty_index(),
        })
    }

    /// Search conversation exchanges, favouring the caller's project
    pub async fn search_conversations(
        &self,
        query: &str,
        options: &ConversationSearchOptions,
    ) -> Result<SearchOutcome<ExchangeResult>> {
        let ranked = self
            .ranked(
                query,
                &RankQuery {
                    limit: options.limit,
                    kind: Some(ItemKind::ConversationExchange),
                    since: None,
                    current_context: options.current_context.as_deref(),
                    restrict_to_context: options.project_only,
                    now: Utc::now(),
                },
            )
            .await?;
        let Some(ranked) = ranked else {
            return Ok(SearchOutcome::empty_index());
        };

        let results = ranked
            .into_iter()
            .filter_map(|result| {
                ConversationExchange::from_item(&result.item).map(|exchange| ExchangeResult {
                    exchange,
                    score: result.score,
                    adjusted_score: result.adjusted_score,
                })
            })
            .collect();
        Ok(SearchOutcome::found(results))
    }

    /// Oversampled nearest neighbours, reranked. `None` when the index is
    /// empty.
    ///
    /// Filtered queries (kind, since, project) can discard most of the
    /// candidate window. While that leaves fewer than `limit` results and
    /// the store still had more to give, the window is doubled, up to
    /// [`MAX_WIDENING`] times.
    async fn ranked(
        &self,
        query: &str,
        rank_query: &RankQuery<'_>,
    ) -> Result<Option<Vec<SearchResult>>> {
        let limit = rank_query.limit;
        if limit == 0 {
            return Ok(Some(Vec::new()));
        }
        if !self.store.is_index_created().await? {
            return Ok(None);
        }

        let vector = self.gateway.embed(query).await?;
        let filtered = rank_query.kind.is_some()
            || rank_query.since.is_some()
            || rank_query.restrict_to_context;

        let mut window = limit.saturating_mul(self.oversample);
        let mut rounds = 0;
        loop {
            let hits = self.store.query_items(&vector, window).await?;
            if hits.is_empty() && rounds == 0 && self.store.list_items().await?.is_empty() {
                return Ok(None);
            }

            let exhausted = hits.len() < window;
            let ranked = rank(hits, rank_query);
            if ranked.len() >= limit || exhausted || !filtered || rounds >= MAX_WIDENING {
                return Ok(Some(ranked));
            }

            rounds += 1;
            window = window.saturating_mul(2);
            log::debug!(
                "Widening candidate window to {} ({} of {} found)",
                window,
                ranked.len(),
                limit
            );
        }
    }
}
