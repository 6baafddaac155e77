use anyhow::Result;
use chrono::{DateTime, Utc};
use std::future::Future;

use super::types::{Article, Feed};

/// Persistence operations the refresh pipeline depends on.
///
/// Implemented by [`Database`](super::Database) (SQLite) and
/// [`MemoryStore`](super::MemoryStore). Implementations must be safe to call
/// from several tasks at once.
pub trait FeedStore: Send + Sync + 'static {
    /// All subscribed feeds, in a stable order.
    fn get_all_feeds(&self) -> impl Future<Output = Result<Vec<Feed>>> + Send;

    /// Inserts or updates a feed by id.
    ///
    /// An existing feed keeps its `folder_id` and `last_fetched_at`; title,
    /// site URL and favicon are replaced.
    fn upsert_feed(&self, feed: &Feed) -> impl Future<Output = Result<()>> + Send;

    /// Inserts an article if its id is unknown.
    ///
    /// Returns `true` when a row was inserted, `false` when the id already
    /// existed (the stored row is left untouched).
    fn upsert_article(&self, article: &Article) -> impl Future<Output = Result<bool>> + Send;

    fn update_feed_last_fetched(
        &self,
        feed_id: &str,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send;
}
