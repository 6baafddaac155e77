use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::store::FeedStore;
use super::types::{Article, Feed};

#[derive(Debug, Default)]
struct State {
    /// Insertion order is the listing order.
    feeds: Vec<Feed>,
    articles: HashMap<String, Article>,
}

/// In-process [`FeedStore`].
///
/// Runs entirely on the calling task with no I/O, which makes it usable
/// under paused tokio time. Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn feed(&self, feed_id: &str) -> Option<Feed> {
        self.lock().feeds.iter().find(|f| f.id == feed_id).cloned()
    }

    pub fn article(&self, article_id: &str) -> Option<Article> {
        self.lock().articles.get(article_id).cloned()
    }

    pub fn article_count(&self) -> usize {
        self.lock().articles.len()
    }

    /// Articles of one feed, newest first.
    pub fn articles_for_feed(&self, feed_id: &str) -> Vec<Article> {
        let mut articles: Vec<_> = self
            .lock()
            .articles
            .values()
            .filter(|a| a.feed_id == feed_id)
            .cloned()
            .collect();
        articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        articles
    }

    pub fn mark_article_read(&self, article_id: &str, is_read: bool) -> bool {
        match self.lock().articles.get_mut(article_id) {
            Some(article) => {
                article.is_read = is_read;
                true
            }
            None => false,
        }
    }
}

impl FeedStore for MemoryStore {
    async fn get_all_feeds(&self) -> Result<Vec<Feed>> {
        Ok(self.lock().feeds.clone())
    }

    async fn upsert_feed(&self, feed: &Feed) -> Result<()> {
        let mut state = self.lock();
        match state.feeds.iter_mut().find(|f| f.id == feed.id) {
            Some(existing) => {
                existing.title.clone_from(&feed.title);
                existing.feed_url.clone_from(&feed.feed_url);
                existing.site_url.clone_from(&feed.site_url);
                existing.favicon.clone_from(&feed.favicon);
            }
            None => state.feeds.push(feed.clone()),
        }
        Ok(())
    }

    async fn upsert_article(&self, article: &Article) -> Result<bool> {
        let mut state = self.lock();
        if !state.feeds.iter().any(|f| f.id == article.feed_id) {
            bail!("unknown feed: {}", article.feed_id);
        }
        if state.articles.contains_key(&article.id) {
            return Ok(false);
        }
        state.articles.insert(article.id.clone(), article.clone());
        Ok(true)
    }

    async fn update_feed_last_fetched(&self, feed_id: &str, at: DateTime<Utc>) -> Result<()> {
        if let Some(feed) = self.lock().feeds.iter_mut().find(|f| f.id == feed_id) {
            feed.last_fetched_at = Some(at);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(id: &str) -> Feed {
        Feed {
            id: id.into(),
            title: id.to_uppercase(),
            feed_url: format!("https://{id}.example.com/feed"),
            site_url: format!("https://{id}.example.com"),
            favicon: None,
            folder_id: None,
            last_fetched_at: None,
        }
    }

    fn article(id: &str, feed_id: &str) -> Article {
        Article {
            id: id.into(),
            feed_id: feed_id.into(),
            title: id.into(),
            url: format!("https://example.com/{id}"),
            published_at: Utc::now(),
            preview: String::new(),
            content: String::new(),
            is_read: false,
            is_starred: false,
            is_deleted: false,
        }
    }

    #[tokio::test]
    async fn test_feeds_keep_insertion_order() {
        let store = MemoryStore::new();
        for id in ["c", "a", "b"] {
            store.upsert_feed(&feed(id)).await.unwrap();
        }
        let ids: Vec<_> = store
            .get_all_feeds()
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_article_insert_is_idempotent() {
        let store = MemoryStore::new();
        store.upsert_feed(&feed("a")).await.unwrap();

        assert!(store.upsert_article(&article("x", "a")).await.unwrap());
        store.mark_article_read("x", true);
        assert!(!store.upsert_article(&article("x", "a")).await.unwrap());

        assert_eq!(store.article_count(), 1);
        assert!(store.article("x").unwrap().is_read);
    }

    #[tokio::test]
    async fn test_article_for_unknown_feed_rejected() {
        let store = MemoryStore::new();
        assert!(store.upsert_article(&article("x", "missing")).await.is_err());
    }
}
