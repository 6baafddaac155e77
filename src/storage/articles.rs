use anyhow::Result;

use super::schema::Database;
use super::types::{to_timestamp, Article, ArticleDbRow};

/// Maximum number of articles to return from any single query (OOM protection)
const MAX_ARTICLES: i64 = 2000;

impl Database {
    // ========================================================================
    // Article Operations
    // ========================================================================

    /// `INSERT OR IGNORE` keyed on the article id.
    ///
    /// An existing row is never touched, so read/starred state survives
    /// every later refresh. Returns whether a row was inserted.
    pub(crate) async fn insert_article_if_new(&self, article: &Article) -> Result<bool> {
        let now = chrono::Utc::now();
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO articles
                (id, feed_id, title, url, published_at, preview, content,
                 is_read, is_starred, is_deleted, fetched_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(&article.id)
        .bind(&article.feed_id)
        .bind(&article.title)
        .bind(&article.url)
        .bind(to_timestamp(article.published_at))
        .bind(&article.preview)
        .bind(&article.content)
        .bind(article.is_read)
        .bind(article.is_starred)
        .bind(article.is_deleted)
        .bind(to_timestamp(now))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Article Queries
    // ========================================================================

    /// Articles for a feed, newest first, excluding soft-deleted ones.
    ///
    /// `limit` defaults to 500 and is capped at 2000.
    pub async fn get_articles_for_feed(&self, feed_id: &str, limit: Option<i64>) -> Result<Vec<Article>> {
        let limit = limit.unwrap_or(500).min(MAX_ARTICLES);

        let rows = sqlx::query_as::<_, ArticleDbRow>(
            r#"
            SELECT id, feed_id, title, url, published_at, preview, content,
                   is_read, is_starred, is_deleted
            FROM articles
            WHERE feed_id = ? AND is_deleted = 0
            ORDER BY published_at DESC, fetched_at DESC
            LIMIT ?
        "#,
        )
        .bind(feed_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ArticleDbRow::into_article).collect())
    }

    pub async fn get_article(&self, article_id: &str) -> Result<Option<Article>> {
        let row = sqlx::query_as::<_, ArticleDbRow>(
            r#"
            SELECT id, feed_id, title, url, published_at, preview, content,
                   is_read, is_starred, is_deleted
            FROM articles
            WHERE id = ?
        "#,
        )
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ArticleDbRow::into_article))
    }

    /// Number of stored articles, including soft-deleted ones, optionally
    /// for one feed.
    pub async fn count_articles(&self, feed_id: Option<&str>) -> Result<i64> {
        let (count,): (i64,) = match feed_id {
            Some(feed_id) => {
                sqlx::query_as("SELECT COUNT(*) FROM articles WHERE feed_id = ?")
                    .bind(feed_id)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as("SELECT COUNT(*) FROM articles")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count)
    }

    /// Returns `false` if the article does not exist.
    pub async fn mark_article_read(&self, article_id: &str, is_read: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE articles SET is_read = ? WHERE id = ?")
            .bind(is_read)
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Flips the starred flag and returns the new value, or `None` if the
    /// article does not exist.
    pub async fn toggle_article_starred(&self, article_id: &str) -> Result<Option<bool>> {
        let starred: Option<(bool,)> = sqlx::query_as(
            "UPDATE articles SET is_starred = NOT is_starred WHERE id = ? RETURNING is_starred",
        )
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(starred.map(|(s,)| s))
    }

    /// Hides an article without removing its row, so a later refresh that
    /// sees the same URL does not bring it back.
    pub async fn soft_delete_article(&self, article_id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE articles SET is_deleted = 1 WHERE id = ?")
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Feed, FeedStore};
    use chrono::{DateTime, Utc};
    use pretty_assertions::assert_eq;

    async fn setup_db_with_feed() -> Database {
        let db = Database::open(":memory:").await.unwrap();
        db.upsert_feed(&Feed {
            id: "example-com-feed".into(),
            title: "Example".into(),
            feed_url: "https://example.com/feed".into(),
            site_url: "https://example.com".into(),
            favicon: None,
            folder_id: None,
            last_fetched_at: None,
        })
        .await
        .unwrap();
        db
    }

    fn article(id: &str, published_secs: i64) -> Article {
        Article {
            id: id.into(),
            feed_id: "example-com-feed".into(),
            title: format!("Title {id}"),
            url: format!("https://example.com/{id}"),
            published_at: DateTime::<Utc>::from_timestamp(published_secs, 0).unwrap(),
            preview: "preview".into(),
            content: "<p>content</p>".into(),
            is_read: false,
            is_starred: false,
            is_deleted: false,
        }
    }

    #[tokio::test]
    async fn test_insert_is_idempotent_and_preserves_state() {
        let db = setup_db_with_feed().await;
        let first = article("a", 100);

        assert!(db.upsert_article(&first).await.unwrap());
        assert!(db.mark_article_read("a", true).await.unwrap());

        let mut changed = first.clone();
        changed.title = "Rewritten".into();
        assert!(!db.upsert_article(&changed).await.unwrap());

        let stored = db.get_article("a").await.unwrap().unwrap();
        assert_eq!(stored.title, "Title a");
        assert!(stored.is_read);
        assert_eq!(db.count_articles(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_articles_newest_first_without_deleted() {
        let db = setup_db_with_feed().await;
        for (id, ts) in [("old", 100), ("new", 300), ("mid", 200)] {
            db.upsert_article(&article(id, ts)).await.unwrap();
        }
        db.soft_delete_article("mid").await.unwrap();

        let ids: Vec<_> = db
            .get_articles_for_feed("example-com-feed", None)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert_eq!(db.count_articles(Some("example-com-feed")).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_soft_deleted_article_not_resurrected() {
        let db = setup_db_with_feed().await;
        db.upsert_article(&article("a", 100)).await.unwrap();
        db.soft_delete_article("a").await.unwrap();

        assert!(!db.upsert_article(&article("a", 100)).await.unwrap());
        assert!(db.get_article("a").await.unwrap().unwrap().is_deleted);
    }

    #[tokio::test]
    async fn test_toggle_starred() {
        let db = setup_db_with_feed().await;
        db.upsert_article(&article("a", 100)).await.unwrap();

        assert_eq!(db.toggle_article_starred("a").await.unwrap(), Some(true));
        assert_eq!(db.toggle_article_starred("a").await.unwrap(), Some(false));
        assert_eq!(db.toggle_article_starred("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_feed_cascades() {
        let db = setup_db_with_feed().await;
        db.upsert_article(&article("a", 100)).await.unwrap();
        db.upsert_article(&article("b", 200)).await.unwrap();

        assert!(db.delete_feed("example-com-feed").await.unwrap());
        assert_eq!(db.count_articles(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_article_for_unknown_feed_rejected() {
        let db = Database::open(":memory:").await.unwrap();
        assert!(db.upsert_article(&article("a", 100)).await.is_err());
    }
}
