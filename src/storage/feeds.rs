use anyhow::Result;
use chrono::{DateTime, Utc};

use super::schema::Database;
use super::store::FeedStore;
use super::types::{to_timestamp, Article, Feed, FeedDbRow};

const FEED_COLUMNS: &str = "id, title, feed_url, site_url, favicon, folder_id, last_fetched_at";

impl FeedStore for Database {
    async fn get_all_feeds(&self) -> Result<Vec<Feed>> {
        let rows = sqlx::query_as::<_, FeedDbRow>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds ORDER BY title COLLATE NOCASE, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FeedDbRow::into_feed).collect())
    }

    async fn upsert_feed(&self, feed: &Feed) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO feeds (id, title, feed_url, site_url, favicon, folder_id, last_fetched_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                feed_url = excluded.feed_url,
                site_url = excluded.site_url,
                favicon = excluded.favicon
        "#,
        )
        .bind(&feed.id)
        .bind(&feed.title)
        .bind(&feed.feed_url)
        .bind(&feed.site_url)
        .bind(&feed.favicon)
        .bind(&feed.folder_id)
        .bind(feed.last_fetched_at.map(to_timestamp))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_article(&self, article: &Article) -> Result<bool> {
        self.insert_article_if_new(article).await
    }

    async fn update_feed_last_fetched(&self, feed_id: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE feeds SET last_fetched_at = ? WHERE id = ?")
            .bind(to_timestamp(at))
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    pub async fn get_feed(&self, feed_id: &str) -> Result<Option<Feed>> {
        let row = sqlx::query_as::<_, FeedDbRow>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?"
        ))
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(FeedDbRow::into_feed))
    }

    /// Moves a feed into a folder, or out of any folder with `None`.
    ///
    /// Returns `false` if the feed does not exist.
    pub async fn move_feed_to_folder(&self, feed_id: &str, folder_id: Option<&str>) -> Result<bool> {
        let result = sqlx::query("UPDATE feeds SET folder_id = ? WHERE id = ?")
            .bind(folder_id)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Unsubscribes from a feed. Its articles are removed by cascade.
    ///
    /// Returns `false` if the feed does not exist.
    pub async fn delete_feed(&self, feed_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM feeds WHERE id = ?")
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() > 0 {
            tracing::info!(feed_id = %feed_id, "Feed deleted");
        }
        Ok(result.rows_affected() > 0)
    }
}
