use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock
    #[error("Another instance of feedline appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) messages.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Row Types
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedDbRow {
    pub id: String,
    pub title: String,
    pub feed_url: String,
    pub site_url: String,
    pub favicon: Option<String>,
    pub folder_id: Option<String>,
    pub last_fetched_at: Option<i64>,
}

impl FeedDbRow {
    pub(crate) fn into_feed(self) -> Feed {
        Feed {
            id: self.id,
            title: self.title,
            feed_url: self.feed_url,
            site_url: self.site_url,
            favicon: self.favicon,
            folder_id: self.folder_id,
            last_fetched_at: self.last_fetched_at.and_then(from_timestamp),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ArticleDbRow {
    pub id: String,
    pub feed_id: String,
    pub title: String,
    pub url: String,
    pub published_at: i64,
    pub preview: String,
    pub content: String,
    pub is_read: bool,
    pub is_starred: bool,
    pub is_deleted: bool,
}

impl ArticleDbRow {
    pub(crate) fn into_article(self) -> Article {
        Article {
            id: self.id,
            feed_id: self.feed_id,
            title: self.title,
            url: self.url,
            published_at: from_timestamp(self.published_at).unwrap_or_default(),
            preview: self.preview,
            content: self.content,
            is_read: self.is_read,
            is_starred: self.is_starred,
            is_deleted: self.is_deleted,
        }
    }
}

/// Timestamps are stored as Unix milliseconds.
pub(crate) fn to_timestamp(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_timestamp(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

// ============================================================================
// Data Structures
// ============================================================================

/// A subscribed feed.
///
/// `id` is derived from `feed_url`, so re-subscribing the same URL lands on
/// the same row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feed {
    pub id: String,
    pub title: String,
    pub feed_url: String,
    pub site_url: String,
    pub favicon: Option<String>,
    pub folder_id: Option<String>,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

/// A stored article.
///
/// Created once and never overwritten by later refreshes, which keeps the
/// user-set `is_read` / `is_starred` state. Deletion is soft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub feed_id: String,
    pub title: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub preview: String,
    pub content: String,
    pub is_read: bool,
    pub is_starred: bool,
    pub is_deleted: bool,
}
