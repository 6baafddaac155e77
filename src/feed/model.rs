use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Feed family recognized by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedFormat {
    JsonFeed,
    Atom,
    Rss,
    /// RSS 1.0 (RDF)
    Rdf,
}

impl fmt::Display for FeedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeedFormat::JsonFeed => "JSON Feed",
            FeedFormat::Atom => "Atom",
            FeedFormat::Rss => "RSS 2.0",
            FeedFormat::Rdf => "RSS 1.0 (RDF)",
        };
        f.write_str(name)
    }
}

/// Canonical output of one parse call. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedFeed {
    pub title: String,
    pub site_url: String,
    pub feed_url: String,
    pub favicon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub format: FeedFormat,
    /// Items, newest first by declared publish time.
    pub items: Vec<ParsedArticle>,
    /// Items dropped because they were malformed.
    #[serde(default)]
    pub skipped: usize,
    /// True when reading stopped early on damaged XML.
    #[serde(default)]
    pub truncated: bool,
}

/// One entry/item as produced by the normalizer.
///
/// `id` is the source identifier (guid, Atom id, JSON Feed id); the
/// persisted article id is derived from `url` later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedArticle {
    pub id: String,
    pub title: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    /// HTML content
    pub content: String,
    /// Plain text, at most 200 characters
    pub preview: String,
}
