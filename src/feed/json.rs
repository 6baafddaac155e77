//! JSON Feed (https://jsonfeed.org) documents.

use serde::Deserialize;
use serde_json::Value;

/// Version prefixes accepted as JSON Feed.
const VERSION_PREFIXES: [&str; 2] = ["https://jsonfeed.org/version/", "http://jsonfeed.org/version/"];

#[derive(Debug, Deserialize)]
pub(crate) struct JsonFeedDocument {
    pub title: Option<String>,
    pub home_page_url: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub items: Vec<Value>,
}

/// One item. Every field is optional; ids are sometimes numbers in the wild.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct JsonFeedItem {
    pub id: Option<Value>,
    pub url: Option<String>,
    pub external_url: Option<String>,
    pub title: Option<String>,
    pub content_html: Option<String>,
    pub content_text: Option<String>,
    pub summary: Option<String>,
    pub date_published: Option<String>,
    pub date_modified: Option<String>,
}

impl JsonFeedItem {
    pub fn source_id(&self) -> Option<String> {
        match self.id.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Returns true when `text` is a JSON object with a JSON Feed `version`.
pub(crate) fn is_json_feed(text: &str) -> bool {
    let trimmed = text.trim_start();
    if !trimmed.starts_with('{') {
        return false;
    }
    let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
        return false;
    };
    value
        .get("version")
        .and_then(Value::as_str)
        .is_some_and(|v| VERSION_PREFIXES.iter().any(|p| v.starts_with(p)))
}
