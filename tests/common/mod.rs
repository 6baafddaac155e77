//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::time::Duration;

use feedline::feed::FetchConfig;
use feedline::storage::Feed;
use feedline::worker::WorkerClient;

/// Fetch settings for talking to a local mock server.
pub fn local_fetch_config() -> FetchConfig {
    FetchConfig {
        retry_backoff: Duration::from_millis(5),
        request_timeout: Duration::from_secs(5),
        allow_private_networks: true,
        ..FetchConfig::default()
    }
}

pub fn local_worker() -> WorkerClient {
    WorkerClient::new(local_fetch_config())
}

/// An RSS 2.0 document with one item per slug, newest first.
pub fn rss_feed(title: &str, site: &str, slugs: &[&str]) -> String {
    let items: String = slugs
        .iter()
        .enumerate()
        .map(|(i, slug)| {
            format!(
                "<item><title>{slug}</title><link>{site}/{slug}</link>\
                 <guid>{site}/{slug}</guid>\
                 <pubDate>2024-01-{day:02}T10:00:00Z</pubDate>\
                 <description>&lt;p&gt;About {slug}&lt;/p&gt;</description></item>",
                day = 20 - i,
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0"?><rss version="2.0"><channel><title>{title}</title><link>{site}</link>{items}</channel></rss>"#
    )
}

pub fn feed(id: &str, title: &str, feed_url: &str) -> Feed {
    Feed {
        id: id.to_owned(),
        title: title.to_owned(),
        feed_url: feed_url.to_owned(),
        site_url: String::new(),
        favicon: None,
        folder_id: None,
        last_fetched_at: None,
    }
}
