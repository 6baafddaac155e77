use anyhow::Result;

use crate::feed::ParsedArticle;
use crate::identity::derive_id;
use crate::storage::{Article, FeedStore};

/// Builds the stored form of a parsed item.
///
/// The id is derived from the article URL, falling back to the source id for
/// items without one. New articles start unread, unstarred and visible.
pub fn to_article(feed_id: &str, parsed: &ParsedArticle) -> Article {
    let key = if parsed.url.is_empty() {
        &parsed.id
    } else {
        &parsed.url
    };

    Article {
        id: derive_id(key),
        feed_id: feed_id.to_owned(),
        title: parsed.title.clone(),
        url: parsed.url.clone(),
        published_at: parsed.published_at,
        preview: parsed.preview.clone(),
        content: parsed.content.clone(),
        is_read: false,
        is_starred: false,
        is_deleted: false,
    }
}

/// Inserts every article not yet stored and returns how many were new.
///
/// Already stored articles are skipped untouched, so merging the same items
/// twice reports zero the second time.
pub async fn merge_articles<S: FeedStore>(
    store: &S,
    feed_id: &str,
    articles: &[ParsedArticle],
) -> Result<usize> {
    let mut inserted = 0;
    for parsed in articles {
        if store.upsert_article(&to_article(feed_id, parsed)).await? {
            inserted += 1;
        }
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Feed, MemoryStore};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn parsed(id: &str, url: &str) -> ParsedArticle {
        ParsedArticle {
            id: id.into(),
            title: format!("Title {id}"),
            url: url.into(),
            published_at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            content: "<p>Body</p>".into(),
            preview: "Body".into(),
        }
    }

    async fn store_with_feed() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .upsert_feed(&Feed {
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
        store
    }

    #[test]
    fn test_id_from_url_then_source_id() {
        let a = to_article("f", &parsed("guid-1", "https://example.com/posts/1"));
        assert_eq!(a.id, "example-com-posts-1");
        assert!(!a.is_read && !a.is_starred && !a.is_deleted);

        let b = to_article("f", &parsed("urn:uuid:1234", ""));
        assert_eq!(b.id, derive_id("urn:uuid:1234"));
    }

    #[tokio::test]
    async fn test_merge_twice_reports_zero_second_time() {
        let store = store_with_feed().await;
        let items = vec![
            parsed("1", "https://example.com/1"),
            parsed("2", "https://example.com/2"),
            parsed("3", "https://example.com/3"),
        ];

        assert_eq!(merge_articles(&store, "example-com-feed", &items).await.unwrap(), 3);
        assert_eq!(merge_articles(&store, "example-com-feed", &items).await.unwrap(), 0);
        assert_eq!(store.article_count(), 3);
    }

    #[tokio::test]
    async fn test_merge_preserves_read_state() {
        let store = store_with_feed().await;
        let items = vec![parsed("1", "https://example.com/1")];
        merge_articles(&store, "example-com-feed", &items).await.unwrap();
        store.mark_article_read("example-com-1", true);

        let mut changed = items.clone();
        changed[0].title = "Edited upstream".into();
        merge_articles(&store, "example-com-feed", &changed).await.unwrap();

        let stored = store.article("example-com-1").unwrap();
        assert!(stored.is_read);
        assert_eq!(stored.title, "Title 1");
    }
}
