//! Format normalizer: RSS 2.0, Atom, JSON Feed and RDF into [`ParsedFeed`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;
use url::Url;

use super::json::{is_json_feed, JsonFeedDocument, JsonFeedItem};
use super::model::{FeedFormat, ParsedArticle, ParsedFeed};
use super::xml::{read_document, Element};
use crate::identity::generate_guid;
use crate::util::{decode_entities, make_preview, origin_of, resolve_url, strip_control_chars};

/// Lowercased, since detection runs on a lowercased copy of the document.
const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/atom";
const RDF_NAMESPACE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";

pub const DEFAULT_FEED_TITLE: &str = "Untitled Feed";
pub const DEFAULT_ARTICLE_TITLE: &str = "Untitled";

/// Errors returned by [`parse`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    /// No feed marker was found (an HTML page, plain text, ...).
    #[error("Unknown feed format")]
    UnknownFormat,
    /// The family was recognized but the document could not be read.
    #[error("Failed to parse {format} document: {reason}")]
    Malformed { format: FeedFormat, reason: String },
}

fn malformed(format: FeedFormat, reason: impl Into<String>) -> NormalizeError {
    NormalizeError::Malformed {
        format,
        reason: reason.into(),
    }
}

/// Detects the feed family of a document. First match wins: JSON Feed,
/// Atom, RSS 2.0, then RDF.
pub fn detect_format(raw: &str) -> Option<FeedFormat> {
    let text = raw.trim_start_matches('\u{feff}').trim_start();

    if is_json_feed(text) {
        return Some(FeedFormat::JsonFeed);
    }

    let lower = text.to_ascii_lowercase();
    let root = root_element_name(&lower);

    if lower.contains(ATOM_NAMESPACE) && root.is_some_and(|name| local(name) == "feed") {
        return Some(FeedFormat::Atom);
    }
    if root == Some("rss")
        || lower.contains("<rss ")
        || lower.contains("<rss>")
        || lower.contains("<channel>")
    {
        return Some(FeedFormat::Rss);
    }
    if lower.contains(RDF_NAMESPACE) {
        return Some(FeedFormat::Rdf);
    }
    None
}

/// Name of the first element in a document, skipping declarations,
/// processing instructions and comments.
fn root_element_name(lower: &str) -> Option<&str> {
    let mut rest = lower;
    loop {
        let start = rest.find('<')?;
        rest = &rest[start + 1..];
        match rest.chars().next()? {
            '?' | '!' => continue,
            _ => {
                let end = rest
                    .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
                    .unwrap_or(rest.len());
                return Some(&rest[..end]);
            }
        }
    }
}

fn local(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, l)| l).unwrap_or(name)
}

/// Parses a feed document into the canonical model.
///
/// `source_url` is the address the document was fetched from; it becomes
/// `feed_url` and supplies the site URL when the document declares none.
///
/// Damaged items never fail the whole parse: unusable items are skipped and
/// counted in [`ParsedFeed::skipped`], and XML damage keeps every item read
/// before it. Items are returned newest first.
///
/// # Errors
///
/// - [`NormalizeError::UnknownFormat`] when no feed family is recognized
/// - [`NormalizeError::Malformed`] when the document root cannot be read
pub fn parse(raw: &str, source_url: &str) -> Result<ParsedFeed, NormalizeError> {
    let text = raw.trim_start_matches('\u{feff}');
    let format = detect_format(text).ok_or(NormalizeError::UnknownFormat)?;
    let now = Utc::now();

    let mut feed = match format {
        FeedFormat::JsonFeed => parse_json_feed(text, source_url, now)?,
        FeedFormat::Atom => parse_atom(text, source_url, now)?,
        FeedFormat::Rss | FeedFormat::Rdf => parse_rss(text, format, source_url, now)?,
    };

    // Stable, so items sharing a timestamp keep document order
    feed.items.sort_by(|a, b| b.published_at.cmp(&a.published_at));

    if feed.truncated {
        tracing::warn!(
            feed = %source_url,
            items = feed.items.len(),
            "Feed document damaged, kept items read before the damage"
        );
    }
    if feed.skipped > 0 {
        tracing::warn!(
            feed = %source_url,
            skipped = feed.skipped,
            "Skipped malformed feed items"
        );
    }
    tracing::debug!(
        feed = %source_url,
        format = %format,
        items = feed.items.len(),
        "Parsed feed"
    );

    Ok(feed)
}

/// Per-item fields as found in the document, before normalization.
#[derive(Debug, Default)]
struct ItemFields {
    source_id: Option<String>,
    title: Option<String>,
    link: Option<String>,
    content: Option<String>,
    date: Option<String>,
}

impl ItemFields {
    fn is_empty(&self) -> bool {
        self.source_id.is_none() && self.title.is_none() && self.link.is_none() && self.content.is_none()
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == s.len() {
        Some(s)
    } else {
        Some(trimmed.to_owned())
    }
}

fn clean_text(s: Option<&str>) -> Option<String> {
    s.and_then(|s| non_empty(strip_control_chars(s).into_owned()))
}

fn is_absolute_http(s: &str) -> bool {
    Url::parse(s).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}

fn build_article(fields: ItemFields, site_url: &str, now: DateTime<Utc>) -> ParsedArticle {
    let title = clean_text(fields.title.as_deref()).unwrap_or_else(|| DEFAULT_ARTICLE_TITLE.to_owned());
    let url = fields
        .link
        .as_deref()
        .map(|link| resolve_url(link, site_url))
        .unwrap_or_default();
    let id = generate_guid(
        fields.source_id.as_deref(),
        fields.link.as_deref(),
        &title,
        fields.date.as_deref(),
    );
    let published_at = fields.date.as_deref().and_then(parse_date).unwrap_or(now);
    let content = fields.content.unwrap_or_default();
    let preview = make_preview(&content);

    ParsedArticle {
        id,
        title,
        url,
        published_at,
        content,
        preview,
    }
}

fn site_url_or_origin(declared: Option<String>, source_url: &str) -> String {
    match declared.and_then(non_empty) {
        Some(site) => resolve_url(&site, source_url),
        None => origin_of(source_url).unwrap_or_else(|| source_url.to_owned()),
    }
}

/// Favicon service URL for a site's host. No network access.
pub fn favicon_for(site_url: &str) -> Option<String> {
    let url = Url::parse(site_url).ok()?;
    let host = url.host_str()?;
    Some(format!("https://www.google.com/s2/favicons?domain={host}&sz=64"))
}

/// Parses a publish date: RFC 3339, RFC 2822, then a few lenient forms
/// seen in real feeds. Naive timestamps are taken as UTC.
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s).or_else(|_| DateTime::parse_from_rfc2822(s)) {
        return Some(dt.with_timezone(&Utc));
    }

    // ISO-8601 without seconds, with offset
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M%:z") {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// `href` of the preferred `<link>` child: `rel="alternate"` (or no rel),
/// then any link other than `self`, then `self` when `allow_self`.
fn link_href(el: &Element, allow_self: bool) -> Option<String> {
    let href = |l: &Element| {
        l.attr("href")
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_owned)
    };

    el.children_local("link")
        .filter(|l| matches!(l.attr("rel"), None | Some("alternate")))
        .find_map(href)
        .or_else(|| {
            el.children_local("link")
                .filter(|l| l.attr("rel") != Some("self"))
                .find_map(href)
        })
        .or_else(|| {
            if allow_self {
                el.children_local("link").find_map(href)
            } else {
                None
            }
        })
}

fn child_text(el: &Element, name: &str) -> Option<String> {
    el.child(name).map(Element::text).and_then(non_empty)
}

fn child_html(el: &Element, name: &str) -> Option<String> {
    el.child(name).map(Element::inner_html).and_then(non_empty)
}

fn first_child_text(el: &Element, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| child_text(el, name))
}

// ---------------------------------------------------------------------------
// RSS 2.0 / RDF
// ---------------------------------------------------------------------------

fn parse_rss(
    text: &str,
    format: FeedFormat,
    source_url: &str,
    now: DateTime<Utc>,
) -> Result<ParsedFeed, NormalizeError> {
    let doc = read_document(text);
    let root = doc.root().ok_or_else(|| malformed(format, "no root element"))?;

    let channel = if root.local_name() == "channel" {
        Some(root)
    } else {
        root.find_local("channel")
    };

    let declared_site = channel.and_then(|c| child_text(c, "link").or_else(|| link_href(c, false)));
    let site_url = site_url_or_origin(declared_site, source_url);

    let title = channel
        .and_then(|c| clean_text(child_text(c, "title").as_deref()))
        .unwrap_or_else(|| DEFAULT_FEED_TITLE.to_owned());
    let description = channel.and_then(|c| clean_text(child_text(c, "description").as_deref()));

    let mut elements = Vec::new();
    root.collect_local("item", &mut elements);

    let mut skipped = 0;
    let mut items = Vec::with_capacity(elements.len());
    for element in elements {
        let fields = rss_item(element);
        if fields.is_empty() {
            skipped += 1;
            continue;
        }
        items.push(build_article(fields, &site_url, now));
    }

    Ok(ParsedFeed {
        title,
        favicon: favicon_for(&site_url),
        site_url,
        feed_url: source_url.to_owned(),
        description,
        format,
        items,
        skipped,
        truncated: doc.truncated,
    })
}

fn rss_item(item: &Element) -> ItemFields {
    // RDF items carry their identity in rdf:about
    let guid = child_text(item, "guid").or_else(|| item.attr("rdf:about").map(str::to_owned));

    let link = child_text(item, "link")
        .or_else(|| link_href(item, true))
        .or_else(|| guid.clone().filter(|g| is_absolute_http(g)));

    let content = child_html(item, "content:encoded").or_else(|| child_html(item, "description"));

    ItemFields {
        source_id: guid,
        title: child_text(item, "title"),
        link,
        content,
        date: first_child_text(item, &["pubdate", "dc:date", "published", "updated"]),
    }
}

// ---------------------------------------------------------------------------
// Atom
// ---------------------------------------------------------------------------

fn parse_atom(text: &str, source_url: &str, now: DateTime<Utc>) -> Result<ParsedFeed, NormalizeError> {
    let doc = read_document(text);
    let root = doc
        .root()
        .filter(|r| r.local_name() == "feed")
        .ok_or_else(|| malformed(FeedFormat::Atom, "missing <feed> root"))?;

    let site_url = site_url_or_origin(link_href(root, false), source_url);
    let title = clean_text(local_child_text(root, "title").as_deref())
        .unwrap_or_else(|| DEFAULT_FEED_TITLE.to_owned());
    let description = clean_text(local_child_text(root, "subtitle").as_deref());

    let mut skipped = 0;
    let mut items = Vec::new();
    for entry in root.children_local("entry") {
        let fields = atom_entry(entry);
        if fields.is_empty() {
            skipped += 1;
            continue;
        }
        items.push(build_article(fields, &site_url, now));
    }

    Ok(ParsedFeed {
        title,
        favicon: favicon_for(&site_url),
        site_url,
        feed_url: source_url.to_owned(),
        description,
        format: FeedFormat::Atom,
        items,
        skipped,
        truncated: doc.truncated,
    })
}

fn local_child_text(el: &Element, name: &str) -> Option<String> {
    el.children_local(name).next().map(Element::text).and_then(non_empty)
}

fn local_child_html(el: &Element, name: &str) -> Option<String> {
    el.children_local(name).next().map(Element::inner_html).and_then(non_empty)
}

fn atom_entry(entry: &Element) -> ItemFields {
    let date = ["published", "updated", "issued", "modified"]
        .iter()
        .find_map(|name| local_child_text(entry, name));

    ItemFields {
        source_id: local_child_text(entry, "id"),
        title: local_child_text(entry, "title"),
        link: link_href(entry, true),
        content: local_child_html(entry, "content").or_else(|| local_child_html(entry, "summary")),
        date,
    }
}

// ---------------------------------------------------------------------------
// JSON Feed
// ---------------------------------------------------------------------------

fn parse_json_feed(text: &str, source_url: &str, now: DateTime<Utc>) -> Result<ParsedFeed, NormalizeError> {
    let doc: JsonFeedDocument =
        serde_json::from_str(text.trim()).map_err(|e| malformed(FeedFormat::JsonFeed, e.to_string()))?;

    let site_url = site_url_or_origin(doc.home_page_url, source_url);
    let title = clean_text(doc.title.as_deref().map(decode_entities).as_deref())
        .unwrap_or_else(|| DEFAULT_FEED_TITLE.to_owned());
    let description = clean_text(doc.description.as_deref().map(decode_entities).as_deref());

    let mut skipped = 0;
    let mut items = Vec::with_capacity(doc.items.len());
    for value in doc.items {
        match serde_json::from_value::<JsonFeedItem>(value) {
            Ok(item) => items.push(build_article(json_item(item), &site_url, now)),
            Err(e) => {
                tracing::debug!(feed = %source_url, error = %e, "Skipping malformed JSON Feed item");
                skipped += 1;
            }
        }
    }

    Ok(ParsedFeed {
        title,
        favicon: favicon_for(&site_url),
        site_url,
        feed_url: source_url.to_owned(),
        description,
        format: FeedFormat::JsonFeed,
        items,
        skipped,
        truncated: false,
    })
}

fn json_item(item: JsonFeedItem) -> ItemFields {
    let source_id = item.source_id().and_then(non_empty);
    let link = item
        .url
        .and_then(non_empty)
        .or_else(|| item.external_url.and_then(non_empty))
        .or_else(|| source_id.clone().filter(|id| is_absolute_http(id)));
    let content = item
        .content_html
        .and_then(non_empty)
        .or_else(|| item.content_text.and_then(non_empty))
        .or_else(|| item.summary.and_then(non_empty));

    ItemFields {
        source_id,
        title: item.title.map(|t| decode_entities(&t).into_owned()),
        link,
        content,
        date: item.date_published.or(item.date_modified),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_detection_order() {
        assert_eq!(
            detect_format(r#"{"version":"https://jsonfeed.org/version/1.1","items":[]}"#),
            Some(FeedFormat::JsonFeed)
        );
        assert_eq!(
            detect_format(r#"<?xml version="1.0"?><feed xmlns="http://www.w3.org/2005/Atom"></feed>"#),
            Some(FeedFormat::Atom)
        );
        assert_eq!(
            detect_format(r#"<rss version="2.0"><channel></channel></rss>"#),
            Some(FeedFormat::Rss)
        );
        assert_eq!(
            detect_format(r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"></rdf:RDF>"#),
            Some(FeedFormat::Rdf)
        );
        assert_eq!(detect_format("<html><body>hi</body></html>"), None);
        assert_eq!(detect_format(r#"{"name": "not a feed"}"#), None);
    }

    #[test]
    fn test_rss_declaring_atom_namespace_is_still_rss() {
        let rss = r#"<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom"
            xmlns:feedburner="http://rssnamespace.org/feedburner/ext/1.0">
            <channel><atom:link rel="self" href="https://example.com/feed"/>
            <feedburner:info uri="example"/></channel></rss>"#;
        assert_eq!(detect_format(rss), Some(FeedFormat::Rss));
    }

    #[test]
    fn test_bom_is_ignored() {
        assert_eq!(
            detect_format("\u{feff}<?xml version=\"1.0\"?><rss><channel></channel></rss>"),
            Some(FeedFormat::Rss)
        );
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let result = parse("<!DOCTYPE html><html><head></head></html>", "https://example.com");
        assert_eq!(result, Err(NormalizeError::UnknownFormat));
    }

    #[test]
    fn test_recognized_but_unreadable_json_is_malformed() {
        let result = parse(
            r#"{"version":"https://jsonfeed.org/version/1","items":"nope"}"#,
            "https://example.com/feed.json",
        );
        assert!(matches!(
            result,
            Err(NormalizeError::Malformed {
                format: FeedFormat::JsonFeed,
                ..
            })
        ));
    }

    #[test]
    fn test_entities_decoded_in_titles() {
        let rss = r#"<rss version="2.0"><channel>
            <title>Tom &amp; Jerry&apos;s Blog</title>
            <item><title>Caf&#233; &#x26; More</title><link>https://example.com/a</link></item>
            </channel></rss>"#;
        let feed = parse(rss, "https://example.com/feed").unwrap();
        assert_eq!(feed.title, "Tom & Jerry's Blog");
        assert_eq!(feed.items[0].title, "Café & More");
    }

    #[test]
    fn test_missing_titles_get_defaults() {
        let rss = r#"<rss><channel><item><link>https://example.com/x</link></item></channel></rss>"#;
        let feed = parse(rss, "https://example.com/feed").unwrap();
        assert_eq!(feed.title, DEFAULT_FEED_TITLE);
        assert_eq!(feed.items[0].title, DEFAULT_ARTICLE_TITLE);
    }

    #[test]
    fn test_control_characters_stripped_from_titles() {
        let rss = "<rss><channel><title>Evil\x1b[31m Feed</title>\
            <item><title>Bad\x07 Post</title><link>https://example.com/x</link></item></channel></rss>";
        let feed = parse(rss, "https://example.com/feed").unwrap();
        assert!(!feed.title.contains('\x1b'));
        assert!(!feed.items[0].title.contains('\x07'));
    }

    #[test]
    fn test_relative_links_resolved_against_site() {
        let rss = r#"<rss><channel><link>https://example.com/blog/</link>
            <item><title>A</title><link>posts/a.html</link></item></channel></rss>"#;
        let feed = parse(rss, "https://feeds.example.com/rss").unwrap();
        assert_eq!(feed.items[0].url, "https://example.com/blog/posts/a.html");
    }

    #[test]
    fn test_site_url_falls_back_to_source_origin() {
        let rss = r#"<rss><channel><title>T</title></channel></rss>"#;
        let feed = parse(rss, "https://example.com/path/feed.xml").unwrap();
        assert_eq!(feed.site_url, "https://example.com");
        assert_eq!(
            feed.favicon.as_deref(),
            Some("https://www.google.com/s2/favicons?domain=example.com&sz=64")
        );
    }

    #[test]
    fn test_guid_used_as_link_only_when_absolute() {
        let rss = r#"<rss><channel>
            <item><title>A</title><guid>https://example.com/a</guid></item>
            <item><title>B</title><guid isPermaLink="false">b-123</guid></item>
            </channel></rss>"#;
        let feed = parse(rss, "https://example.com/feed").unwrap();
        let a = feed.items.iter().find(|i| i.title == "A").unwrap();
        let b = feed.items.iter().find(|i| i.title == "B").unwrap();
        assert_eq!(a.url, "https://example.com/a");
        assert_eq!(b.url, "");
        assert_eq!(b.id, "b-123");
    }

    #[test]
    fn test_items_sorted_newest_first() {
        let rss = r#"<rss><channel>
            <item><title>Old</title><link>https://e.com/1</link><pubDate>Mon, 01 Jan 2024 10:00:00 GMT</pubDate></item>
            <item><title>New</title><link>https://e.com/3</link><pubDate>Wed, 03 Jan 2024 10:00:00 GMT</pubDate></item>
            <item><title>Mid</title><link>https://e.com/2</link><pubDate>Tue, 02 Jan 2024 10:00:00 GMT</pubDate></item>
            </channel></rss>"#;
        let feed = parse(rss, "https://e.com/feed").unwrap();
        let titles: Vec<_> = feed.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["New", "Mid", "Old"]);
    }

    #[test]
    fn test_empty_items_are_skipped_and_counted() {
        let rss = r#"<rss><channel>
            <item></item>
            <item><title>Real</title><link>https://e.com/1</link></item>
            </channel></rss>"#;
        let feed = parse(rss, "https://e.com/feed").unwrap();
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.skipped, 1);
        assert!(!feed.truncated);
    }

    #[test]
    fn test_damaged_xml_keeps_earlier_items() {
        let rss = r#"<rss><channel><title>Broken</title>
            <item><title>First</title><link>https://e.com/1</link></item>
            <item><title>Second</title><link>https://e.com/2</link></item>
            <item><title attr="unterminated>Third</title></item>
            </channel></rss>"#;
        let feed = parse(rss, "https://e.com/feed").unwrap();
        assert_eq!(feed.title, "Broken");
        assert!(feed.items.iter().any(|i| i.title == "First"));
        assert!(feed.items.iter().any(|i| i.title == "Second"));
        assert!(feed.truncated);
    }

    #[test]
    fn test_atom_xhtml_content_and_alternate_link() {
        let atom = r#"<feed xmlns="http://www.w3.org/2005/Atom">
            <title>Atom</title>
            <link rel="self" href="https://example.com/atom.xml"/>
            <link rel="alternate" href="https://example.com/"/>
            <entry>
              <id>urn:1</id><title>E</title>
              <link rel="edit" href="https://example.com/edit/1"/>
              <link rel="alternate" href="https://example.com/e1"/>
              <content type="xhtml"><div xmlns="http://www.w3.org/1999/xhtml"><p>Body</p></div></content>
              <updated>2024-01-01T00:00:00Z</updated>
            </entry>
            </feed>"#;
        let feed = parse(atom, "https://example.com/atom.xml").unwrap();
        assert_eq!(feed.site_url, "https://example.com/");
        let entry = &feed.items[0];
        assert_eq!(entry.url, "https://example.com/e1");
        assert_eq!(entry.content, "<div><p>Body</p></div>");
        assert_eq!(entry.preview, "Body");
        assert_eq!(entry.published_at, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_json_feed_skips_non_object_items() {
        let json = r#"{
            "version": "https://jsonfeed.org/version/1.1",
            "title": "J",
            "items": [
                "garbage",
                {"id": "1", "url": "https://example.com/1", "title": "One", "content_text": "Hello"},
                {"id": "2", "title": 5}
            ]
        }"#;
        let feed = parse(json, "https://example.com/feed.json").unwrap();
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.skipped, 2);
        assert_eq!(feed.items[0].preview, "Hello");
    }

    #[test]
    fn test_parse_date_variants() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(parse_date("2024-01-02T03:04:05Z"), Some(expected));
        assert_eq!(parse_date("2024-01-02T04:04:05+01:00"), Some(expected));
        assert_eq!(parse_date("Tue, 02 Jan 2024 03:04:05 GMT"), Some(expected));
        assert_eq!(parse_date("Tue, 02 Jan 2024 03:04:05 +0000"), Some(expected));
        assert_eq!(parse_date("2024-01-02 03:04:05"), Some(expected));
        assert_eq!(parse_date("2024-01-02T03:04:05"), Some(expected));
        assert_eq!(
            parse_date("2024-01-02"),
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_date("yesterday"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_unparsable_date_uses_current_time() {
        let before = Utc::now();
        let rss = r#"<rss><channel><item><title>A</title><link>https://e.com/a</link><pubDate>someday</pubDate></item></channel></rss>"#;
        let feed = parse(rss, "https://e.com/feed").unwrap();
        assert!(feed.items[0].published_at >= before);
    }
}
