//! Locating a feed for an HTML page.
//!
//! Two strategies, in order: `<link rel="alternate">` tags in the page, then
//! probing a handful of well-known paths on the page's origin.

use crate::feed::fetcher::{probe_content_type, FetchConfig};
use crate::util::{origin_of, resolve_url};

/// Paths tried against the page origin when the page declares no feed.
pub const PROBE_PATHS: [&str; 6] = [
    "/feed",
    "/rss",
    "/feed.xml",
    "/rss.xml",
    "/atom.xml",
    "/index.xml",
];

/// `<link type>` values by preference: RSS, then Atom, then JSON Feed.
const FEED_TYPE_PREFERENCE: [&[&str]; 3] = [
    &["application/rss+xml"],
    &["application/atom+xml"],
    &["application/feed+json", "application/json"],
];

/// Finds a feed URL for an HTML page.
///
/// Returns the first `<link>`-declared feed, else the first probed path
/// answering 2xx with an XML/RSS/Atom content type. Never errors; network
/// failures during probing simply move on to the next path.
pub async fn discover(
    client: &reqwest::Client,
    config: &FetchConfig,
    html: &str,
    page_url: &str,
) -> Option<String> {
    if let Some(link) = find_feed_link(html, page_url) {
        tracing::debug!(page = %page_url, feed = %link, "Found feed link in page");
        return Some(link);
    }

    let origin = origin_of(page_url)?;
    for path in PROBE_PATHS {
        let candidate = format!("{origin}{path}");
        let Some(content_type) = probe_content_type(client, &candidate, config).await else {
            continue;
        };
        if ["xml", "rss", "atom"].iter().any(|m| content_type.contains(m)) {
            tracing::debug!(page = %page_url, feed = %candidate, "Found feed by probing");
            return Some(candidate);
        }
    }

    tracing::debug!(page = %page_url, "No feed found for page");
    None
}

/// Scans HTML for `<link rel="alternate">` tags with a feed type.
///
/// Uses simple string scanning (no HTML parser dependency). RSS links win
/// over Atom, Atom over JSON Feed, whatever their order in the page. The
/// href is resolved against `page_url`.
pub fn find_feed_link(html: &str, page_url: &str) -> Option<String> {
    let candidates = alternate_links(html);

    FEED_TYPE_PREFERENCE.iter().find_map(|types| {
        candidates
            .iter()
            .find(|(kind, _)| types.contains(&kind.as_str()))
            .map(|(_, href)| resolve_url(href, page_url))
    })
}

/// `(type, href)` for each `<link>` whose rel includes `alternate`.
fn alternate_links(html: &str) -> Vec<(String, String)> {
    // ASCII lowercasing keeps byte offsets aligned with the original
    let lower = html.to_ascii_lowercase();
    let mut links = Vec::new();
    let mut search_from = 0;

    while let Some(found) = lower[search_from..].find("<link") {
        let start = search_from + found;
        let Some(len) = lower[start..].find('>') else {
            break;
        };
        let tag = &html[start + "<link".len()..start + len];
        search_from = start + len + 1;

        let attrs = parse_attributes(tag);
        let attr = |name: &str| {
            attrs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        };

        let is_alternate = attr("rel").is_some_and(|rel| {
            rel.split_ascii_whitespace()
                .any(|r| r.eq_ignore_ascii_case("alternate"))
        });
        let (Some(kind), Some(href)) = (attr("type"), attr("href")) else {
            continue;
        };
        if !is_alternate || href.trim().is_empty() {
            continue;
        }

        let kind = kind
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        links.push((kind, href.trim().to_owned()));
    }

    links
}

/// Parses `name=value` pairs from the inside of a tag. Values may be
/// double-quoted, single-quoted or bare; names are lowercased.
fn parse_attributes(tag: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut rest = tag;

    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '/');
        if rest.is_empty() {
            break;
        }

        let name_end = rest
            .find(|c: char| c.is_whitespace() || c == '=' || c == '/')
            .unwrap_or(rest.len());
        let name = rest[..name_end].to_ascii_lowercase();
        rest = rest[name_end..].trim_start();

        let Some(after_eq) = rest.strip_prefix('=') else {
            // Boolean attribute
            if !name.is_empty() {
                attrs.push((name, String::new()));
            }
            if name_end == 0 {
                // Unparseable character; skip it
                let mut chars = rest.chars();
                chars.next();
                rest = chars.as_str();
            }
            continue;
        };
        let after_eq = after_eq.trim_start();

        let (value, remainder) = match after_eq.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let inner = &after_eq[1..];
                match inner.find(quote) {
                    Some(end) => (&inner[..end], &inner[end + 1..]),
                    None => (inner, ""),
                }
            }
            _ => {
                let end = after_eq
                    .find(char::is_whitespace)
                    .unwrap_or(after_eq.len());
                (&after_eq[..end], &after_eq[end..])
            }
        };

        attrs.push((name, value.to_owned()));
        rest = remainder;
    }

    attrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_find_rss_link_in_html() {
        let html = r#"<html><head>
            <link rel="alternate" type="application/rss+xml" href="/feed.xml" title="RSS">
        </head><body></body></html>"#;
        let result = find_feed_link(html, "https://example.com");
        assert_eq!(result, Some("https://example.com/feed.xml".to_owned()));
    }

    #[test]
    fn test_rss_preferred_over_earlier_atom() {
        let html = r#"<head>
            <link rel="alternate" type="application/atom+xml" href="/atom.xml">
            <link rel="alternate" type="application/feed+json" href="/feed.json">
            <link rel="alternate" type="application/rss+xml" href="/rss.xml">
        </head>"#;
        assert_eq!(
            find_feed_link(html, "https://example.com/"),
            Some("https://example.com/rss.xml".to_owned())
        );
    }

    #[test]
    fn test_atom_preferred_over_json() {
        let html = r#"<link rel="alternate" type="application/json" href="/feed.json">
            <link rel="alternate" type="application/atom+xml" href="/atom.xml">"#;
        assert_eq!(
            find_feed_link(html, "https://example.com/"),
            Some("https://example.com/atom.xml".to_owned())
        );
    }

    #[test]
    fn test_json_feed_link_found() {
        let html = r#"<link rel="alternate" type="application/feed+json" href="https://example.com/feed.json">"#;
        assert_eq!(
            find_feed_link(html, "https://example.com/"),
            Some("https://example.com/feed.json".to_owned())
        );
    }

    #[test]
    fn test_find_feed_link_reversed_attrs_and_quotes() {
        let html = r#"<LINK HREF='/rss' TYPE='application/rss+xml' REL='alternate'>"#;
        assert_eq!(
            find_feed_link(html, "https://example.com/blog/post"),
            Some("https://example.com/rss".to_owned())
        );
    }

    #[test]
    fn test_find_feed_link_unquoted_and_self_closing() {
        let html = r#"<link rel=alternate type=application/rss+xml href=/feed />"#;
        assert_eq!(
            find_feed_link(html, "https://example.com"),
            Some("https://example.com/feed".to_owned())
        );
    }

    #[test]
    fn test_find_feed_link_protocol_relative() {
        let html = r#"<link rel="alternate" type="application/rss+xml" href="//cdn.example.com/feed.xml">"#;
        assert_eq!(
            find_feed_link(html, "https://example.com"),
            Some("https://cdn.example.com/feed.xml".to_owned())
        );
    }

    #[test]
    fn test_non_alternate_links_ignored() {
        let html = r#"<head>
            <link rel="stylesheet" href="/style.css">
            <link rel="self" type="application/rss+xml" href="/not-this.xml">
            <link data-href="/x" rel="alternate" type="text/html" href="/fr">
        </head>"#;
        assert_eq!(find_feed_link(html, "https://example.com"), None);
    }

    #[test]
    fn test_type_parameters_ignored() {
        let html = r#"<link rel="alternate" type="application/rss+xml; charset=utf-8" href="/rss">"#;
        assert_eq!(
            find_feed_link(html, "https://example.com"),
            Some("https://example.com/rss".to_owned())
        );
    }

    fn test_config() -> FetchConfig {
        FetchConfig {
            request_timeout: Duration::from_secs(5),
            allow_private_networks: true,
            ..FetchConfig::default()
        }
    }

    #[tokio::test]
    async fn test_discover_probes_well_known_paths() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rss"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<rss/>", "application/rss+xml")
                    .insert_header("Content-Type", "application/rss+xml"),
            )
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let page = format!("{}/about", mock_server.uri());
        let found = discover(&client, &test_config(), "<html></html>", &page).await;
        assert_eq!(found, Some(format!("{}/rss", mock_server.uri())));
    }

    #[tokio::test]
    async fn test_discover_ignores_html_answers() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html></html>")
                    .insert_header("Content-Type", "text/html"),
            )
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let page = format!("{}/", mock_server.uri());
        let found = discover(&client, &test_config(), "<html></html>", &page).await;
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn test_discover_prefers_declared_link_without_probing() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let html = r#"<link rel="alternate" type="application/atom+xml" href="/atom">"#;
        let page = format!("{}/", mock_server.uri());
        let found = discover(&client, &test_config(), html, &page).await;
        assert_eq!(found, Some(format!("{}/atom", mock_server.uri())));
    }
}
