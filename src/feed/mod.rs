//! Feed retrieval and normalization.
//!
//! - **Normalizing**: RSS 2.0, Atom, JSON Feed and RDF documents into one
//!   [`ParsedFeed`] model
//! - **Fetching**: HTTP retrieval with timeouts, size limits, retry with
//!   backoff, and optional proxy rewriting
//! - **Discovery**: locating a feed for an HTML page
//!
//! # Example
//!
//! ```
//! use feedline::feed::{parse, FeedFormat};
//!
//! let xml = r#"<rss version="2.0"><channel><title>Blog</title>
//!     <item><title>Hello</title><link>https://example.com/hello</link></item>
//! </channel></rss>"#;
//!
//! let feed = parse(xml, "https://example.com/feed.xml").unwrap();
//! assert_eq!(feed.format, FeedFormat::Rss);
//! assert_eq!(feed.items[0].title, "Hello");
//! ```

mod discovery;
mod fetcher;
mod json;
mod model;
mod parser;
mod xml;

pub use discovery::{discover, find_feed_link, PROBE_PATHS};
pub use fetcher::{
    build_client, fetch_document, is_feed_content_type, probe_content_type, request_url,
    FetchConfig, FetchError, FetchedDocument, ACCEPT_HEADER, DEFAULT_USER_AGENT,
};
pub use model::{FeedFormat, ParsedArticle, ParsedFeed};
pub use parser::{
    detect_format, favicon_for, parse, parse_date, NormalizeError, DEFAULT_ARTICLE_TITLE,
    DEFAULT_FEED_TITLE,
};
