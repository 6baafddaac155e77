//! Utility functions shared by the parser, the fetcher and the CLI.
//!
//! - **URL handling**: SSRF-aware validation, relative URL resolution, origins
//! - **Text processing**: entity decoding, markup stripping, previews, and
//!   Unicode-aware truncation for terminal output
//!
//! # Examples
//!
//! ```
//! use feedline::util::{decode_entities, make_preview, validate_url};
//!
//! let url = validate_url("https://example.com/feed.xml").unwrap();
//! assert_eq!(url.host_str(), Some("example.com"));
//!
//! assert_eq!(decode_entities("Tom &amp; Jerry"), "Tom & Jerry");
//! assert_eq!(make_preview("<p>Hello <b>world</b></p>"), "Hello world");
//! ```

mod text;
mod url_validator;

pub use text::{
    collapse_whitespace, decode_entities, display_width, make_preview, strip_control_chars,
    strip_tags, truncate_chars, truncate_to_width, PREVIEW_MAX_CHARS,
};
pub use url_validator::{
    origin_of, resolve_url, validate_url, validate_url_with, UrlValidationError,
};
