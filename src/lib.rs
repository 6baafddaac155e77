//! Feed ingestion and refresh pipeline for a personal feed reader.
//!
//! - [`feed`]: fetching, discovery and normalization of RSS 2.0, Atom,
//!   JSON Feed and RDF documents
//! - [`worker`]: runs fetch and parse on a dedicated thread behind a JSON
//!   message protocol
//! - [`refresh`]: periodic refresh of every subscribed feed with
//!   de-duplicated article storage
//! - [`storage`]: SQLite and in-memory stores
//! - [`identity`]: URL-derived ids for feeds and articles

pub mod config;
pub mod feed;
pub mod identity;
pub mod refresh;
pub mod storage;
pub mod util;
pub mod worker;
