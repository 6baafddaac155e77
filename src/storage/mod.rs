//! Persistence for feeds and articles.
//!
//! The refresh pipeline only sees the [`FeedStore`] trait. [`Database`] is
//! the SQLite implementation used by the binary; [`MemoryStore`] keeps
//! everything in process.

mod articles;
mod feeds;
mod memory;
mod schema;
mod store;
mod types;

pub use memory::MemoryStore;
pub use schema::Database;
pub use store::FeedStore;
pub use types::{Article, DatabaseError, Feed};
