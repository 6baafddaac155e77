//! Periodic refresh of subscribed feeds and merging of their articles.

mod merge;
mod scheduler;

pub use merge::{merge_articles, to_article};
pub use scheduler::{
    RefreshResult, RefreshScheduler, SchedulerConfig, SchedulerError, SubscribeOutcome,
};
