use chrono::Utc;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::merge::merge_articles;
use crate::identity::derive_id;
use crate::storage::{Feed, FeedStore};
use crate::worker::{WorkerClient, WorkerError};

/// Timing of automatic refreshes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Delay between `start()` and the first cycle
    pub initial_delay: Duration,
    /// Interval between cycles after the first; zero disables recurring cycles
    pub period: Duration,
    /// Cycles requested sooner than this after the last one are skipped
    pub min_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            period: Duration::from_secs(60 * 60),
            min_interval: Duration::from_secs(60),
        }
    }
}

/// Outcome of refreshing one feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResult {
    pub feed_id: String,
    pub feed_title: String,
    pub new_articles: usize,
    /// Present when the refresh failed; `new_articles` is then zero.
    pub error: Option<String>,
}

impl RefreshResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of subscribing to a new feed.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeOutcome {
    pub feed: Feed,
    pub new_articles: usize,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Loading the feed list failed; the cycle was abandoned.
    #[error("Failed to load feeds: {0:#}")]
    FeedList(anyhow::Error),
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error("Store error: {0:#}")]
    Store(anyhow::Error),
}

#[derive(Debug, Default)]
struct CycleState {
    refreshing: bool,
    last_refresh: Option<Instant>,
}

struct Inner<S> {
    store: S,
    worker: WorkerClient,
    config: SchedulerConfig,
    cycle: Mutex<CycleState>,
    timer: Mutex<Option<JoinHandle<()>>>,
    completion: Mutex<Option<mpsc::Sender<Vec<RefreshResult>>>>,
}

impl<S> Drop for Inner<S> {
    fn drop(&mut self) {
        if let Some(timer) = self
            .timer
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            timer.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the in-flight flag when a cycle ends, however it ends.
struct CycleGuard<'a> {
    cycle: &'a Mutex<CycleState>,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        lock(self.cycle).refreshing = false;
    }
}

/// Periodic refresh of every subscribed feed.
///
/// At most one cycle runs at a time and cycles closer together than
/// `min_interval` are skipped. Feeds within a cycle are refreshed one after
/// another in store order; a failing feed is reported in its
/// [`RefreshResult`] and does not stop the others.
///
/// Clones share the same state and timer.
pub struct RefreshScheduler<S: FeedStore> {
    inner: Arc<Inner<S>>,
}

impl<S: FeedStore> Clone for RefreshScheduler<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: FeedStore> RefreshScheduler<S> {
    pub fn new(store: S, worker: WorkerClient, config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                worker,
                config,
                cycle: Mutex::new(CycleState::default()),
                timer: Mutex::new(None),
                completion: Mutex::new(None),
            }),
        }
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn worker(&self) -> &WorkerClient {
        &self.inner.worker
    }

    /// Registers the channel that receives each finished cycle's results.
    ///
    /// Skipped cycles send nothing. Delivery never blocks the cycle; results
    /// are dropped with a warning if the channel is full.
    pub fn set_completion_sender(&self, sender: mpsc::Sender<Vec<RefreshResult>>) {
        *lock(&self.inner.completion) = Some(sender);
    }

    /// Schedules a cycle after `initial_delay` and then every `period`.
    ///
    /// Does nothing if already running or if called outside a tokio runtime.
    pub fn start(&self) {
        let mut timer = lock(&self.inner.timer);
        if timer.is_some() {
            tracing::debug!("Refresh scheduler already running");
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!("Refresh scheduler started outside a tokio runtime");
            return;
        };

        let config = self.inner.config.clone();
        *timer = Some(runtime.spawn(run_timer(Arc::downgrade(&self.inner), config.clone())));
        tracing::info!(
            initial_delay_secs = config.initial_delay.as_secs(),
            period_secs = config.period.as_secs(),
            "Refresh scheduler started"
        );
    }

    /// Cancels future cycles. A cycle already underway runs to completion.
    pub fn stop(&self) {
        if let Some(timer) = lock(&self.inner.timer).take() {
            timer.abort();
            tracing::info!("Refresh scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.timer).is_some()
    }

    /// Whether a cycle is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        lock(&self.inner.cycle).refreshing
    }

    fn try_begin_cycle(&self) -> Option<CycleGuard<'_>> {
        let mut state = lock(&self.inner.cycle);
        if state.refreshing {
            tracing::debug!("Refresh already in progress, skipping");
            return None;
        }

        let now = Instant::now();
        if let Some(last) = state.last_refresh {
            let elapsed = now.duration_since(last);
            if elapsed < self.inner.config.min_interval {
                tracing::debug!(
                    elapsed_secs = elapsed.as_secs(),
                    "Refreshed too recently, skipping"
                );
                return None;
            }
        }

        state.refreshing = true;
        state.last_refresh = Some(now);
        Some(CycleGuard {
            cycle: &self.inner.cycle,
        })
    }

    /// Runs one refresh cycle over every feed.
    ///
    /// Returns an empty vector without doing anything when a cycle is
    /// already running or the last one started less than `min_interval` ago.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::FeedList`] if the feeds cannot be loaded. Failures
    /// of individual feeds are reported in their results instead.
    pub async fn refresh_all(&self) -> Result<Vec<RefreshResult>, SchedulerError> {
        let Some(guard) = self.try_begin_cycle() else {
            return Ok(Vec::new());
        };

        let feeds = self
            .inner
            .store
            .get_all_feeds()
            .await
            .map_err(SchedulerError::FeedList)?;
        tracing::info!(feeds = feeds.len(), "Refresh cycle started");

        let mut results = Vec::with_capacity(feeds.len());
        for feed in &feeds {
            results.push(self.refresh_single_feed(feed).await);
        }
        drop(guard);

        let new_articles: usize = results.iter().map(|r| r.new_articles).sum();
        let failed = results.iter().filter(|r| !r.is_success()).count();
        tracing::info!(
            feeds = results.len(),
            new_articles,
            failed,
            "Refresh cycle finished"
        );

        self.notify(&results);
        Ok(results)
    }

    fn notify(&self, results: &[RefreshResult]) {
        let Some(sender) = lock(&self.inner.completion).clone() else {
            return;
        };
        match sender.try_send(results.to_vec()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Refresh completion channel full, dropping results")
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Refresh completion receiver gone")
            }
        }
    }

    /// Refreshes one feed and stores its new articles.
    ///
    /// Never fails: errors are reported in the result with zero new
    /// articles.
    pub async fn refresh_single_feed(&self, feed: &Feed) -> RefreshResult {
        match self.fetch_and_merge(feed).await {
            Ok(new_articles) => {
                tracing::debug!(feed = %feed.feed_url, new_articles, "Feed refreshed");
                RefreshResult {
                    feed_id: feed.id.clone(),
                    feed_title: feed.title.clone(),
                    new_articles,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(feed = %feed.feed_url, error = %e, "Feed refresh failed");
                RefreshResult {
                    feed_id: feed.id.clone(),
                    feed_title: feed.title.clone(),
                    new_articles: 0,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn fetch_and_merge(&self, feed: &Feed) -> Result<usize, SchedulerError> {
        let parsed = self
            .inner
            .worker
            .refresh_feed(&feed.id, &feed.feed_url)
            .await?;
        let store = &self.inner.store;
        store
            .update_feed_last_fetched(&feed.id, Utc::now())
            .await
            .map_err(SchedulerError::Store)?;
        merge_articles(store, &feed.id, &parsed.articles)
            .await
            .map_err(SchedulerError::Store)
    }

    /// Subscribes to the feed at `url` and stores its current articles.
    ///
    /// Subscribing to a feed that is already stored updates its metadata and
    /// adds only articles not seen before.
    pub async fn subscribe(&self, url: &str) -> Result<SubscribeOutcome, SchedulerError> {
        let parsed = self.inner.worker.parse_feed(url).await?;
        let summary = parsed.feed;
        let mut feed = Feed {
            id: derive_id(&summary.feed_url),
            title: summary.title,
            feed_url: summary.feed_url,
            site_url: summary.site_url,
            favicon: summary.favicon,
            folder_id: None,
            last_fetched_at: None,
        };

        let store = &self.inner.store;
        store.upsert_feed(&feed).await.map_err(SchedulerError::Store)?;
        let new_articles = merge_articles(store, &feed.id, &parsed.articles)
            .await
            .map_err(SchedulerError::Store)?;
        let now = Utc::now();
        store
            .update_feed_last_fetched(&feed.id, now)
            .await
            .map_err(SchedulerError::Store)?;
        feed.last_fetched_at = Some(now);

        tracing::info!(feed = %feed.feed_url, feed_id = %feed.id, new_articles, "Subscribed to feed");
        Ok(SubscribeOutcome { feed, new_articles })
    }
}

async fn run_timer<S: FeedStore>(inner: Weak<Inner<S>>, config: SchedulerConfig) {
    tokio::time::sleep(config.initial_delay).await;
    let first = Instant::now();
    if !spawn_cycle(&inner) || config.period.is_zero() {
        return;
    }

    let mut ticker = tokio::time::interval_at(first + config.period, config.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if !spawn_cycle(&inner) {
            return;
        }
    }
}

/// Runs a cycle in its own task so stopping the timer cannot cut it short.
/// Returns `false` once the scheduler is gone.
fn spawn_cycle<S: FeedStore>(inner: &Weak<Inner<S>>) -> bool {
    let Some(inner) = inner.upgrade() else {
        return false;
    };
    let scheduler = RefreshScheduler { inner };
    tokio::spawn(async move {
        if let Err(e) = scheduler.refresh_all().await {
            tracing::error!(error = %e, "Refresh cycle failed");
        }
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FetchConfig;
    use crate::storage::MemoryStore;
    use pretty_assertions::assert_eq;

    fn scheduler(store: MemoryStore, config: SchedulerConfig) -> RefreshScheduler<MemoryStore> {
        RefreshScheduler::new(store, WorkerClient::new(FetchConfig::default()), config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_interval_throttles_cycles() {
        let (tx, mut rx) = mpsc::channel(8);
        let scheduler = scheduler(MemoryStore::new(), SchedulerConfig::default());
        scheduler.set_completion_sender(tx);

        assert_eq!(scheduler.refresh_all().await.unwrap(), vec![]);
        assert!(rx.try_recv().is_ok());

        tokio::time::advance(Duration::from_secs(30)).await;
        scheduler.refresh_all().await.unwrap();
        assert!(rx.try_recv().is_err(), "throttled cycle must not notify");

        tokio::time::advance(Duration::from_secs(31)).await;
        scheduler.refresh_all().await.unwrap();
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_in_flight_cycle_blocks_another() {
        let scheduler = scheduler(MemoryStore::new(), SchedulerConfig::default());
        let guard = scheduler.try_begin_cycle();
        assert!(guard.is_some());
        assert!(scheduler.is_refreshing());
        assert!(scheduler.try_begin_cycle().is_none());

        drop(guard);
        assert!(!scheduler.is_refreshing());
    }

    #[tokio::test]
    async fn test_failed_feed_reports_error() {
        let store = MemoryStore::new();
        let feed = Feed {
            id: "bad".into(),
            title: "Bad".into(),
            feed_url: "not a url".into(),
            site_url: String::new(),
            favicon: None,
            folder_id: None,
            last_fetched_at: None,
        };
        store.upsert_feed(&feed).await.unwrap();
        let scheduler = scheduler(store.clone(), SchedulerConfig::default());

        let result = scheduler.refresh_single_feed(&feed).await;
        assert!(!result.is_success());
        assert_eq!(result.new_articles, 0);
        assert!(result.error.unwrap().starts_with("INVALID_URL"));
        assert_eq!(store.feed("bad").unwrap().last_fetched_at, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_idempotent() {
        let scheduler = scheduler(MemoryStore::new(), SchedulerConfig::default());
        scheduler.stop();
        assert!(!scheduler.is_running());

        scheduler.start();
        scheduler.start();
        assert!(scheduler.is_running());

        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = RefreshResult {
            feed_id: "a".into(),
            feed_title: "A".into(),
            new_articles: 2,
            error: None,
        };
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            serde_json::json!({"feedId": "a", "feedTitle": "A", "newArticles": 2, "error": null})
        );
    }
}
