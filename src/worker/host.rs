//! The worker side: a dedicated thread that fetches and parses feeds.

use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use super::client::WorkerError;
use super::protocol::{
    ErrorType, Failure, FeedSummary, Operation, ParseOutcome, ParseSuccess, RequestId,
    SuccessFlag, ValidateOutcome, ValidateSuccess, WorkerRequest, WorkerResponse,
};
use crate::feed::{
    build_client, detect_format, discover, fetch_document, is_feed_content_type, parse,
    FetchConfig, FetchError, NormalizeError,
};
use crate::util::validate_url_with;

const WORKER_THREAD_NAME: &str = "feed-worker";

/// The caller's ends of a running worker's channels.
pub(crate) struct WorkerChannels {
    pub requests: mpsc::UnboundedSender<String>,
    pub responses: mpsc::UnboundedReceiver<String>,
}

/// Starts a worker thread with its own current-thread runtime.
///
/// The worker stops once `requests` is dropped; in-flight tasks are dropped
/// with its runtime.
pub(crate) fn spawn_worker(config: FetchConfig) -> Result<WorkerChannels, WorkerError> {
    let client = build_client(&config).map_err(|e| WorkerError::Spawn(e.to_string()))?;
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (response_tx, response_rx) = mpsc::unbounded_channel();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| WorkerError::Spawn(e.to_string()))?;

    let handler = Arc::new(Handler { client, config });
    std::thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_owned())
        .spawn(move || {
            runtime.block_on(serve(request_rx, response_tx, handler));
            tracing::debug!("Feed worker stopped");
        })
        .map_err(|e| WorkerError::Spawn(e.to_string()))?;

    tracing::debug!("Feed worker started");
    Ok(WorkerChannels {
        requests: request_tx,
        responses: response_rx,
    })
}

async fn serve(
    mut requests: mpsc::UnboundedReceiver<String>,
    responses: mpsc::UnboundedSender<String>,
    handler: Arc<Handler>,
) {
    let mut in_flight: HashMap<RequestId, AbortHandle> = HashMap::new();

    while let Some(raw) = requests.recv().await {
        let request: WorkerRequest = match serde_json::from_str(&raw) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding malformed worker request");
                continue;
            }
        };

        in_flight.retain(|_, task| !task.is_finished());

        let (id, operation) = request.into_parts();
        let Some(operation) = operation else {
            if let Some(task) = in_flight.remove(&id) {
                task.abort();
                tracing::debug!(request_id = id, "Aborted cancelled request");
            }
            continue;
        };

        let handler = Arc::clone(&handler);
        let responses = responses.clone();
        let task = tokio::spawn(async move {
            let response = handler.handle(id, operation).await;
            match serde_json::to_string(&response) {
                // The caller may be gone; nothing to do then.
                Ok(json) => {
                    let _ = responses.send(json);
                }
                Err(e) => tracing::error!(request_id = id, error = %e, "Failed to encode response"),
            }
        });
        in_flight.insert(id, task.abort_handle());
    }
}

struct Handler {
    client: reqwest::Client,
    config: FetchConfig,
}

impl Handler {
    async fn handle(&self, id: RequestId, operation: Operation) -> WorkerResponse {
        let kind = Kind::of(&operation);
        let work = async {
            match operation {
                Operation::ValidateFeed(payload) => WorkerResponse::ValidateFeedResult {
                    id,
                    payload: self.validate(&payload.url).await.into(),
                },
                Operation::ParseFeed(payload) => WorkerResponse::ParseFeedResult {
                    id,
                    payload: self.fetch_and_parse(&payload.url).await.into(),
                },
                Operation::RefreshFeed(payload) => {
                    tracing::debug!(feed_id = %payload.feed_id, "Refreshing feed");
                    WorkerResponse::RefreshFeedResult {
                        id,
                        payload: self.fetch_and_parse(&payload.feed_url).await.into(),
                    }
                }
            }
        };

        match AssertUnwindSafe(work).catch_unwind().await {
            Ok(response) => response,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&'static str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_owned());
                tracing::error!(request_id = id, error = %message, "Worker task panicked");
                kind.failure(id, Failure::new(ErrorType::ParseFailed, message))
            }
        }
    }

    fn check_url(&self, url: &str) -> Result<(), Failure> {
        validate_url_with(url, self.config.allow_private_networks)
            .map(|_| ())
            .map_err(|e| Failure::new(ErrorType::InvalidUrl, e.to_string()))
    }

    /// Validates a URL the user typed, which may name an HTML page rather
    /// than a feed.
    async fn validate(&self, url: &str) -> Result<ValidateSuccess, Failure> {
        self.check_url(url)?;
        let document = fetch_document(&self.client, url, &self.config)
            .await
            .map_err(fetch_failure)?;
        let text = document.text();

        let (feed_url, feed) = if detect_format(&text).is_some() {
            let feed = parse(&text, url).map_err(normalize_failure)?;
            (url.to_owned(), feed)
        } else {
            let Some(found) = discover(&self.client, &self.config, &text, url).await else {
                return Err(Failure::new(
                    ErrorType::NotAFeed,
                    "No feed found at this URL",
                ));
            };
            self.check_url(&found)?;
            let document = fetch_document(&self.client, &found, &self.config)
                .await
                .map_err(fetch_failure)?;
            let feed = parse(&document.text(), &found).map_err(normalize_failure)?;
            (found, feed)
        };

        tracing::info!(url = %url, feed = %feed_url, articles = feed.items.len(), "Feed validated");
        Ok(ValidateSuccess {
            success: SuccessFlag,
            feed_url,
            feed: FeedSummary::from(&feed),
            article_count: feed.items.len(),
        })
    }

    async fn fetch_and_parse(&self, url: &str) -> Result<ParseSuccess, Failure> {
        self.check_url(url)?;
        let document = fetch_document(&self.client, url, &self.config)
            .await
            .map_err(fetch_failure)?;

        if let Some(content_type) = document.content_type.as_deref() {
            if !is_feed_content_type(content_type) {
                return Err(Failure::new(
                    ErrorType::NotAFeed,
                    format!("Unexpected content type: {content_type}"),
                ));
            }
        }

        let feed = parse(&document.text(), url).map_err(normalize_failure)?;
        Ok(ParseSuccess {
            success: SuccessFlag,
            feed: FeedSummary::from(&feed),
            articles: feed.items,
        })
    }
}

/// Response type of an operation, kept so a panicking task can still answer.
#[derive(Clone, Copy)]
enum Kind {
    Validate,
    Parse,
    Refresh,
}

impl Kind {
    fn of(operation: &Operation) -> Self {
        match operation {
            Operation::ValidateFeed(_) => Kind::Validate,
            Operation::ParseFeed(_) => Kind::Parse,
            Operation::RefreshFeed(_) => Kind::Refresh,
        }
    }

    fn failure(self, id: RequestId, failure: Failure) -> WorkerResponse {
        match self {
            Kind::Validate => WorkerResponse::ValidateFeedResult {
                id,
                payload: ValidateOutcome::Failure(failure),
            },
            Kind::Parse => WorkerResponse::ParseFeedResult {
                id,
                payload: ParseOutcome::Failure(failure),
            },
            Kind::Refresh => WorkerResponse::RefreshFeedResult {
                id,
                payload: ParseOutcome::Failure(failure),
            },
        }
    }
}

fn fetch_failure(error: FetchError) -> Failure {
    let error_type = match error {
        FetchError::Blocked(_) => ErrorType::CorsBlocked,
        _ => ErrorType::FetchFailed,
    };
    Failure::new(error_type, error.to_string())
}

fn normalize_failure(error: NormalizeError) -> Failure {
    let error_type = match error {
        NormalizeError::UnknownFormat => ErrorType::NotAFeed,
        NormalizeError::Malformed { .. } => ErrorType::ParseFailed,
    };
    Failure::new(error_type, error.to_string())
}
