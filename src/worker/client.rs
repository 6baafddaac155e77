use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::host::{spawn_worker, WorkerChannels};
use super::protocol::{
    ErrorType, Failure, Operation, ParseSuccess, RefreshPayload, RequestId, UrlPayload,
    ValidateSuccess, WorkerRequest, WorkerResponse,
};
use crate::feed::FetchConfig;

/// Errors a caller of [`WorkerClient`] can observe.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The worker was terminated (or died) before answering.
    #[error("Worker terminated")]
    Terminated,
    /// The request was cancelled by the caller.
    #[error("Request {0} cancelled")]
    Cancelled(RequestId),
    /// The worker answered with a failure payload.
    #[error("{error_type}: {message}")]
    Failed { error_type: ErrorType, message: String },
    /// A message could not be encoded or decoded, or had the wrong type.
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Failed to start worker: {0}")]
    Spawn(String),
}

impl From<Failure> for WorkerError {
    fn from(failure: Failure) -> Self {
        WorkerError::Failed {
            error_type: failure.error_type,
            message: failure.error,
        }
    }
}

impl WorkerError {
    /// The boundary failure category, if the worker answered with one.
    pub fn error_type(&self) -> Option<ErrorType> {
        match self {
            WorkerError::Failed { error_type, .. } => Some(*error_type),
            _ => None,
        }
    }
}

type Reply = Result<WorkerResponse, WorkerError>;

struct Pending {
    /// Which worker the request was sent to.
    generation: u64,
    reply: oneshot::Sender<Reply>,
}

type PendingMap = Arc<Mutex<HashMap<RequestId, Pending>>>;

fn lock_pending(pending: &PendingMap) -> MutexGuard<'_, HashMap<RequestId, Pending>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

struct WorkerLink {
    generation: u64,
    requests: mpsc::UnboundedSender<String>,
    dispatcher: JoinHandle<()>,
}

impl WorkerLink {
    fn is_alive(&self) -> bool {
        !self.requests.is_closed()
    }
}

struct Inner {
    config: FetchConfig,
    next_id: AtomicU64,
    workers_started: AtomicUsize,
    worker: Mutex<Option<WorkerLink>>,
    pending: PendingMap,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(link) = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            link.dispatcher.abort();
        }
    }
}

/// Handle to the feed worker.
///
/// The worker thread is started on the first request and reused afterwards.
/// Requests and responses cross to it as JSON strings; each response is
/// routed back to its caller by correlation id. Clones share one worker.
///
/// Requests must be issued from within a tokio runtime.
#[derive(Clone)]
pub struct WorkerClient {
    inner: Arc<Inner>,
}

impl WorkerClient {
    pub fn new(config: FetchConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                next_id: AtomicU64::new(1),
                workers_started: AtomicUsize::new(0),
                worker: Mutex::new(None),
                pending: Arc::new(Mutex::new(HashMap::new())),
            }),
        }
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<WorkerLink>> {
        self.inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends a request and returns a future for its response.
    ///
    /// Starts the worker if none is running.
    pub fn send(&self, operation: Operation) -> Result<PendingRequest, WorkerError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let json = serde_json::to_string(&operation.into_request(id))
            .map_err(|e| WorkerError::Protocol(e.to_string()))?;

        let mut worker = self.lock_worker();
        if !worker.as_ref().is_some_and(WorkerLink::is_alive) {
            *worker = Some(self.start_worker()?);
        }
        let Some(link) = worker.as_ref() else {
            return Err(WorkerError::Terminated);
        };

        let (reply, rx) = oneshot::channel();
        lock_pending(&self.inner.pending).insert(
            id,
            Pending {
                generation: link.generation,
                reply,
            },
        );
        if link.requests.send(json).is_err() {
            lock_pending(&self.inner.pending).remove(&id);
            return Err(WorkerError::Terminated);
        }

        tracing::trace!(request_id = id, "Request sent to worker");
        Ok(PendingRequest { id, rx })
    }

    fn start_worker(&self) -> Result<WorkerLink, WorkerError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| WorkerError::Spawn(e.to_string()))?;
        let WorkerChannels {
            requests,
            responses,
        } = spawn_worker(self.inner.config.clone())?;

        let generation = self.inner.workers_started.fetch_add(1, Ordering::Relaxed) as u64 + 1;
        let dispatcher = runtime.spawn(dispatch(
            responses,
            Arc::clone(&self.inner.pending),
            generation,
        ));

        Ok(WorkerLink {
            generation,
            requests,
            dispatcher,
        })
    }

    /// Validates a URL that may name a feed or an HTML page linking to one.
    pub async fn validate_feed(&self, url: &str) -> Result<ValidateSuccess, WorkerError> {
        let response = self
            .send(Operation::ValidateFeed(UrlPayload { url: url.to_owned() }))?
            .await?;
        match response {
            WorkerResponse::ValidateFeedResult { payload, .. } => Ok(payload.into_result()?),
            other => Err(unexpected(&other, "VALIDATE_FEED")),
        }
    }

    /// Fetches and fully parses a feed for an initial subscription.
    pub async fn parse_feed(&self, url: &str) -> Result<ParseSuccess, WorkerError> {
        let response = self
            .send(Operation::ParseFeed(UrlPayload { url: url.to_owned() }))?
            .await?;
        match response {
            WorkerResponse::ParseFeedResult { payload, .. } => Ok(payload.into_result()?),
            other => Err(unexpected(&other, "PARSE_FEED")),
        }
    }

    /// Fetches and fully parses an already subscribed feed.
    pub async fn refresh_feed(
        &self,
        feed_id: &str,
        feed_url: &str,
    ) -> Result<ParseSuccess, WorkerError> {
        let response = self
            .send(Operation::RefreshFeed(RefreshPayload {
                feed_id: feed_id.to_owned(),
                feed_url: feed_url.to_owned(),
            }))?
            .await?;
        match response {
            WorkerResponse::RefreshFeedResult { payload, .. } => Ok(payload.into_result()?),
            other => Err(unexpected(&other, "REFRESH_FEED")),
        }
    }

    /// Abandons a pending request.
    ///
    /// Its caller receives [`WorkerError::Cancelled`] and any later response
    /// is dropped. The worker is asked to abort the task, which is best
    /// effort. Returns `false` if the id was not pending.
    pub fn cancel(&self, id: RequestId) -> bool {
        let Some(pending) = lock_pending(&self.inner.pending).remove(&id) else {
            return false;
        };
        let _ = pending.reply.send(Err(WorkerError::Cancelled(id)));

        if let Some(link) = self.lock_worker().as_ref() {
            match serde_json::to_string(&WorkerRequest::Cancel { id }) {
                Ok(json) => {
                    let _ = link.requests.send(json);
                }
                Err(e) => tracing::warn!(request_id = id, error = %e, "Failed to encode cancel"),
            }
        }
        tracing::debug!(request_id = id, "Request cancelled");
        true
    }

    /// Stops the worker and fails every pending request with
    /// [`WorkerError::Terminated`]. The next request starts a fresh worker.
    pub fn terminate(&self) {
        let Some(link) = self.lock_worker().take() else {
            return;
        };
        link.dispatcher.abort();
        drop(link.requests);

        // A concurrent send may already have started the next worker; its
        // requests are not ours to fail.
        let drained = take_generation(&self.inner.pending, link.generation);
        let count = drained.len();
        for pending in drained {
            let _ = pending.reply.send(Err(WorkerError::Terminated));
        }
        tracing::info!(pending = count, "Feed worker terminated");
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        lock_pending(&self.inner.pending).len()
    }

    /// Whether a worker is currently running.
    pub fn is_running(&self) -> bool {
        self.lock_worker().as_ref().is_some_and(WorkerLink::is_alive)
    }

    /// How many worker threads this client has started so far.
    pub fn workers_started(&self) -> usize {
        self.inner.workers_started.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for WorkerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerClient")
            .field("running", &self.is_running())
            .field("pending", &self.pending_count())
            .finish()
    }
}

fn unexpected(response: &WorkerResponse, request: &str) -> WorkerError {
    WorkerError::Protocol(format!(
        "unexpected {} for {request} request {}",
        response.kind(),
        response.id()
    ))
}

/// Routes worker responses to their callers until the worker goes away,
/// then fails whatever it still owed.
async fn dispatch(
    mut responses: mpsc::UnboundedReceiver<String>,
    pending: PendingMap,
    generation: u64,
) {
    while let Some(raw) = responses.recv().await {
        let (id, reply) = match serde_json::from_str::<WorkerResponse>(&raw) {
            Ok(response) => (response.id(), Ok(response)),
            Err(e) => {
                let Some(id) = response_id(&raw) else {
                    tracing::warn!(error = %e, "Discarding unreadable worker response");
                    continue;
                };
                (id, Err(WorkerError::Protocol(e.to_string())))
            }
        };

        match lock_pending(&pending).remove(&id) {
            Some(entry) => {
                let _ = entry.reply.send(reply);
            }
            None => tracing::debug!(request_id = id, "Dropping response for unknown request"),
        }
    }

    let orphaned = take_generation(&pending, generation);
    if !orphaned.is_empty() {
        tracing::warn!(pending = orphaned.len(), "Feed worker exited with requests pending");
    }
    for entry in orphaned {
        let _ = entry.reply.send(Err(WorkerError::Terminated));
    }
}

/// Removes and returns the requests sent to one worker generation.
fn take_generation(pending: &PendingMap, generation: u64) -> Vec<Pending> {
    let mut map = lock_pending(pending);
    let ids: Vec<_> = map
        .iter()
        .filter(|(_, p)| p.generation == generation)
        .map(|(id, _)| *id)
        .collect();
    ids.into_iter().filter_map(|id| map.remove(&id)).collect()
}

fn response_id(raw: &str) -> Option<RequestId> {
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()?
        .get("id")?
        .as_u64()
}

/// A request in flight. Resolves to the matching response.
#[derive(Debug)]
pub struct PendingRequest {
    id: RequestId,
    rx: oneshot::Receiver<Reply>,
}

impl PendingRequest {
    /// Correlation id, usable with [`WorkerClient::cancel`].
    pub fn id(&self) -> RequestId {
        self.id
    }
}

impl Future for PendingRequest {
    type Output = Reply;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(WorkerError::Terminated)))
    }
}
