//! Fetching and parsing off the caller's runtime.
//!
//! [`WorkerClient`] owns a single worker thread running its own tokio
//! runtime. The two sides share no state: requests and responses cross as
//! JSON strings (see [`protocol`]) and are matched up by correlation id.
//! Failures come back as data with an [`ErrorType`], never as panics.

mod client;
mod host;
pub mod protocol;

pub use client::{PendingRequest, WorkerClient, WorkerError};
pub use protocol::{
    ErrorType, Failure, FeedSummary, Operation, ParseOutcome, ParseSuccess, RefreshPayload,
    RequestId, UrlPayload, ValidateOutcome, ValidateSuccess, WorkerRequest, WorkerResponse,
};
