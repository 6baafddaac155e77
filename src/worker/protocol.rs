//! Message shapes crossing the worker boundary.
//!
//! Every message is a JSON object `{type, id, payload}`. Requests carry a
//! client-generated correlation id and the matching response echoes it.
//! Failures are data (`{success: false, error, errorType}`), never panics or
//! transport errors.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::feed::{ParsedArticle, ParsedFeed};

/// Correlation id, unique per client.
pub type RequestId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlPayload {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshPayload {
    pub feed_id: String,
    pub feed_url: String,
}

/// Caller to worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerRequest {
    ValidateFeed { id: RequestId, payload: UrlPayload },
    ParseFeed { id: RequestId, payload: UrlPayload },
    RefreshFeed { id: RequestId, payload: RefreshPayload },
    /// Names the request to abandon. Never answered.
    Cancel { id: RequestId },
}

/// The work a request asks for, without its correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    ValidateFeed(UrlPayload),
    ParseFeed(UrlPayload),
    RefreshFeed(RefreshPayload),
}

impl Operation {
    pub fn into_request(self, id: RequestId) -> WorkerRequest {
        match self {
            Operation::ValidateFeed(payload) => WorkerRequest::ValidateFeed { id, payload },
            Operation::ParseFeed(payload) => WorkerRequest::ParseFeed { id, payload },
            Operation::RefreshFeed(payload) => WorkerRequest::RefreshFeed { id, payload },
        }
    }
}

impl WorkerRequest {
    pub fn id(&self) -> RequestId {
        match self {
            WorkerRequest::ValidateFeed { id, .. }
            | WorkerRequest::ParseFeed { id, .. }
            | WorkerRequest::RefreshFeed { id, .. }
            | WorkerRequest::Cancel { id } => *id,
        }
    }

    /// Splits into id and operation; `None` for `CANCEL`.
    pub fn into_parts(self) -> (RequestId, Option<Operation>) {
        match self {
            WorkerRequest::ValidateFeed { id, payload } => (id, Some(Operation::ValidateFeed(payload))),
            WorkerRequest::ParseFeed { id, payload } => (id, Some(Operation::ParseFeed(payload))),
            WorkerRequest::RefreshFeed { id, payload } => (id, Some(Operation::RefreshFeed(payload))),
            WorkerRequest::Cancel { id } => (id, None),
        }
    }
}

/// Worker to caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerResponse {
    ValidateFeedResult { id: RequestId, payload: ValidateOutcome },
    ParseFeedResult { id: RequestId, payload: ParseOutcome },
    RefreshFeedResult { id: RequestId, payload: ParseOutcome },
}

impl WorkerResponse {
    pub fn id(&self) -> RequestId {
        match self {
            WorkerResponse::ValidateFeedResult { id, .. }
            | WorkerResponse::ParseFeedResult { id, .. }
            | WorkerResponse::RefreshFeedResult { id, .. } => *id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WorkerResponse::ValidateFeedResult { .. } => "VALIDATE_FEED_RESULT",
            WorkerResponse::ParseFeedResult { .. } => "PARSE_FEED_RESULT",
            WorkerResponse::RefreshFeedResult { .. } => "REFRESH_FEED_RESULT",
        }
    }
}

/// Failure category reported across the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    InvalidUrl,
    NotAFeed,
    CorsBlocked,
    FetchFailed,
    ParseFailed,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorType::InvalidUrl => "INVALID_URL",
            ErrorType::NotAFeed => "NOT_A_FEED",
            ErrorType::CorsBlocked => "CORS_BLOCKED",
            ErrorType::FetchFailed => "FETCH_FAILED",
            ErrorType::ParseFailed => "PARSE_FAILED",
        };
        f.write_str(name)
    }
}

/// The literal `success` field: serializes as the constant and refuses to
/// deserialize from the other boolean. Lets untagged outcome enums pick the
/// right variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuccessFlag<const OK: bool>;

pub type Succeeded = SuccessFlag<true>;
pub type Failed = SuccessFlag<false>;

impl<const OK: bool> Serialize for SuccessFlag<OK> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(OK)
    }
}

impl<'de, const OK: bool> Deserialize<'de> for SuccessFlag<OK> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = bool::deserialize(deserializer)?;
        if value == OK {
            Ok(SuccessFlag)
        } else {
            Err(<D::Error as serde::de::Error>::custom(format!(
                "expected success = {OK}"
            )))
        }
    }
}

/// Failure payload shared by every response type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    pub success: Failed,
    pub error: String,
    pub error_type: ErrorType,
}

impl Failure {
    pub fn new(error_type: ErrorType, error: impl Into<String>) -> Self {
        Self {
            success: SuccessFlag,
            error: error.into(),
            error_type,
        }
    }
}

/// Feed metadata as reported by validate/parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSummary {
    pub title: String,
    pub feed_url: String,
    pub site_url: String,
    pub favicon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&ParsedFeed> for FeedSummary {
    fn from(feed: &ParsedFeed) -> Self {
        Self {
            title: feed.title.clone(),
            feed_url: feed.feed_url.clone(),
            site_url: feed.site_url.clone(),
            favicon: feed.favicon.clone(),
            description: feed.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateSuccess {
    pub success: Succeeded,
    /// The feed actually found, which differs from the request URL when the
    /// request named an HTML page.
    pub feed_url: String,
    pub feed: FeedSummary,
    pub article_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseSuccess {
    pub success: Succeeded,
    pub feed: FeedSummary,
    pub articles: Vec<ParsedArticle>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValidateOutcome {
    Success(ValidateSuccess),
    Failure(Failure),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParseOutcome {
    Success(ParseSuccess),
    Failure(Failure),
}

impl From<Result<ValidateSuccess, Failure>> for ValidateOutcome {
    fn from(result: Result<ValidateSuccess, Failure>) -> Self {
        match result {
            Ok(success) => ValidateOutcome::Success(success),
            Err(failure) => ValidateOutcome::Failure(failure),
        }
    }
}

impl From<Result<ParseSuccess, Failure>> for ParseOutcome {
    fn from(result: Result<ParseSuccess, Failure>) -> Self {
        match result {
            Ok(success) => ParseOutcome::Success(success),
            Err(failure) => ParseOutcome::Failure(failure),
        }
    }
}

impl ValidateOutcome {
    pub fn into_result(self) -> Result<ValidateSuccess, Failure> {
        match self {
            ValidateOutcome::Success(success) => Ok(success),
            ValidateOutcome::Failure(failure) => Err(failure),
        }
    }
}

impl ParseOutcome {
    pub fn into_result(self) -> Result<ParseSuccess, Failure> {
        match self {
            ParseOutcome::Success(success) => Ok(success),
            ParseOutcome::Failure(failure) => Err(failure),
        }
    }
}
