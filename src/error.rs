//! Error types for marketplace API calls.
//!
//! Every failed call produces exactly one [`Error`]. Each variant is a
//! distinct kind the caller can branch on, and carries the endpoint (and,
//! once a request was built, the full [`RequestDescriptor`]) plus the
//! underlying cause. Transport errors never leak out unwrapped.

use crate::client::CallState;
use crate::metadata::RequestDescriptor;
use crate::rate_limit::{AcquireError, RateLimitInfo};
use crate::schema::{SchemaMismatchError, ValidationError};
use crate::transport::TransportFailure;
use http::{HeaderMap, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// The kind of an [`Error`], for coarse branching and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    RateLimitConfiguration,
    RateLimitExhausted,
    Network,
    Timeout,
    HttpClient,
    HttpServer,
    SchemaMismatch,
    Cancelled,
    Configuration,
}

/// The main error type for marketplace API calls.
///
/// # Examples
///
/// ```no_run
/// use mysale_client::{Client, Error, ErrorKind};
/// use mysale_client::endpoint::{CallInput, EndpointSpec};
///
/// # async fn example(client: Client) {
/// let spec = EndpointSpec::get("orders.get", "/v1/orders/{order_id}");
/// match client.execute(&spec, CallInput::new().path_param("order_id", "42")).await {
///     Ok(response) => println!("order: {:?}", response.data),
///     Err(Error::Validation { source, .. }) => eprintln!("fix the input: {}", source),
///     Err(Error::HttpClient { status, body, .. }) => eprintln!("rejected ({}): {:?}", status, body),
///     Err(e) if e.is_retryable() => eprintln!("transient, try later: {}", e),
///     Err(e) => eprintln!("{:?} failure: {}", e.kind(), e),
/// }
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Outbound data failed schema validation. Nothing was sent and no
    /// rate-limit token was spent.
    #[error("Invalid input for `{endpoint}`: {source}")]
    Validation {
        endpoint: String,
        #[source]
        source: ValidationError,
    },

    /// The endpoint costs more tokens than the bucket can ever hold.
    #[error("`{endpoint}` costs {cost} tokens but the rate limit capacity is {capacity}")]
    RateLimitConfiguration {
        endpoint: String,
        cost: u32,
        capacity: u32,
    },

    /// Tokens were short and the bucket is configured not to wait.
    #[error("Local rate limit exhausted for `{endpoint}`: {cost} tokens requested, {available:.2} available")]
    RateLimitExhausted {
        endpoint: String,
        cost: u32,
        available: f64,
    },

    /// No HTTP response was obtained, after retries.
    #[error("{request} failed after {attempts} attempt(s): {source}")]
    Transport {
        request: Arc<RequestDescriptor>,
        attempts: usize,
        #[source]
        source: TransportFailure,
    },

    /// The server rejected the request with a 4xx (or other non-2xx,
    /// non-5xx) status. Never retried.
    #[error("HTTP {status} from {request}: {raw_response}")]
    HttpClient {
        request: Arc<RequestDescriptor>,
        status: StatusCode,
        /// The raw response body.
        raw_response: String,
        /// The body parsed as JSON, when it was JSON.
        body: Option<Value>,
        headers: HeaderMap,
        /// Server rate limit hints, present on 429s and on responses that
        /// report an exhausted window.
        rate_limit_info: Option<RateLimitInfo>,
        attempts: usize,
    },

    /// The server kept failing with 5xx until retries ran out (or the call
    /// was not retryable).
    #[error("HTTP {status} from {request} after {attempts} attempt(s): {raw_response}")]
    HttpServer {
        request: Arc<RequestDescriptor>,
        status: StatusCode,
        raw_response: String,
        headers: HeaderMap,
        attempts: usize,
    },

    /// A 2xx body did not match the declared response shape. This points at
    /// API drift or a wrong shape, not a transient condition.
    #[error("Unexpected response from {request} (status {status}): {source}")]
    SchemaMismatch {
        request: Arc<RequestDescriptor>,
        status: StatusCode,
        raw_response: String,
        #[source]
        source: SchemaMismatchError,
    },

    /// The caller cancelled the call.
    #[error("`{endpoint}` cancelled while {state}")]
    Cancelled {
        endpoint: String,
        state: CallState,
        attempts: usize,
    },

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    pub(crate) fn from_acquire(endpoint: &str, e: AcquireError) -> Self {
        match e {
            AcquireError::CostExceedsCapacity { cost, capacity } => Error::RateLimitConfiguration {
                endpoint: endpoint.to_string(),
                cost,
                capacity,
            },
            AcquireError::Exhausted { cost, available } => Error::RateLimitExhausted {
                endpoint: endpoint.to_string(),
                cost,
                available,
            },
        }
    }

    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation { .. } => ErrorKind::Validation,
            Error::RateLimitConfiguration { .. } => ErrorKind::RateLimitConfiguration,
            Error::RateLimitExhausted { .. } => ErrorKind::RateLimitExhausted,
            Error::Transport { source, .. } if source.is_timeout() => ErrorKind::Timeout,
            Error::Transport { .. } => ErrorKind::Network,
            Error::HttpClient { .. } => ErrorKind::HttpClient,
            Error::HttpServer { .. } => ErrorKind::HttpServer,
            Error::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            Error::Cancelled { .. } => ErrorKind::Cancelled,
            Error::Configuration(_) | Error::InvalidUrl(_) => ErrorKind::Configuration,
        }
    }

    /// Returns `true` if trying the same call again later may succeed.
    ///
    /// Transport failures, 5xx, 429 and local rate-limit exhaustion are
    /// considered retryable. The client has already applied its own retry
    /// policy; this is a hint for callers retrying at a higher level.
    ///
    /// # Examples
    ///
    /// ```
    /// use mysale_client::Error;
    ///
    /// let err = Error::RateLimitExhausted { endpoint: "orders.get".into(), cost: 1, available: 0.0 };
    /// assert!(err.is_retryable());
    ///
    /// let err = Error::Configuration("bad".into());
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport { .. } => true,
            Error::HttpServer { .. } => true,
            Error::RateLimitExhausted { .. } => true,
            Error::HttpClient { status, .. } => *status == StatusCode::TOO_MANY_REQUESTS,
            Error::Validation { .. }
            | Error::RateLimitConfiguration { .. }
            | Error::SchemaMismatch { .. }
            | Error::Cancelled { .. }
            | Error::Configuration(_)
            | Error::InvalidUrl(_) => false,
        }
    }

    /// The endpoint name, for every error raised by a call.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Error::Validation { endpoint, .. }
            | Error::RateLimitConfiguration { endpoint, .. }
            | Error::RateLimitExhausted { endpoint, .. }
            | Error::Cancelled { endpoint, .. } => Some(endpoint.as_str()),
            _ => self.request().map(RequestDescriptor::endpoint),
        }
    }

    /// The request that was sent, if the call got that far.
    pub fn request(&self) -> Option<&RequestDescriptor> {
        match self {
            Error::Transport { request, .. }
            | Error::HttpClient { request, .. }
            | Error::HttpServer { request, .. }
            | Error::SchemaMismatch { request, .. } => Some(&**request),
            _ => None,
        }
    }

    /// Number of attempts made, if any were.
    pub fn attempts(&self) -> Option<usize> {
        match self {
            Error::Transport { attempts, .. }
            | Error::HttpClient { attempts, .. }
            | Error::HttpServer { attempts, .. } => Some(*attempts),
            Error::Cancelled { attempts, .. } if *attempts > 0 => Some(*attempts),
            _ => None,
        }
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::HttpClient { status, .. }
            | Error::HttpServer { status, .. }
            | Error::SchemaMismatch { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::HttpClient { raw_response, .. }
            | Error::HttpServer { raw_response, .. }
            | Error::SchemaMismatch { raw_response, .. } => Some(raw_response.as_str()),
            _ => None,
        }
    }

    /// Server rate limit hints, if the server sent any.
    pub fn rate_limit_info(&self) -> Option<&RateLimitInfo> {
        match self {
            Error::HttpClient {
                rate_limit_info, ..
            } => rate_limit_info.as_ref(),
            _ => None,
        }
    }

    /// The server-recommended delay before retrying, capped at `max_wait`.
    pub fn rate_limit_delay(&self, max_wait: Duration) -> Option<Duration> {
        self.rate_limit_info()?.delay(max_wait)
    }
}

/// A specialized `Result` type for marketplace API calls.
pub type Result<T> = std::result::Result<T, Error>;
