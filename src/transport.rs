//! Putting requests on the wire, with timeouts and retries.
//!
//! [`Transport`] is the single-attempt seam: it takes a
//! [`RequestDescriptor`] and returns the status, headers and raw body, or a
//! [`TransportFailure`]. [`HttpTransport`] is the production implementation
//! over a pooled `reqwest::Client`.
//!
//! [`TransportClient`] wraps a transport with the per-attempt timeout and the
//! retry loop. A 5xx that survives every retry is handed back as a normal
//! delivery so the caller can map it; only failures with no HTTP response
//! at all come back as [`SendError`].

use crate::metadata::RequestDescriptor;
use crate::rate_limit::RateLimitInfo;
use crate::retry::{AttemptOutcome, RetryPolicy, RetryPredicate};
use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Upper bound on a `Retry-After` / reset wait honored between attempts.
pub const MAX_SERVER_DELAY: Duration = Duration::from_secs(60);

/// A boxed, thread-safe error used as the cause of a [`TransportFailure`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a single attempt produced no HTTP response.
#[derive(thiserror::Error, Debug)]
pub enum TransportFailure {
    /// The connection could not be established (refused, DNS, TLS handshake).
    /// Nothing was sent, so the request is safe to repeat.
    #[error("connection failed before the request was sent: {0}")]
    Connect(#[source] BoxError),

    /// The connection was reset or closed while the request was being sent,
    /// before any response arrived. Treated as unsent.
    #[error("connection reset before a response: {0}")]
    Reset(#[source] BoxError),

    /// The attempt exceeded its timeout. The server may have acted on it.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Any other I/O failure, e.g. the connection dropping while the
    /// response body was being read.
    #[error("network error: {0}")]
    Network(#[source] BoxError),
}

impl TransportFailure {
    /// `true` if the failure happened before the server could have acted
    /// on the request.
    pub fn is_pre_send(&self) -> bool {
        matches!(self, TransportFailure::Connect(_) | TransportFailure::Reset(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportFailure::Timeout(_))
    }
}

impl TransportFailure {
    /// Classifies an error from `RequestBuilder::send`, i.e. one raised
    /// before the status line was received.
    fn from_send(e: reqwest::Error) -> Self {
        if e.is_connect() {
            TransportFailure::Connect(Box::new(e))
        } else if is_connection_reset(&e as &(dyn std::error::Error + 'static)) {
            TransportFailure::Reset(Box::new(e))
        } else {
            TransportFailure::Network(Box::new(e))
        }
    }

    /// Classifies an error raised while reading the response body.
    fn from_body(e: reqwest::Error) -> Self {
        TransportFailure::Network(Box::new(e))
    }
}

/// Walks the source chain looking for an I/O reset, abort or broken pipe.
fn is_connection_reset(e: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = Some(e);
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            return matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::NotConnected
            );
        }
        source = err.source();
    }
    false
}

/// What came back from the server on one attempt.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// Sends one attempt of a request.
///
/// Implementations must not retry; [`TransportClient`] owns that decision.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportFailure>;
}

/// The production transport: JSON over HTTP through a shared connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    /// Creates a transport rooted at `base_url`.
    ///
    /// Any path on the base URL is kept as a prefix of every request path.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the URL cannot carry a path or the
    /// underlying HTTP client fails to build.
    pub fn new(base_url: Url) -> crate::Result<Self> {
        if base_url.cannot_be_a_base() {
            return Err(crate::Error::Configuration(format!(
                "base URL `{}` cannot carry a path",
                base_url
            )));
        }

        let http_client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| {
                crate::Error::Configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    /// The full URL for a descriptor, with each path segment percent-encoded.
    pub fn url_for(&self, request: &RequestDescriptor) -> Result<Url, TransportFailure> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportFailure::Connect("base URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(request.path_segments());

        if !request.query_params().is_empty() {
            url.query_pairs_mut().extend_pairs(request.query_params());
        }
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportFailure> {
        let url = self.url_for(request)?;

        let mut builder = self
            .http_client
            .request(request.method().clone(), url)
            .headers(request.headers().clone());
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(TransportFailure::from_send)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(TransportFailure::from_body)?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

/// A response that made it back, and how many attempts it took.
#[derive(Debug)]
pub struct Delivery {
    pub response: RawResponse,
    pub attempts: usize,
}

/// Terminal failure of [`TransportClient::send`].
#[derive(thiserror::Error, Debug)]
pub enum SendError {
    /// No attempt produced a response worth keeping.
    #[error("transport failed after {attempts} attempt(s): {source}")]
    Failed {
        attempts: usize,
        #[source]
        source: TransportFailure,
    },

    /// The cancellation token fired while awaiting I/O or a backoff sleep.
    #[error("cancelled during attempt {attempts}")]
    Cancelled { attempts: usize },
}

/// A [`Transport`] plus timeout and retry handling.
pub struct TransportClient {
    transport: Arc<dyn Transport>,
    retry_policy: RetryPolicy,
    retry_predicate: Box<dyn RetryPredicate>,
    timeout: Option<Duration>,
}

impl TransportClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        retry_policy: RetryPolicy,
        retry_predicate: Box<dyn RetryPredicate>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            transport,
            retry_policy,
            retry_predicate,
            timeout,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Sends `request`, retrying per the policy and predicate.
    ///
    /// Non-2xx responses are returned as `Ok` once no further retry applies.
    pub async fn send(
        &self,
        request: &RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Delivery, SendError> {
        let idempotent = request.is_idempotent();
        let mut attempt = 0;

        loop {
            attempt += 1;

            tracing::debug!(
                endpoint = request.endpoint(),
                method = %request.method(),
                path = %request.path(),
                attempt = attempt,
                "Executing HTTP request"
            );

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SendError::Cancelled { attempts: attempt }),
                result = self.attempt(request) => result,
            };

            let delay = match result {
                Ok(response) => {
                    let status = response.status;
                    if status.is_success()
                        || !self.retry_predicate.should_retry(
                            &AttemptOutcome::Responded(status),
                            idempotent,
                            attempt,
                        )
                    {
                        return Ok(Delivery {
                            response,
                            attempts: attempt,
                        });
                    }

                    tracing::warn!(
                        status = status.as_u16(),
                        attempt = attempt,
                        endpoint = request.endpoint(),
                        "Retryable HTTP status"
                    );

                    let Some(backoff) = self.retry_policy.delay_after(attempt) else {
                        return Ok(Delivery {
                            response,
                            attempts: attempt,
                        });
                    };

                    // A server-provided hint overrides the backoff schedule.
                    match RateLimitInfo::from_headers(&response.headers).delay(MAX_SERVER_DELAY) {
                        Some(hint) => {
                            tracing::info!(
                                rate_limit_delay_ms = hint.as_millis() as u64,
                                attempt = attempt,
                                endpoint = request.endpoint(),
                                "Rate limited - waiting before retry"
                            );
                            hint
                        }
                        None => backoff,
                    }
                }
                Err(failure) => {
                    tracing::warn!(
                        error = %failure,
                        attempt = attempt,
                        endpoint = request.endpoint(),
                        idempotent = idempotent,
                        "Request failed"
                    );

                    let retryable = self.retry_predicate.should_retry(
                        &AttemptOutcome::Failed(&failure),
                        idempotent,
                        attempt,
                    );
                    match self.retry_policy.delay_after(attempt) {
                        Some(delay) if retryable => delay,
                        _ => {
                            return Err(SendError::Failed {
                                attempts: attempt,
                                source: failure,
                            })
                        }
                    }
                }
            };

            tracing::info!(
                delay_ms = delay.as_millis() as u64,
                attempt = attempt,
                endpoint = request.endpoint(),
                "Retrying request after delay"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SendError::Cancelled { attempts: attempt }),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn attempt(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportFailure> {
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.transport.send(request))
                .await
                .unwrap_or(Err(TransportFailure::Timeout(timeout))),
            None => self.transport.send(request).await,
        }
    }
}
