//! Successful call results.
//!
//! A [`Response`] carries the validated data together with the request that
//! produced it and the details of the HTTP exchange, so callers can log
//! latency, inspect headers or dump the raw body without a second lookup.

use crate::metadata::RequestDescriptor;
use http::{HeaderMap, StatusCode};
use std::sync::Arc;
use std::time::Duration;

/// The result of a successful call.
///
/// # Examples
///
/// ```no_run
/// use mysale_client::Client;
///
/// # async fn example(client: Client) -> mysale_client::Result<()> {
/// let response = client.orders().get("9f1c4a52-3f0e-4a8e-9a55-0c0b1d2e3f40").await?;
///
/// println!("Order: {}", response.data.order_id);
/// println!("{} took {:?} over {} attempt(s)", response.request, response.latency, response.attempts);
///
/// if response.latency > std::time::Duration::from_secs(1) {
///     println!("Slow response body: {}", response.raw_body);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The validated response data.
    pub data: T,

    /// The raw response body as received.
    pub raw_body: String,

    pub status: StatusCode,

    pub headers: HeaderMap,

    /// Time from the first attempt until the final response, including any
    /// backoff sleeps. Rate-limit waiting is not included.
    pub latency: Duration,

    /// `1` for calls that succeeded on the first try.
    pub attempts: usize,

    /// The request that produced this response.
    pub request: Arc<RequestDescriptor>,
}

impl<T> Response<T> {
    pub(crate) fn new(
        data: T,
        raw_body: String,
        status: StatusCode,
        headers: HeaderMap,
        latency: Duration,
        attempts: usize,
        request: Arc<RequestDescriptor>,
    ) -> Self {
        Self {
            data,
            raw_body,
            status,
            headers,
            latency,
            attempts,
            request,
        }
    }

    /// Maps the data to a different type, keeping the exchange details.
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: f(self.data),
            raw_body: self.raw_body,
            status: self.status,
            headers: self.headers,
            latency: self.latency,
            attempts: self.attempts,
            request: self.request,
        }
    }

    /// Like [`map`](Self::map), for conversions that can fail.
    pub fn try_map<U, E, F>(self, f: F) -> Result<Response<U>, E>
    where
        F: FnOnce(T) -> Result<U, E>,
    {
        Ok(Response {
            data: f(self.data)?,
            raw_body: self.raw_body,
            status: self.status,
            headers: self.headers,
            latency: self.latency,
            attempts: self.attempts,
            request: self.request,
        })
    }

    /// Returns `true` if the call required retries.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// A header value by name, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    pub fn into_data(self) -> T {
        self.data
    }
}

impl<T> AsRef<T> for Response<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}
