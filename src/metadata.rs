//! The immutable description of one outbound request.

use http::{HeaderMap, Method};
use serde_json::Value;
use std::fmt;

/// Everything needed to put one request on the wire.
///
/// A descriptor is built by the dispatch core after input validation and rate
/// limiting, then shared (behind an `Arc`) with the [`Response`](crate::Response)
/// or [`Error`](crate::Error) it produces. It has no setters.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    endpoint: String,
    method: Method,
    segments: Vec<String>,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<Value>,
    idempotent: bool,
}

impl RequestDescriptor {
    pub(crate) fn new(
        endpoint: impl Into<String>,
        method: Method,
        segments: Vec<String>,
        query: Vec<(String, String)>,
        headers: HeaderMap,
        body: Option<Value>,
        idempotent: bool,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            segments,
            query,
            headers,
            body,
            idempotent,
        }
    }

    /// The name of the endpoint this request was built for, e.g. `orders.get`.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The rendered path, e.g. `/v1/orders/1a2b`.
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }

    /// Raw (unencoded) path segments. Transports percent-encode each one.
    pub fn path_segments(&self) -> &[String] {
        &self.segments
    }

    pub fn query_params(&self) -> &[(String, String)] {
        &self.query
    }

    /// Headers to send, including the credential. The credential header is
    /// marked sensitive and prints as `Sensitive` under `Debug`.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The validated JSON body, if any.
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Whether the request is safe to repeat.
    pub fn is_idempotent(&self) -> bool {
        self.idempotent
    }
}

impl fmt::Display for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path())
    }
}
