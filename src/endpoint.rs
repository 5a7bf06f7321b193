//! Endpoint descriptions and per-call input.
//!
//! An [`EndpointSpec`] names one operation of the remote API: its HTTP method,
//! a path template such as `/v1/orders/{order_id}/shipments`, the shapes of
//! its request and response bodies, whether it is safe to repeat, and how
//! many rate-limit tokens it costs. A [`CallInput`] carries the values for one
//! call of that endpoint.

use crate::schema::{Shape, ValidationError};
use http::Method;
use serde::Serialize;
use serde_json::Value;

/// Static description of one API operation.
///
/// # Examples
///
/// ```
/// use mysale_client::endpoint::EndpointSpec;
/// use mysale_client::schema::{Record, Shape};
///
/// let spec = EndpointSpec::get("orders.get", "/v1/orders/{order_id}")
///     .response_shape(Record::new("Order").required("order_id", Shape::Uuid));
///
/// assert!(spec.is_idempotent());
/// assert_eq!(spec.path_params().collect::<Vec<_>>(), vec!["order_id"]);
/// ```
#[derive(Debug, Clone)]
pub struct EndpointSpec {
    name: String,
    method: Method,
    path_template: String,
    request: Option<Shape>,
    response: Option<Shape>,
    idempotent: Option<bool>,
    cost: u32,
}

impl EndpointSpec {
    /// Creates an endpoint with no body shapes and a cost of one token.
    pub fn new(name: impl Into<String>, method: Method, path_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            path_template: path_template.into(),
            request: None,
            response: None,
            idempotent: None,
            cost: 1,
        }
    }

    pub fn get(name: impl Into<String>, path_template: impl Into<String>) -> Self {
        Self::new(name, Method::GET, path_template)
    }

    pub fn post(name: impl Into<String>, path_template: impl Into<String>) -> Self {
        Self::new(name, Method::POST, path_template)
    }

    pub fn put(name: impl Into<String>, path_template: impl Into<String>) -> Self {
        Self::new(name, Method::PUT, path_template)
    }

    pub fn delete(name: impl Into<String>, path_template: impl Into<String>) -> Self {
        Self::new(name, Method::DELETE, path_template)
    }

    /// Declares the request body shape. Endpoints without one reject bodies.
    pub fn request_shape(mut self, shape: impl Into<Shape>) -> Self {
        self.request = Some(shape.into());
        self
    }

    /// Declares the response body shape. Endpoints without one ignore the body.
    pub fn response_shape(mut self, shape: impl Into<Shape>) -> Self {
        self.response = Some(shape.into());
        self
    }

    /// Overrides the idempotency derived from the method.
    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = Some(idempotent);
        self
    }

    /// Sets the number of rate-limit tokens one call consumes.
    pub fn cost(mut self, tokens: u32) -> Self {
        self.cost = tokens;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path_template(&self) -> &str {
        &self.path_template
    }

    pub fn request(&self) -> Option<&Shape> {
        self.request.as_ref()
    }

    pub fn response(&self) -> Option<&Shape> {
        self.response.as_ref()
    }

    pub fn token_cost(&self) -> u32 {
        self.cost
    }

    /// Whether calls to this endpoint may be repeated safely.
    ///
    /// Unless overridden, read-type methods (GET, HEAD, OPTIONS) are
    /// idempotent and everything else is treated as a write.
    pub fn is_idempotent(&self) -> bool {
        self.idempotent
            .unwrap_or_else(|| matches!(self.method, Method::GET | Method::HEAD | Method::OPTIONS))
    }

    /// Names of the `{placeholders}` in the path template, in order.
    pub fn path_params(&self) -> impl Iterator<Item = &str> {
        self.path_template.split('/').filter_map(placeholder)
    }

    /// Substitutes path parameters, validating each value.
    ///
    /// Values are trimmed and must be non-empty and free of `/`.
    pub(crate) fn render_path(
        &self,
        params: &[(String, String)],
    ) -> Result<Vec<String>, ValidationError> {
        let mut segments = Vec::new();
        for segment in self.path_template.split('/').filter(|s| !s.is_empty()) {
            let Some(name) = placeholder(segment) else {
                segments.push(segment.to_string());
                continue;
            };

            let field = format!("path.{}", name);
            let value = params
                .iter()
                .rev()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.trim())
                .ok_or_else(|| ValidationError::new(&field, "identifier", "nothing"))?;

            if value.is_empty() {
                return Err(ValidationError::new(&field, "non-empty identifier", "empty string"));
            }
            if value.contains('/') {
                return Err(ValidationError::new(
                    &field,
                    "identifier without `/`",
                    format!("\"{}\"", value),
                ));
            }
            segments.push(value.to_string());
        }
        Ok(segments)
    }
}

fn placeholder(segment: &str) -> Option<&str> {
    segment
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .filter(|name| !name.is_empty())
}

/// The caller-supplied values for one call.
///
/// # Examples
///
/// ```
/// use mysale_client::endpoint::CallInput;
/// use serde_json::json;
///
/// let input = CallInput::new()
///     .path_param("order_id", "9f1c4a52-3f0e-4a8e-9a55-0c0b1d2e3f40")
///     .query("limit", 50)
///     .body(json!({"merchant_order_id": "INT-1"}));
/// assert_eq!(input.query_params().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallInput {
    path_params: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Option<Value>,
}

impl CallInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value for a `{name}` placeholder of the path template.
    pub fn path_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.path_params.push((name.into(), value.to_string()));
        self
    }

    /// Appends a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Sets a raw JSON body.
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serializes a typed model as the body.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the model cannot be represented as JSON.
    pub fn json<T: Serialize>(self, body: &T) -> Result<Self, ValidationError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ValidationError::new("$", "JSON-serializable body", e.to_string()))?;
        Ok(self.body(value))
    }

    pub fn path_params(&self) -> &[(String, String)] {
        &self.path_params
    }

    pub fn query_params(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn body_value(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub(crate) fn into_parts(self) -> (Vec<(String, String)>, Vec<(String, String)>, Option<Value>) {
        (self.path_params, self.query, self.body)
    }
}
