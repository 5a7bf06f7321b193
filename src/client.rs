//! The dispatch core.
//!
//! [`Client::execute`] runs one call through a fixed pipeline: validate the
//! input, take tokens from the local bucket, send with retries, then classify
//! and validate the response. Use [`ClientBuilder`] to configure and create
//! clients.

use crate::config::{ApiToken, ClientConfig};
use crate::endpoint::{CallInput, EndpointSpec};
use crate::error::ErrorKind;
use crate::metadata::RequestDescriptor;
use crate::rate_limit::{RateLimitConfig, RateLimitInfo, TokenBucket};
use crate::resources::{Orders, Skus};
use crate::retry::{RetryOnTransient, RetryPolicy, RetryPredicate};
use crate::schema::{self, SchemaMismatchError, Shape, ValidatedData, ValidationError};
use crate::transport::{Delivery, HttpTransport, SendError, Transport, TransportClient};
use crate::{Error, Response, Result};
use http::{header, HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Where a call is in its lifecycle.
///
/// `Pending → Validating → Throttled → InFlight → Succeeded | Failed`.
/// Retries happen inside `InFlight`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Pending,
    Validating,
    /// Waiting for rate-limit tokens.
    Throttled,
    /// Attempts (and backoff sleeps) in progress.
    InFlight,
    Succeeded,
    Failed(ErrorKind),
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallState::Pending => f.write_str("pending"),
            CallState::Validating => f.write_str("validating"),
            CallState::Throttled => f.write_str("throttled"),
            CallState::InFlight => f.write_str("in flight"),
            CallState::Succeeded => f.write_str("succeeded"),
            CallState::Failed(kind) => write!(f, "failed ({:?})", kind),
        }
    }
}

/// A marketplace API client with validation, local rate limiting and retries.
///
/// The client is cheap to clone; clones share the connection pool and the
/// token bucket. Separate clients built from the same configuration do not
/// share a bucket.
///
/// # Examples
///
/// ```no_run
/// use mysale_client::endpoint::{CallInput, EndpointSpec};
/// use mysale_client::schema::{Record, Shape};
/// use mysale_client::Client;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), mysale_client::Error> {
/// let client = Client::builder()
///     .base_url("https://api.mysale.example")?
///     .credential("my-api-token")
///     .timeout(Duration::from_secs(10))
///     .build()?;
///
/// let spec = EndpointSpec::get("orders.get", "/v1/orders/{order_id}")
///     .response_shape(Record::new("Order").required("order_id", Shape::Uuid));
///
/// let response = client
///     .execute(&spec, CallInput::new().path_param("order_id", "9f1c4a52-3f0e-4a8e-9a55-0c0b1d2e3f40"))
///     .await?;
/// println!("Order: {:?}", response.data.get("order_id"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    bucket: Arc<TokenBucket>,
    transport: TransportClient,
    headers: HeaderMap,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.inner.config)
            .field("bucket", &self.inner.bucket)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a client over HTTP with the default retry predicate.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(config.base_url.clone())?);
        Self::with_transport(config, transport)
    }

    /// Creates a client that sends through a custom [`Transport`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        Self::assemble(config, transport, Box::new(RetryOnTransient))
    }

    fn assemble(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        retry_predicate: Box<dyn RetryPredicate>,
    ) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_static(concat!("mysale-client/", env!("CARGO_PKG_VERSION"))),
        );
        for (name, value) in &config.default_headers {
            headers.insert(name.clone(), value.clone());
        }
        headers.insert(header::AUTHORIZATION, config.credential.authorization()?);

        let bucket = Arc::new(TokenBucket::new(&config.rate_limit)?);
        let transport = TransportClient::new(
            transport,
            config.retry_policy.clone(),
            retry_predicate,
            config.timeout,
        );

        Ok(Client {
            inner: Arc::new(ClientInner {
                config,
                bucket,
                transport,
                headers,
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The token bucket shared by every call made through this client.
    pub fn rate_limiter(&self) -> &TokenBucket {
        &self.inner.bucket
    }

    /// Order endpoints.
    pub fn orders(&self) -> Orders<'_> {
        Orders::new(self)
    }

    /// Merchant SKU endpoints.
    pub fn skus(&self) -> Skus<'_> {
        Skus::new(self)
    }

    /// Executes one call of `spec`.
    ///
    /// # Errors
    ///
    /// Returns exactly one [`Error`] describing why the call failed. Input
    /// validation and rate-limit configuration errors are raised before
    /// anything is sent.
    pub async fn execute(
        &self,
        spec: &EndpointSpec,
        input: CallInput,
    ) -> Result<Response<ValidatedData>> {
        self.execute_with_cancel(spec, input, &CancellationToken::new())
            .await
    }

    /// Like [`execute`](Self::execute), stopping early with
    /// [`Error::Cancelled`] when `cancel` fires.
    ///
    /// Cancellation is observed while waiting for tokens, during I/O and
    /// during backoff sleeps. Tokens are only spent once granted, so a call
    /// cancelled while throttled leaves the bucket untouched.
    pub async fn execute_with_cancel(
        &self,
        spec: &EndpointSpec,
        input: CallInput,
        cancel: &CancellationToken,
    ) -> Result<Response<ValidatedData>> {
        let endpoint = spec.name();
        let result = self.dispatch(spec, input, cancel).await;

        match &result {
            Ok(response) => tracing::debug!(
                endpoint = endpoint,
                state = %CallState::Succeeded,
                attempts = response.attempts,
                "Call finished"
            ),
            Err(e) => tracing::debug!(
                endpoint = endpoint,
                state = %CallState::Failed(e.kind()),
                error = %e,
                "Call finished"
            ),
        }
        result
    }

    /// Executes a call and deserializes the validated payload into `T`.
    ///
    /// # Errors
    ///
    /// Everything [`execute`](Self::execute) returns, plus
    /// [`Error::SchemaMismatch`] if the payload does not fit `T`.
    pub async fn execute_as<T: DeserializeOwned>(
        &self,
        spec: &EndpointSpec,
        input: CallInput,
    ) -> Result<Response<T>> {
        let response = self.execute(spec, input).await?;
        let request = Arc::clone(&response.request);
        let status = response.status;
        let raw_response = response.raw_body.clone();

        response.try_map(|data| {
            data.deserialize::<T>().map_err(|e| {
                tracing::error!(
                    endpoint = request.endpoint(),
                    error = %e,
                    "Failed to deserialize response"
                );
                Error::SchemaMismatch {
                    request: Arc::clone(&request),
                    status,
                    raw_response,
                    source: SchemaMismatchError::Deserialize {
                        type_name: std::any::type_name::<T>(),
                        message: e.to_string(),
                    },
                }
            })
        })
    }

    async fn dispatch(
        &self,
        spec: &EndpointSpec,
        input: CallInput,
        cancel: &CancellationToken,
    ) -> Result<Response<ValidatedData>> {
        let endpoint = spec.name();
        self.check_cancelled(endpoint, CallState::Pending, cancel)?;

        transition(endpoint, CallState::Validating);
        let (path_params, query, body) = input.into_parts();
        let invalid = |source: ValidationError| Error::Validation {
            endpoint: endpoint.to_string(),
            source,
        };
        let segments = spec.render_path(&path_params).map_err(invalid)?;
        let body = validate_body(spec.request(), body).map_err(invalid)?;

        transition(endpoint, CallState::Throttled);
        let cost = spec.token_cost();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(Error::Cancelled {
                    endpoint: endpoint.to_string(),
                    state: CallState::Throttled,
                    attempts: 0,
                });
            }
            acquired = self.inner.bucket.acquire(cost) => {
                acquired.map_err(|e| Error::from_acquire(endpoint, e))?;
            }
        }

        transition(endpoint, CallState::InFlight);
        let request = Arc::new(RequestDescriptor::new(
            endpoint,
            spec.method().clone(),
            segments,
            query,
            self.inner.headers.clone(),
            body,
            spec.is_idempotent(),
        ));

        let start_time = Instant::now();
        let delivery = match self.inner.transport.send(&request, cancel).await {
            Ok(delivery) => delivery,
            Err(SendError::Cancelled { attempts }) => {
                return Err(Error::Cancelled {
                    endpoint: endpoint.to_string(),
                    state: CallState::InFlight,
                    attempts,
                })
            }
            Err(SendError::Failed { attempts, source }) => {
                return Err(Error::Transport {
                    request,
                    attempts,
                    source,
                })
            }
        };

        self.classify(spec.response(), request, delivery, start_time.elapsed())
    }

    fn classify(
        &self,
        response_shape: Option<&Shape>,
        request: Arc<RequestDescriptor>,
        delivery: Delivery,
        latency: Duration,
    ) -> Result<Response<ValidatedData>> {
        let Delivery { response, attempts } = delivery;
        let status = response.status;

        tracing::info!(
            endpoint = request.endpoint(),
            status = status.as_u16(),
            latency_ms = latency.as_millis() as u64,
            attempts = attempts,
            "Received HTTP response"
        );

        if status.is_server_error() {
            tracing::warn!(
                endpoint = request.endpoint(),
                status = status.as_u16(),
                response = %response.body,
                "Server error (5xx)"
            );
            return Err(Error::HttpServer {
                request,
                status,
                raw_response: response.body,
                headers: response.headers,
                attempts,
            });
        }

        if !status.is_success() {
            tracing::error!(
                endpoint = request.endpoint(),
                status = status.as_u16(),
                response = %response.body,
                "Client error"
            );
            let info = RateLimitInfo::from_headers(&response.headers);
            let rate_limit_info = (info.is_rate_limited()
                || status == http::StatusCode::TOO_MANY_REQUESTS)
                .then_some(info);
            return Err(Error::HttpClient {
                body: serde_json::from_str::<Value>(&response.body).ok(),
                request,
                status,
                raw_response: response.body,
                headers: response.headers,
                rate_limit_info,
                attempts,
            });
        }

        let data = match response_shape {
            Some(shape) => match schema::validate_response(shape, &response.body) {
                Ok(data) => data,
                Err(source) => {
                    tracing::error!(
                        endpoint = request.endpoint(),
                        error = %source,
                        raw_response = %response.body,
                        "Response does not match the declared shape"
                    );
                    return Err(Error::SchemaMismatch {
                        request,
                        status,
                        raw_response: response.body,
                        source,
                    });
                }
            },
            None => schema::validate_response(&Shape::Any, &response.body)
                .unwrap_or_else(|_| ValidatedData::empty()),
        };

        Ok(Response::new(
            data,
            response.body,
            status,
            response.headers,
            latency,
            attempts,
            request,
        ))
    }

    fn check_cancelled(
        &self,
        endpoint: &str,
        state: CallState,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled {
                endpoint: endpoint.to_string(),
                state,
                attempts: 0,
            });
        }
        Ok(())
    }
}

fn transition(endpoint: &str, state: CallState) {
    tracing::debug!(endpoint = endpoint, state = %state, "Call state");
}

fn validate_body(
    shape: Option<&Shape>,
    body: Option<Value>,
) -> std::result::Result<Option<Value>, ValidationError> {
    match (shape, body) {
        (Some(shape), Some(body)) => schema::validate_request(shape, body)
            .map(ValidatedData::into_value)
            .map(Some),
        (Some(shape), None) => Err(ValidationError::new("$", shape.to_string(), "no body")),
        (None, Some(_)) => Err(ValidationError::new(
            "$",
            "no body",
            "a body for an endpoint that does not take one",
        )),
        (None, None) => Ok(None),
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use mysale_client::rate_limit::RateLimitConfig;
/// use mysale_client::retry::{Backoff, RetryPolicy};
/// use mysale_client::ClientBuilder;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), mysale_client::Error> {
/// let client = ClientBuilder::new()
///     .base_url("https://api.mysale.example")?
///     .credential("my-api-token")
///     .timeout(Duration::from_secs(30))
///     .retry_policy(RetryPolicy::new(4, Backoff::Exponential {
///         initial_delay: Duration::from_millis(100),
///         max_delay: Duration::from_secs(10),
///         jitter: true,
///     }))
///     .rate_limit(RateLimitConfig::new(20, 10.0))
///     .default_header("X-Merchant", "acme")?
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    base_url: Option<Url>,
    credential: Option<ApiToken>,
    default_headers: HeaderMap,
    retry_policy: RetryPolicy,
    retry_predicate: Option<Box<dyn RetryPredicate>>,
    timeout: Option<Duration>,
    rate_limit: RateLimitConfig,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            base_url: None,
            credential: None,
            default_headers: HeaderMap::new(),
            retry_policy: RetryPolicy::default(),
            retry_predicate: None,
            timeout: Some(ClientConfig::DEFAULT_TIMEOUT),
            rate_limit: RateLimitConfig::default(),
            transport: None,
        }
    }

    /// Sets the base URL for all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Sets the API token sent as `Authorization: Bearer <token>`.
    pub fn credential(mut self, token: impl Into<ApiToken>) -> Self {
        self.credential = Some(token.into());
        self
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Sets a custom retry predicate.
    ///
    /// By default, [`RetryOnTransient`] is used.
    pub fn retry_predicate(mut self, predicate: Box<dyn RetryPredicate>) -> Self {
        self.retry_predicate = Some(predicate);
        self
    }

    /// Sets the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Lets attempts run without a timeout.
    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }

    /// Replaces the HTTP transport, e.g. with a test double.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if no base URL or credential was provided, or if the
    /// configuration is invalid.
    pub fn build(self) -> Result<Client> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Configuration("Base URL is required".to_string()))?;
        let credential = self
            .credential
            .ok_or_else(|| Error::Configuration("API credential is required".to_string()))?;

        let config = ClientConfig {
            base_url,
            credential,
            timeout: self.timeout,
            retry_policy: self.retry_policy,
            rate_limit: self.rate_limit,
            default_headers: self.default_headers,
        };

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(config.base_url.clone())?),
        };
        let retry_predicate = self
            .retry_predicate
            .unwrap_or_else(|| Box::new(RetryOnTransient));

        Client::assemble(config, transport, retry_predicate)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Record;
    use crate::transport::{RawResponse, TransportFailure};
    use async_trait::async_trait;
    use http::StatusCode;
    use serde_json::json;
    use std::sync::Mutex;

    /// Answers every request with the same response and records what it saw.
    struct Fixed {
        response: RawResponse,
        seen: Mutex<Vec<RequestDescriptor>>,
    }

    impl Fixed {
        fn new(status: StatusCode, body: &str) -> Arc<Self> {
            Arc::new(Self {
                response: RawResponse::new(status, body),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> Vec<RequestDescriptor> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for Fixed {
        async fn send(&self, request: &RequestDescriptor) -> std::result::Result<RawResponse, TransportFailure> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.response.clone())
        }
    }

    fn client(transport: Arc<dyn Transport>) -> Client {
        Client::builder()
            .base_url("https://api.example.com")
            .unwrap()
            .credential("token")
            .transport(transport)
            .build()
            .unwrap()
    }

    fn echo_spec() -> EndpointSpec {
        let shape = Record::new("Ack").required("merchant_order_id", Shape::String);
        EndpointSpec::post("orders.acknowledge", "/v1/orders/{order_id}/acknowledge")
            .request_shape(shape.clone())
            .response_shape(shape)
    }

    #[tokio::test]
    async fn test_validation_failure_sends_nothing_and_spends_no_tokens() {
        let transport = Fixed::new(StatusCode::OK, "{}");
        let client = client(transport.clone());
        let before = client.rate_limiter().available();

        let err = client
            .execute(
                &echo_spec(),
                CallInput::new()
                    .path_param("order_id", "o-1")
                    .body(json!({"merchant_order_id": 7})),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(transport.sent().is_empty());
        assert!(client.rate_limiter().available() >= before);
    }

    #[tokio::test]
    async fn test_missing_body_and_unexpected_body_are_rejected() {
        let transport = Fixed::new(StatusCode::OK, "{}");
        let client = client(transport.clone());

        let err = client
            .execute(&echo_spec(), CallInput::new().path_param("order_id", "o-1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = client
            .execute(
                &EndpointSpec::get("orders.get", "/v1/orders/{order_id}"),
                CallInput::new().path_param("order_id", "o-1").body(json!({})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_request_carries_credential_and_validated_body() {
        let transport = Fixed::new(StatusCode::OK, r#"{"merchant_order_id": "INT-1"}"#);
        let client = client(transport.clone());

        let response = client
            .execute(
                &echo_spec(),
                CallInput::new()
                    .path_param("order_id", "o-1")
                    .body(json!({"merchant_order_id": "INT-1"})),
            )
            .await
            .unwrap();

        assert_eq!(response.data.get("merchant_order_id"), Some(&json!("INT-1")));

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].path(), "/v1/orders/o-1/acknowledge");
        assert!(!sent[0].is_idempotent());
        assert_eq!(
            sent[0].headers().get(header::AUTHORIZATION).unwrap(),
            "Bearer token"
        );
        assert_eq!(sent[0].body(), Some(&json!({"merchant_order_id": "INT-1"})));
    }

    #[tokio::test]
    async fn test_cost_above_capacity_is_a_configuration_error() {
        let transport = Fixed::new(StatusCode::OK, "{}");
        let client = client(transport.clone());

        let spec = EndpointSpec::get("skus.list", "/v1/merchant-skus").cost(100);
        let err = client.execute(&spec, CallInput::new()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::RateLimitConfiguration);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_empty_body_without_response_shape() {
        let transport = Fixed::new(StatusCode::NO_CONTENT, "");
        let client = client(transport);

        let spec = EndpointSpec::post("skus.enable", "/v1/merchant-skus/{id}/enable");
        let response = client
            .execute(&spec, CallInput::new().path_param("id", "SKU-1"))
            .await
            .unwrap();
        assert_eq!(response.data.as_value(), &Value::Null);
        assert_eq!(response.status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let transport = Fixed::new(StatusCode::OK, "{}");
        let client = client(transport.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client
            .execute_with_cancel(&EndpointSpec::get("a", "/a"), CallInput::new(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Cancelled {
                state: CallState::Pending,
                ..
            }
        ));
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_builder_requires_credential() {
        let err = Client::builder()
            .base_url("https://api.example.com")
            .unwrap()
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_call_state_display() {
        assert_eq!(CallState::Throttled.to_string(), "throttled");
        assert_eq!(
            CallState::Failed(ErrorKind::Timeout).to_string(),
            "failed (Timeout)"
        );
    }
}
