//! Dispatch tests over a scripted transport, with tokio's clock paused.

use async_trait::async_trait;
use http::StatusCode;
use mysale_client::endpoint::{CallInput, EndpointSpec};
use mysale_client::metadata::RequestDescriptor;
use mysale_client::rate_limit::RateLimitConfig;
use mysale_client::retry::{Backoff, RetryPolicy};
use mysale_client::schema::{Record, Shape};
use mysale_client::transport::{RawResponse, Transport, TransportFailure};
use mysale_client::{Client, ClientConfig, Error, ErrorKind};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

enum Step {
    Reply(u16, &'static str),
    Refused,
    Reset,
    DroppedMidBody,
}

/// Plays back a script, then keeps answering `200 {"id":1}`. Records when
/// each request arrived.
struct Scripted {
    steps: Mutex<VecDeque<Step>>,
    arrivals: Mutex<Vec<Instant>>,
}

impl Scripted {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            arrivals: Mutex::new(Vec::new()),
        })
    }

    fn arrivals(&self) -> Vec<Instant> {
        self.arrivals.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for Scripted {
    async fn send(&self, _request: &RequestDescriptor) -> Result<RawResponse, TransportFailure> {
        self.arrivals.lock().unwrap().push(Instant::now());
        match self.steps.lock().unwrap().pop_front() {
            Some(Step::Reply(status, body)) => Ok(RawResponse::new(
                StatusCode::from_u16(status).unwrap(),
                body,
            )),
            Some(Step::Refused) => Err(TransportFailure::Connect("connection refused".into())),
            Some(Step::Reset) => Err(TransportFailure::Reset("connection reset by peer".into())),
            Some(Step::DroppedMidBody) => Err(TransportFailure::Network("connection closed before message completed".into())),
            None => Ok(RawResponse::new(StatusCode::OK, r#"{"id":1}"#)),
        }
    }
}

fn client(transport: Arc<Scripted>, rate_limit: RateLimitConfig) -> Client {
    let mut config = ClientConfig::new(Url::parse("https://api.example.com").unwrap(), "token");
    config.rate_limit = rate_limit;
    config.retry_policy = RetryPolicy::new(3, Backoff::Fixed(Duration::from_millis(50)));
    Client::with_transport(config, transport).unwrap()
}

fn create_spec() -> EndpointSpec {
    EndpointSpec::post("things.create", "/v1/things")
        .request_shape(Record::new("NewThing").required("name", Shape::String))
        .response_shape(Record::new("Thing").required("id", Shape::Integer))
}

#[tokio::test(start_paused = true)]
async fn test_write_retried_after_refused_connection() {
    let transport = Scripted::new(vec![Step::Refused, Step::Reply(201, r#"{"id":7}"#)]);
    let client = client(transport.clone(), RateLimitConfig::default());

    let response = client
        .execute(&create_spec(), CallInput::new().body(json!({"name": "a"})))
        .await
        .unwrap();

    assert_eq!(response.data.get("id"), Some(&json!(7)));
    assert_eq!(response.attempts, 2);
    assert_eq!(transport.arrivals().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_write_retried_after_connection_reset() {
    let transport = Scripted::new(vec![Step::Reset, Step::Reply(200, r#"{"id":1}"#)]);
    let client = client(transport.clone(), RateLimitConfig::default());

    let response = client
        .execute(&create_spec(), CallInput::new().body(json!({"name": "a"})))
        .await
        .unwrap();

    assert_eq!(response.data.get("id"), Some(&json!(1)));
    assert_eq!(response.attempts, 2);
    assert_eq!(transport.arrivals().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_write_not_retried_after_mid_body_drop() {
    let transport = Scripted::new(vec![Step::DroppedMidBody]);
    let client = client(transport.clone(), RateLimitConfig::default());

    let err = client
        .execute(&create_spec(), CallInput::new().body(json!({"name": "a"})))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Network);
    assert_eq!(err.attempts(), Some(1));
    assert!(matches!(
        err,
        Error::Transport {
            source: TransportFailure::Network(_),
            ..
        }
    ));
    assert_eq!(transport.arrivals().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_read_retried_after_dropped_connection_and_503() {
    let transport = Scripted::new(vec![
        Step::DroppedMidBody,
        Step::Reply(503, ""),
        Step::Reply(200, r#"{"id":3}"#),
    ]);
    let client = client(transport.clone(), RateLimitConfig::default());

    let spec = EndpointSpec::get("things.get", "/v1/things/{id}")
        .response_shape(Record::new("Thing").required("id", Shape::Integer));
    let response = client
        .execute(&spec, CallInput::new().path_param("id", 3))
        .await
        .unwrap();

    assert_eq!(response.attempts, 3);
    assert_eq!(response.data.get("id"), Some(&json!(3)));
}

#[tokio::test(start_paused = true)]
async fn test_sends_never_exceed_bucket_bound() {
    const CAPACITY: u32 = 4;
    const RATE: f64 = 2.0;

    let transport = Scripted::new(vec![]);
    let client = client(transport.clone(), RateLimitConfig::new(CAPACITY, RATE));
    let spec = EndpointSpec::get("things.list", "/v1/things");

    let start = Instant::now();
    let calls = (0..20).map(|_| {
        let client = client.clone();
        let spec = spec.clone();
        tokio::spawn(async move { client.execute(&spec, CallInput::new()).await })
    });
    for call in calls.collect::<Vec<_>>() {
        call.await.unwrap().unwrap();
    }

    let arrivals: Vec<f64> = transport
        .arrivals()
        .iter()
        .map(|t| t.duration_since(start).as_secs_f64())
        .collect();
    assert_eq!(arrivals.len(), 20);

    for &from in &arrivals {
        for window in [0.0, 0.5, 1.0, 2.5, 5.0] {
            let granted = arrivals
                .iter()
                .filter(|&&t| t >= from && t <= from + window)
                .count();
            assert!(
                granted as f64 <= f64::from(CAPACITY) + RATE * window + 1e-6,
                "{} sends within {}s of {}s",
                granted,
                window,
                from
            );
        }
    }

    // 20 calls at 4 burst + 2/s need 8s.
    let last = arrivals.iter().cloned().fold(0.0, f64::max);
    assert!(last >= 8.0 - 1e-3);
}

#[tokio::test(start_paused = true)]
async fn test_zero_cost_calls_bypass_the_bucket() {
    let transport = Scripted::new(vec![]);
    let client = client(transport.clone(), RateLimitConfig::new(1, 0.01));
    let spec = EndpointSpec::get("things.list", "/v1/things");

    client.execute(&spec, CallInput::new()).await.unwrap();
    let drained = client.rate_limiter().available();

    let free = spec.clone().cost(0);
    let start = Instant::now();
    for _ in 0..5 {
        client.execute(&free, CallInput::new()).await.unwrap();
    }

    assert!(start.elapsed() < Duration::from_millis(1));
    assert!(client.rate_limiter().available() >= drained);
}
