//! # mysale-client - A validated, rate-limited marketplace API client
//!
//! `mysale-client` is an async client for the MySale merchant API built on top
//! of `reqwest`. Every call is checked against a declared schema before it is
//! sent, throttled by a local token bucket, retried on transient failures, and
//! validated again on the way back.
//!
//! ## Quick Start
//!
//! ```no_run
//! use mysale_client::resources::orders::{AcknowledgementItem, OrderAcknowledgement};
//! use mysale_client::resources::Page;
//! use mysale_client::Client;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), mysale_client::Error> {
//!     let client = Client::builder()
//!         .base_url("https://api.mysale.example")?
//!         .credential("my-api-token")
//!         .timeout(Duration::from_secs(30))
//!         .build()?;
//!
//!     let queue = client.orders().list_new(Page::default()).await?;
//!     println!("{} new orders", queue.data.len());
//!
//!     for item in queue.data.iter() {
//!         let order_id = item.order_id.to_string();
//!         let order = client.orders().get(&order_id).await?;
//!         println!("Order {} took {:?}", order.customer_order_reference, order.latency);
//!
//!         let acknowledgement = OrderAcknowledgement {
//!             merchant_order_id: format!("INT-{}", order.customer_order_reference),
//!             order_items: order
//!                 .order_items
//!                 .iter()
//!                 .enumerate()
//!                 .map(|(i, item)| AcknowledgementItem {
//!                     order_item_id: item.order_item_id,
//!                     merchant_order_item_id: format!("INT-{}-{}", order.customer_order_reference, i + 1),
//!                 })
//!                 .collect(),
//!         };
//!         client.orders().acknowledge(&order_id, &acknowledgement).await?;
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Calling Any Endpoint
//!
//! The resource methods are thin wrappers over [`Client::execute`], which
//! takes an [`EndpointSpec`](endpoint::EndpointSpec) and a
//! [`CallInput`](endpoint::CallInput):
//!
//! ```no_run
//! use mysale_client::endpoint::{CallInput, EndpointSpec};
//! use mysale_client::schema::{Record, Shape};
//! use mysale_client::{Client, Error};
//!
//! # async fn example(client: Client) -> Result<(), Error> {
//! let spec = EndpointSpec::get("skus.statistics", "/v1/merchant-skus/statistics")
//!     .response_shape(Record::new("SkuStatistics").required("total", Shape::Integer));
//!
//! match client.execute(&spec, CallInput::new()).await {
//!     Ok(response) => println!("Total SKUs: {:?}", response.data.get("total")),
//!     Err(Error::SchemaMismatch { raw_response, source, .. }) => {
//!         eprintln!("Unexpected payload: {}", source);
//!         eprintln!("  Raw response: {}", raw_response);
//!     }
//!     Err(Error::HttpClient { status, raw_response, .. }) => {
//!         eprintln!("HTTP error {}: {}", status, raw_response);
//!     }
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Retries and Rate Limiting
//!
//! ```no_run
//! use http::StatusCode;
//! use mysale_client::rate_limit::{RateLimitConfig, WaitPolicy};
//! use mysale_client::retry::{Backoff, OrPredicate, RetryOnStatus, RetryOnTransient, RetryPolicy};
//! use mysale_client::Client;
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), mysale_client::Error> {
//! let client = Client::builder()
//!     .base_url("https://api.mysale.example")?
//!     .credential("my-api-token")
//!     .retry_policy(RetryPolicy::new(5, Backoff::Exponential {
//!         initial_delay: Duration::from_millis(100),
//!         max_delay: Duration::from_secs(30),
//!         jitter: true,
//!     }))
//!     .retry_predicate(Box::new(OrPredicate::new(vec![
//!         Box::new(RetryOnTransient),
//!         Box::new(RetryOnStatus(vec![StatusCode::TOO_MANY_REQUESTS])),
//!     ])))
//!     .rate_limit(
//!         RateLimitConfig::builder()
//!             .capacity(20)
//!             .refill_rate(10.0)
//!             .wait_policy(WaitPolicy::FailFast)
//!             .build(),
//!     )
//!     .build()?;
//! # Ok(())
//! # }
//! ```
//!
//! Writes are only retried when the request provably never left the client;
//! reads are also retried on timeouts, network errors and 5xx responses.

mod client;
pub mod config;
pub mod endpoint;
mod error;
pub mod metadata;
pub mod rate_limit;
pub mod resources;
mod response;
pub mod retry;
pub mod schema;
pub mod transport;

pub use client::{CallState, Client, ClientBuilder};
pub use config::{ApiToken, ClientConfig};
pub use error::{Error, ErrorKind, Result};
pub use response::Response;
pub use retry::{RetryPolicy, RetryPredicate};
