//! Typed access to the marketplace endpoints.
//!
//! Each resource is a thin borrow of a [`Client`](crate::Client) whose
//! methods pair an [`EndpointSpec`](crate::endpoint::EndpointSpec) with a
//! serde model and its matching [`Shape`](crate::schema::Shape), then go
//! through [`Client::execute_as`](crate::Client::execute_as).

pub mod orders;
pub mod skus;

pub use orders::Orders;
pub use skus::Skus;

use crate::endpoint::{CallInput, EndpointSpec};
use crate::schema::{Record, Shape, ValidatedData, ValidationError};
use crate::{Error, Response, Result};
use serde::Serialize;
use serde_json::Value;

/// Header some list endpoints use to report the size of the whole collection.
pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

/// Offset/limit paging for list endpoints.
///
/// # Examples
///
/// ```
/// use mysale_client::resources::Page;
///
/// let page = Page::default();
/// assert_eq!((page.offset, page.limit), (0, 50));
/// assert_eq!(page.next().offset, 50);
/// assert!(Page::new(0, 0).validate().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u32,
    pub limit: u32,
}

impl Page {
    /// Largest `limit` the API accepts.
    pub const MAX_LIMIT: u32 = 500;

    pub fn new(offset: u32, limit: u32) -> Self {
        Self { offset, limit }
    }

    /// The page after this one.
    pub fn next(&self) -> Self {
        Self {
            offset: self.offset.saturating_add(self.limit),
            limit: self.limit,
        }
    }

    /// Checks that `limit` is within `1..=500`.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if !(1..=Self::MAX_LIMIT).contains(&self.limit) {
            return Err(ValidationError::new(
                "query.limit",
                format!("integer between 1 and {}", Self::MAX_LIMIT),
                self.limit.to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn apply(&self, input: CallInput) -> CallInput {
        input.query("offset", self.offset).query("limit", self.limit)
    }

    pub(crate) fn check(&self, spec: &EndpointSpec) -> Result<()> {
        self.validate().map_err(|source| Error::Validation {
            endpoint: spec.name().to_string(),
            source,
        })
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// One page of a list endpoint, with enough context to fetch the next.
///
/// # Examples
///
/// ```no_run
/// use mysale_client::resources::orders::OrderStatus;
/// use mysale_client::resources::Page;
/// use mysale_client::Client;
///
/// # async fn example(client: Client) -> mysale_client::Result<()> {
/// let mut page = Some(Page::new(0, 100));
/// while let Some(current) = page {
///     let batch = client.orders().list_page(OrderStatus::Completed, current).await?;
///     println!("{} orders at offset {}", batch.items.len(), batch.offset);
///     page = batch.next_page();
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub offset: u32,
    pub limit: u32,
    /// Size of the whole collection, when the server reports it.
    pub total_count: Option<u64>,
    /// A full page came back, so there may be more.
    pub has_more: bool,
}

impl<T> Paginated<T> {
    /// Wraps a list response fetched with `page`.
    pub fn from_response(response: Response<Vec<T>>, page: Page) -> Response<Paginated<T>> {
        let total_count = response
            .header(TOTAL_COUNT_HEADER)
            .and_then(|v| v.trim().parse().ok());
        response.map(|items| {
            let fetched = items.len() as u64;
            let has_more = match total_count {
                Some(total) => u64::from(page.offset) + fetched < total,
                None => fetched >= u64::from(page.limit),
            };
            Paginated {
                items,
                offset: page.offset,
                limit: page.limit,
                total_count,
                has_more,
            }
        })
    }

    /// The following page, or `None` once the collection is exhausted.
    pub fn next_page(&self) -> Option<Page> {
        self.has_more
            .then(|| Page::new(self.offset, self.limit).next())
            .filter(|next| next.offset != self.offset)
    }
}

/// `{currency, <amount_key>}` money records. Orders say `amount`, SKU
/// prices say `value`.
pub(crate) fn money_shape(name: &str, amount_key: &str) -> Shape {
    Record::new(name)
        .required("currency", Shape::String)
        .required(amount_key, Shape::Number)
        .into()
}

/// Create endpoints answer with the new identifier, either as a JSON string
/// or as a bare text body.
pub(crate) fn created_id(response: Response<ValidatedData>) -> Response<String> {
    let raw = response.raw_body.trim().to_string();
    response.map(|data| match data.into_value() {
        Value::String(id) => id,
        Value::Null => raw,
        other => other.to_string(),
    })
}

pub(crate) fn with_body<T: Serialize>(
    spec: &EndpointSpec,
    input: CallInput,
    body: &T,
) -> Result<CallInput> {
    input.json(body).map_err(|source| Error::Validation {
        endpoint: spec.name().to_string(),
        source,
    })
}
