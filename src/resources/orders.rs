//! Orders: lookup, status queues, acknowledgement, shipments and cancellations.

use super::{created_id, money_shape, with_body, Page, Paginated};
use crate::endpoint::{CallInput, EndpointSpec};
use crate::schema::{Constraint, Field, Record, Shape, ValidatedData};
use crate::{Client, Response, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The order queues the API can list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    New,
    Acknowledged,
    #[serde(rename = "inprogress")]
    InProgress,
    Completed,
    /// New, acknowledged or in progress.
    Incomplete,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Acknowledged => "acknowledged",
            OrderStatus::InProgress => "inprogress",
            OrderStatus::Completed => "completed",
            OrderStatus::Incomplete => "incomplete",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub currency: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub address_line: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suburb: Option<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub postcode: String,
    pub country_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub order_item_id: Uuid,
    pub sku_id: Uuid,
    pub merchant_sku_id: String,
    pub sku_qty: u32,
    pub item_sell_price: Price,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_shipping_price: Option<Price>,
}

/// A full order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: Uuid,
    pub customer_order_reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_order_id: Option<String>,
    pub order_status: String,
    pub order_date: String,
    pub recipient: Recipient,
    pub order_items: Vec<OrderItem>,
    pub order_shipping_price: Price,
}

/// One entry of an order queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderListItem {
    pub order_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcknowledgementItem {
    pub order_item_id: Uuid,
    pub merchant_order_item_id: String,
}

/// Confirms the merchant has taken an order, assigning internal references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAcknowledgement {
    pub merchant_order_id: String,
    #[serde(default)]
    pub order_items: Vec<AcknowledgementItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentItem {
    pub merchant_shipment_item_id: String,
    pub merchant_sku_id: String,
    pub sku_id: Uuid,
    pub sku_qty: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentCreate {
    pub merchant_shipment_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    pub carrier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier_shipment_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_option: Option<String>,
    pub dispatch_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_delivery_date: Option<String>,
    pub shipment_items: Vec<ShipmentItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub shipment_id: Uuid,
    #[serde(default)]
    pub merchant_shipment_id: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub dispatch_date: Option<String>,
    #[serde(default)]
    pub shipment_items: Vec<ShipmentItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentList {
    pub shipments: Vec<Shipment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelledItem {
    pub merchant_cancel_item_id: String,
    pub merchant_sku_id: String,
    pub sku_id: Uuid,
    pub sku_qty: u32,
    /// E.g. `no_stock`.
    pub cancellation_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationCreate {
    pub cancelled_items: Vec<CancelledItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cancellation {
    pub cancellation_id: Uuid,
    #[serde(default)]
    pub cancelled_items: Vec<CancelledItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationList {
    pub cancellations: Vec<Cancellation>,
}

fn price_shape() -> Shape {
    money_shape("Price", "amount")
}

fn quantity() -> Field {
    Field::required("sku_qty", Shape::Integer).constraint(Constraint::Min(1.0))
}

fn non_empty(name: &str) -> Field {
    Field::required(name, Shape::String).constraint(Constraint::MinLength(1))
}

pub fn order_shape() -> Shape {
    let address = Record::new("Address")
        .required("address_line", Shape::String)
        .optional("suburb", Shape::String)
        .required("city", Shape::String)
        .optional("state", Shape::String)
        .required("postcode", Shape::String)
        .required("country_code", Shape::String);

    let recipient = Record::new("Recipient")
        .required("name", Shape::String)
        .optional("email", Shape::String)
        .optional("phone_number", Shape::String)
        .required("address", address);

    let item = Record::new("OrderItem")
        .required("order_item_id", Shape::Uuid)
        .required("sku_id", Shape::Uuid)
        .required("merchant_sku_id", Shape::String)
        .field(Field::required("sku_qty", Shape::Integer).constraint(Constraint::Min(0.0)))
        .required("item_sell_price", price_shape())
        .optional("item_shipping_price", price_shape());

    Record::new("Order")
        .required("order_id", Shape::Uuid)
        .required("customer_order_reference", Shape::String)
        .optional("merchant_order_id", Shape::String)
        .required("order_status", Shape::String)
        .required("order_date", Shape::String)
        .required("recipient", recipient)
        .required("order_items", Shape::array(item))
        .required("order_shipping_price", price_shape())
        .into()
}

fn acknowledgement_shape() -> Shape {
    let item = Record::new("AcknowledgementItem")
        .required("order_item_id", Shape::Uuid)
        .field(non_empty("merchant_order_item_id"));

    Record::new("OrderAcknowledgement")
        .field(non_empty("merchant_order_id"))
        .optional("order_items", Shape::array(item))
        .into()
}

fn shipment_item_shape() -> Record {
    Record::new("ShipmentItem")
        .field(non_empty("merchant_shipment_item_id"))
        .field(non_empty("merchant_sku_id"))
        .required("sku_id", Shape::Uuid)
        .field(quantity())
}

fn shipment_create_shape() -> Shape {
    Record::new("ShipmentCreate")
        .field(non_empty("merchant_shipment_id"))
        .optional("tracking_number", Shape::String)
        .field(non_empty("carrier"))
        .optional("carrier_shipment_method", Shape::String)
        .optional("delivery_option", Shape::String)
        .required("dispatch_date", Shape::String)
        .optional("expected_delivery_date", Shape::String)
        .field(
            Field::required("shipment_items", Shape::array(shipment_item_shape()))
                .constraint(Constraint::MinLength(1)),
        )
        .into()
}

fn shipment_shape() -> Record {
    Record::new("Shipment")
        .required("shipment_id", Shape::Uuid)
        .optional("merchant_shipment_id", Shape::String)
        .optional("tracking_number", Shape::String)
        .optional("carrier", Shape::String)
        .optional("dispatch_date", Shape::String)
        .optional("shipment_items", Shape::array(shipment_item_shape()))
}

fn shipment_list_shape() -> Shape {
    Record::new("ShipmentList")
        .required("shipments", Shape::array(shipment_shape()))
        .into()
}

fn cancelled_item_shape() -> Record {
    Record::new("CancelledItem")
        .field(non_empty("merchant_cancel_item_id"))
        .field(non_empty("merchant_sku_id"))
        .required("sku_id", Shape::Uuid)
        .field(quantity())
        .field(non_empty("cancellation_reason"))
}

fn cancellation_create_shape() -> Shape {
    Record::new("CancellationCreate")
        .field(
            Field::required("cancelled_items", Shape::array(cancelled_item_shape()))
                .constraint(Constraint::MinLength(1)),
        )
        .into()
}

fn cancellation_shape() -> Record {
    Record::new("Cancellation")
        .required("cancellation_id", Shape::Uuid)
        .optional("cancelled_items", Shape::array(cancelled_item_shape()))
}

fn cancellation_list_shape() -> Shape {
    Record::new("CancellationList")
        .required("cancellations", Shape::array(cancellation_shape()))
        .into()
}

pub fn get_spec() -> EndpointSpec {
    EndpointSpec::get("orders.get", "/v1/orders/{order_id}").response_shape(order_shape())
}

pub fn list_spec(status: OrderStatus) -> EndpointSpec {
    let item = Record::new("OrderListItem").required("order_id", Shape::Uuid);
    EndpointSpec::get(
        format!("orders.list_{}", status),
        format!("/v1/orders/{}", status),
    )
    .response_shape(Shape::array(item))
}

pub fn acknowledge_spec() -> EndpointSpec {
    EndpointSpec::put("orders.acknowledge", "/v1/orders/{order_id}/acknowledge")
        .request_shape(acknowledgement_shape())
}

pub fn create_shipment_spec() -> EndpointSpec {
    EndpointSpec::post("orders.create_shipment", "/v1/orders/{order_id}/shipments")
        .request_shape(shipment_create_shape())
}

pub fn list_shipments_spec() -> EndpointSpec {
    EndpointSpec::get("orders.list_shipments", "/v1/orders/{order_id}/shipments")
        .response_shape(shipment_list_shape())
}

pub fn get_shipment_spec() -> EndpointSpec {
    EndpointSpec::get(
        "orders.get_shipment",
        "/v1/orders/{order_id}/shipments/{shipment_id}",
    )
    .response_shape(shipment_shape())
}

/// Replaces the shipment as a whole, so a repeat leaves the same state.
pub fn update_shipment_spec() -> EndpointSpec {
    EndpointSpec::put(
        "orders.update_shipment",
        "/v1/orders/{order_id}/shipments/{shipment_id}",
    )
    .request_shape(shipment_create_shape())
    .idempotent(true)
}

pub fn list_cancellations_spec() -> EndpointSpec {
    EndpointSpec::get(
        "orders.list_cancellations",
        "/v1/orders/{order_id}/cancellations",
    )
    .response_shape(cancellation_list_shape())
}

pub fn get_cancellation_spec() -> EndpointSpec {
    EndpointSpec::get(
        "orders.get_cancellation",
        "/v1/orders/{order_id}/cancellations/{cancellation_id}",
    )
    .response_shape(cancellation_shape())
}

pub fn create_cancellation_spec() -> EndpointSpec {
    EndpointSpec::post(
        "orders.create_cancellation",
        "/v1/orders/{order_id}/cancellations",
    )
    .request_shape(cancellation_create_shape())
}

/// Order endpoints, borrowed from a [`Client`] via [`Client::orders`].
///
/// # Examples
///
/// ```no_run
/// use mysale_client::resources::Page;
/// use mysale_client::Client;
///
/// # async fn example(client: Client) -> mysale_client::Result<()> {
/// let queue = client.orders().list_new(Page::default()).await?;
/// for item in queue.data.iter() {
///     let order = client.orders().get(&item.order_id.to_string()).await?;
///     println!("{} ({})", order.customer_order_reference, order.order_status);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Orders<'a> {
    client: &'a Client,
}

impl<'a> Orders<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn get(&self, order_id: &str) -> Result<Response<Order>> {
        self.client
            .execute_as(&get_spec(), CallInput::new().path_param("order_id", order_id))
            .await
    }

    /// Lists one order queue.
    pub async fn list(
        &self,
        status: OrderStatus,
        page: Page,
    ) -> Result<Response<Vec<OrderListItem>>> {
        let spec = list_spec(status);
        page.check(&spec)?;
        self.client
            .execute_as(&spec, page.apply(CallInput::new()))
            .await
    }

    /// Like [`list`](Self::list), with paging metadata for walking the queue.
    pub async fn list_page(
        &self,
        status: OrderStatus,
        page: Page,
    ) -> Result<Response<Paginated<OrderListItem>>> {
        let response = self.list(status, page).await?;
        Ok(Paginated::from_response(response, page))
    }

    pub async fn list_new(&self, page: Page) -> Result<Response<Vec<OrderListItem>>> {
        self.list(OrderStatus::New, page).await
    }

    pub async fn list_acknowledged(&self, page: Page) -> Result<Response<Vec<OrderListItem>>> {
        self.list(OrderStatus::Acknowledged, page).await
    }

    pub async fn list_in_progress(&self, page: Page) -> Result<Response<Vec<OrderListItem>>> {
        self.list(OrderStatus::InProgress, page).await
    }

    pub async fn list_completed(&self, page: Page) -> Result<Response<Vec<OrderListItem>>> {
        self.list(OrderStatus::Completed, page).await
    }

    pub async fn list_incomplete(&self, page: Page) -> Result<Response<Vec<OrderListItem>>> {
        self.list(OrderStatus::Incomplete, page).await
    }

    pub async fn acknowledge(
        &self,
        order_id: &str,
        acknowledgement: &OrderAcknowledgement,
    ) -> Result<Response<ValidatedData>> {
        let spec = acknowledge_spec();
        let input = with_body(&spec, order_input(order_id), acknowledgement)?;
        self.client.execute(&spec, input).await
    }

    /// Creates a shipment and returns its identifier.
    pub async fn create_shipment(
        &self,
        order_id: &str,
        shipment: &ShipmentCreate,
    ) -> Result<Response<String>> {
        let spec = create_shipment_spec();
        let input = with_body(&spec, order_input(order_id), shipment)?;
        self.client.execute(&spec, input).await.map(created_id)
    }

    pub async fn update_shipment(
        &self,
        order_id: &str,
        shipment_id: &str,
        shipment: &ShipmentCreate,
    ) -> Result<Response<ValidatedData>> {
        let spec = update_shipment_spec();
        let input = order_input(order_id).path_param("shipment_id", shipment_id);
        let input = with_body(&spec, input, shipment)?;
        self.client.execute(&spec, input).await
    }

    pub async fn list_shipments(&self, order_id: &str) -> Result<Response<ShipmentList>> {
        self.client
            .execute_as(&list_shipments_spec(), order_input(order_id))
            .await
    }

    pub async fn get_shipment(&self, order_id: &str, shipment_id: &str) -> Result<Response<Shipment>> {
        self.client
            .execute_as(
                &get_shipment_spec(),
                order_input(order_id).path_param("shipment_id", shipment_id),
            )
            .await
    }

    /// Cancels some or all order items and returns the cancellation identifier.
    pub async fn create_cancellation(
        &self,
        order_id: &str,
        cancellation: &CancellationCreate,
    ) -> Result<Response<String>> {
        let spec = create_cancellation_spec();
        let input = with_body(&spec, order_input(order_id), cancellation)?;
        self.client.execute(&spec, input).await.map(created_id)
    }

    pub async fn list_cancellations(&self, order_id: &str) -> Result<Response<CancellationList>> {
        self.client
            .execute_as(&list_cancellations_spec(), order_input(order_id))
            .await
    }

    pub async fn get_cancellation(
        &self,
        order_id: &str,
        cancellation_id: &str,
    ) -> Result<Response<Cancellation>> {
        self.client
            .execute_as(
                &get_cancellation_spec(),
                order_input(order_id).path_param("cancellation_id", cancellation_id),
            )
            .await
    }
}

fn order_input(order_id: &str) -> CallInput {
    CallInput::new().path_param("order_id", order_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{validate_request, validate_response};
    use serde_json::json;

    fn order_json() -> serde_json::Value {
        json!({
            "order_id": "9F1C4A52-3F0E-4A8E-9A55-0C0B1D2E3F40",
            "customer_order_reference": "CO-1001",
            "order_status": "new",
            "order_date": "2024-05-01T10:00:00Z",
            "recipient": {
                "name": "Jane Citizen",
                "email": "jane@example.com",
                "address": {
                    "address_line": "1 George St",
                    "city": "Sydney",
                    "state": "NSW",
                    "postcode": "2000",
                    "country_code": "AU"
                }
            },
            "order_items": [{
                "order_item_id": "1b4e28ba-2fa1-11d2-883f-0016d3cca427",
                "sku_id": "6fa459ea-ee8a-3ca4-894e-db77e160355e",
                "merchant_sku_id": "TSHIRT-BLUE-M",
                "sku_qty": "2",
                "item_sell_price": {"currency": "AUD", "amount": "29.99"}
            }],
            "order_shipping_price": {"currency": "AUD", "amount": 0}
        })
    }

    #[test]
    fn test_order_shape_coerces_into_model() {
        let data = validate_response(&order_shape(), &order_json().to_string()).unwrap();
        let order: Order = data.deserialize().unwrap();

        assert_eq!(order.order_items[0].sku_qty, 2);
        assert_eq!(order.order_items[0].item_sell_price.amount, 29.99);
        assert_eq!(
            order.order_id.to_string(),
            "9f1c4a52-3f0e-4a8e-9a55-0c0b1d2e3f40"
        );
        assert_eq!(order.recipient.address.suburb, None);
    }

    #[test]
    fn test_order_shape_reports_nested_path() {
        let mut body = order_json();
        body["order_items"][0]["sku_id"] = json!("not-a-uuid");

        let err = validate_response(&order_shape(), &body.to_string()).unwrap_err();
        assert!(err.to_string().contains("$.order_items[0].sku_id"));
    }

    #[test]
    fn test_shipment_requires_items() {
        let shipment = ShipmentCreate {
            merchant_shipment_id: "SHIP-1".into(),
            tracking_number: Some("TR1".into()),
            carrier: "Australia Post".into(),
            carrier_shipment_method: None,
            delivery_option: None,
            dispatch_date: "2024-05-02".into(),
            expected_delivery_date: None,
            shipment_items: vec![],
        };

        let err = validate_request(&shipment_create_shape(), serde_json::to_value(&shipment).unwrap())
            .unwrap_err();
        assert_eq!(err.field, "$.shipment_items");
    }

    #[test]
    fn test_list_spec_per_status() {
        let spec = list_spec(OrderStatus::InProgress);
        assert_eq!(spec.name(), "orders.list_inprogress");
        assert_eq!(spec.path_template(), "/v1/orders/inprogress");
        assert!(spec.is_idempotent());
        assert!(!acknowledge_spec().is_idempotent());
    }

    #[test]
    fn test_shipment_and_cancellation_lookups_take_both_ids() {
        assert_eq!(
            get_shipment_spec().path_params().collect::<Vec<_>>(),
            vec!["order_id", "shipment_id"]
        );
        assert_eq!(
            get_cancellation_spec().path_params().collect::<Vec<_>>(),
            vec!["order_id", "cancellation_id"]
        );
        assert_eq!(update_shipment_spec().method(), &http::Method::PUT);
        assert!(update_shipment_spec().is_idempotent());
        assert!(!create_cancellation_spec().is_idempotent());
    }

    #[test]
    fn test_cancellation_list_shape_into_model() {
        let body = json!({
            "cancellations": [{
                "cancellation_id": "0e3b1f7a-5b8c-4d2e-9f10-a1b2c3d4e5f6",
                "cancelled_items": [{
                    "merchant_cancel_item_id": "CANCEL-CO-1001-1",
                    "merchant_sku_id": "TSHIRT-BLUE-M",
                    "sku_id": "6fa459ea-ee8a-3ca4-894e-db77e160355e",
                    "sku_qty": 1,
                    "cancellation_reason": "no_stock"
                }]
            }, {
                "cancellation_id": "7c9e6679-7425-40de-944b-e07fc1f90ae7"
            }]
        });

        let data = validate_response(&cancellation_list_shape(), &body.to_string()).unwrap();
        let list: CancellationList = data.deserialize().unwrap();
        assert_eq!(list.cancellations.len(), 2);
        assert_eq!(list.cancellations[0].cancelled_items[0].cancellation_reason, "no_stock");
        assert!(list.cancellations[1].cancelled_items.is_empty());
    }
}
