//! Merchant SKUs: catalogue entries, prices, inventory, images and attributes.

use super::{money_shape, with_body, Page, Paginated};
use crate::endpoint::{CallInput, EndpointSpec};
use crate::schema::{Constraint, Field, Record, Shape, ValidatedData};
use crate::{Client, Response, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weight {
    pub value: f64,
    /// E.g. `kg`.
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub height: f64,
    pub width: f64,
    pub length: f64,
    pub unit: String,
}

/// A SKU as sent to the API when creating or updating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkuWrite {
    pub merchant_sku_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// ISO 3166-1 alpha-2.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_of_origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<Weight>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<Volume>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxonomy_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

impl SkuWrite {
    pub fn new(merchant_sku_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            merchant_sku_id: merchant_sku_id.into(),
            name: name.into(),
            description: None,
            country_of_origin: None,
            weight: None,
            volume: None,
            taxonomy_id: None,
            brand: None,
            size: None,
        }
    }
}

/// A SKU as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkuRead {
    pub sku_id: Uuid,
    pub merchant_sku_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub taxonomy_id: Option<Uuid>,
    #[serde(default)]
    pub weight: Option<Weight>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub archived: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkuListItem {
    pub merchant_sku_id: String,
    #[serde(default)]
    pub sku_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceValue {
    pub currency: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkuPrice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<PriceValue>,
    pub sell: PriceValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rrp: Option<PriceValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkuPrices {
    pub prices: SkuPrice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationQuantity {
    pub location: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkuInventory {
    pub inventory: Vec<LocationQuantity>,
}

/// One SKU image. Uploads set `merchant_url`; the API answers with the
/// hosted `url`, or an `error` if it could not fetch the source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SkuImage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SkuImage {
    pub fn from_url(merchant_url: impl Into<String>) -> Self {
        Self {
            merchant_url: Some(merchant_url.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkuImages {
    pub images: Vec<SkuImage>,
}

/// A taxonomy attribute value. Values are strings, numbers or lists
/// depending on the attribute, so they stay untyped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkuAttribute {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkuAttributes {
    pub attributes: Vec<SkuAttribute>,
}

/// Catalogue counters. Fields not requested are absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkuStatistics {
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub archived: Option<u64>,
}

fn price_value() -> Shape {
    money_shape("PriceValue", "value")
}

fn weight_shape() -> Record {
    Record::new("Weight")
        .field(Field::required("value", Shape::Number).constraint(Constraint::Min(0.0)))
        .required("unit", Shape::String)
}

fn sku_write_shape() -> Shape {
    let volume = Record::new("Volume")
        .required("height", Shape::Number)
        .required("width", Shape::Number)
        .required("length", Shape::Number)
        .required("unit", Shape::String);

    Record::new("SkuWrite")
        .field(
            Field::required("merchant_sku_id", Shape::String)
                .constraint(Constraint::MinLength(1))
                .constraint(Constraint::MaxLength(255)),
        )
        .field(Field::required("name", Shape::String).constraint(Constraint::MinLength(1)))
        .optional("description", Shape::String)
        .field(
            Field::optional("country_of_origin", Shape::String)
                .constraint(Constraint::MinLength(2))
                .constraint(Constraint::MaxLength(2)),
        )
        .optional("weight", weight_shape())
        .optional("volume", volume)
        .optional("taxonomy_id", Shape::Uuid)
        .optional("brand", Shape::String)
        .optional("size", Shape::String)
        .into()
}

fn sku_read_shape() -> Shape {
    Record::new("SkuRead")
        .required("sku_id", Shape::Uuid)
        .required("merchant_sku_id", Shape::String)
        .required("name", Shape::String)
        .optional("description", Shape::String)
        .optional("brand", Shape::String)
        .optional("taxonomy_id", Shape::Uuid)
        .optional("weight", weight_shape())
        .optional("enabled", Shape::Boolean)
        .optional("archived", Shape::Boolean)
        .into()
}

fn prices_shape() -> Shape {
    let price = Record::new("SkuPrice")
        .optional("cost", price_value())
        .required("sell", price_value())
        .optional("rrp", price_value());
    Record::new("SkuPrices").required("prices", price).into()
}

fn inventory_shape() -> Shape {
    let entry = Record::new("LocationQuantity")
        .field(Field::required("location", Shape::String).constraint(Constraint::MinLength(1)))
        .field(Field::required("quantity", Shape::Integer).constraint(Constraint::Min(0.0)));
    Record::new("SkuInventory")
        .required("inventory", Shape::array(entry))
        .into()
}

fn images_upload_shape() -> Shape {
    let image = Record::new("SkuImage").field(
        Field::required("merchant_url", Shape::String).constraint(Constraint::MinLength(1)),
    );
    Record::new("SkuImages")
        .field(
            Field::required("images", Shape::array(image)).constraint(Constraint::MinLength(1)),
        )
        .into()
}

fn images_shape() -> Shape {
    let image = Record::new("SkuImage")
        .optional("merchant_url", Shape::String)
        .optional("url", Shape::String)
        .optional("error", Shape::String);
    Record::new("SkuImages")
        .required("images", Shape::array(image))
        .into()
}

fn attributes_shape() -> Shape {
    let attribute = Record::new("SkuAttribute")
        .field(Field::required("name", Shape::String).constraint(Constraint::MinLength(1)))
        .required("value", Shape::Any);
    Record::new("SkuAttributes")
        .required("attributes", Shape::array(attribute))
        .into()
}

fn statistics_shape() -> Shape {
    Record::new("SkuStatistics")
        .field(Field::optional("total", Shape::Integer).constraint(Constraint::Min(0.0)))
        .field(Field::optional("archived", Shape::Integer).constraint(Constraint::Min(0.0)))
        .into()
}

const SKU_PATH: &str = "/v1/merchant-skus/{merchant_sku_id}";

pub fn get_spec() -> EndpointSpec {
    EndpointSpec::get("skus.get", SKU_PATH).response_shape(sku_read_shape())
}

/// `PUT` creates or replaces the whole SKU, so repeating it is safe.
pub fn upsert_spec() -> EndpointSpec {
    EndpointSpec::put("skus.upsert", SKU_PATH)
        .request_shape(sku_write_shape())
        .response_shape(sku_read_shape())
        .idempotent(true)
}

pub fn enable_spec() -> EndpointSpec {
    EndpointSpec::post("skus.enable", format!("{}/enable", SKU_PATH))
}

pub fn disable_spec() -> EndpointSpec {
    EndpointSpec::post("skus.disable", format!("{}/disable", SKU_PATH))
}

pub fn unarchive_spec() -> EndpointSpec {
    EndpointSpec::post("skus.unarchive", format!("{}/unarchive", SKU_PATH))
}

pub fn get_images_spec() -> EndpointSpec {
    EndpointSpec::get("skus.get_images", format!("{}/images", SKU_PATH))
        .response_shape(images_shape())
}

pub fn upload_images_spec() -> EndpointSpec {
    EndpointSpec::put("skus.upload_images", format!("{}/images", SKU_PATH))
        .request_shape(images_upload_shape())
        .response_shape(images_shape())
        .idempotent(true)
}

pub fn upload_attributes_spec() -> EndpointSpec {
    EndpointSpec::put("skus.upload_attributes", format!("{}/attributes", SKU_PATH))
        .request_shape(attributes_shape())
        .response_shape(attributes_shape())
        .idempotent(true)
}

pub fn statistics_spec() -> EndpointSpec {
    EndpointSpec::get("skus.statistics", "/v1/merchant-skus/statistics")
        .response_shape(statistics_shape())
}

pub fn get_prices_spec() -> EndpointSpec {
    EndpointSpec::get("skus.get_prices", format!("{}/prices", SKU_PATH))
        .response_shape(prices_shape())
}

pub fn upload_prices_spec() -> EndpointSpec {
    EndpointSpec::put("skus.upload_prices", format!("{}/prices", SKU_PATH))
        .request_shape(prices_shape())
        .response_shape(prices_shape())
        .idempotent(true)
}

pub fn get_inventory_spec() -> EndpointSpec {
    EndpointSpec::get("skus.get_inventory", format!("{}/inventory", SKU_PATH))
        .response_shape(inventory_shape())
}

pub fn upload_inventory_spec() -> EndpointSpec {
    EndpointSpec::put("skus.upload_inventory", format!("{}/inventory", SKU_PATH))
        .request_shape(inventory_shape())
        .response_shape(inventory_shape())
        .idempotent(true)
}

pub fn list_spec() -> EndpointSpec {
    let item = Record::new("SkuListItem")
        .required("merchant_sku_id", Shape::String)
        .optional("sku_id", Shape::Uuid);
    EndpointSpec::get("skus.list", "/v1/merchant-skus").response_shape(Shape::array(item))
}

/// Merchant SKU endpoints, borrowed from a [`Client`] via [`Client::skus`].
///
/// # Examples
///
/// ```no_run
/// use mysale_client::resources::skus::{LocationQuantity, SkuInventory};
/// use mysale_client::Client;
///
/// # async fn example(client: Client) -> mysale_client::Result<()> {
/// let inventory = SkuInventory {
///     inventory: vec![LocationQuantity { location: "Sydney Store".into(), quantity: 25 }],
/// };
/// client.skus().upload_inventory("TSHIRT-BLUE-M-001", &inventory).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Skus<'a> {
    client: &'a Client,
}

impl<'a> Skus<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn get(&self, merchant_sku_id: &str) -> Result<Response<SkuRead>> {
        self.client
            .execute_as(&get_spec(), sku_input(merchant_sku_id))
            .await
    }

    /// Creates or replaces a SKU, addressed by its `merchant_sku_id`.
    pub async fn upsert(&self, sku: &SkuWrite) -> Result<Response<SkuRead>> {
        let spec = upsert_spec();
        let input = with_body(&spec, sku_input(&sku.merchant_sku_id), sku)?;
        self.client.execute_as(&spec, input).await
    }

    /// Makes the SKU available for sale.
    pub async fn enable(&self, merchant_sku_id: &str) -> Result<Response<ValidatedData>> {
        self.client
            .execute(&enable_spec(), sku_input(merchant_sku_id))
            .await
    }

    pub async fn disable(&self, merchant_sku_id: &str) -> Result<Response<ValidatedData>> {
        self.client
            .execute(&disable_spec(), sku_input(merchant_sku_id))
            .await
    }

    /// Restores an archived SKU.
    pub async fn unarchive(&self, merchant_sku_id: &str) -> Result<Response<ValidatedData>> {
        self.client
            .execute(&unarchive_spec(), sku_input(merchant_sku_id))
            .await
    }

    pub async fn get_images(&self, merchant_sku_id: &str) -> Result<Response<SkuImages>> {
        self.client
            .execute_as(&get_images_spec(), sku_input(merchant_sku_id))
            .await
    }

    /// Replaces the SKU's images with the given source URLs.
    pub async fn upload_images(
        &self,
        merchant_sku_id: &str,
        images: &SkuImages,
    ) -> Result<Response<SkuImages>> {
        let spec = upload_images_spec();
        let input = with_body(&spec, sku_input(merchant_sku_id), images)?;
        self.client.execute_as(&spec, input).await
    }

    pub async fn upload_attributes(
        &self,
        merchant_sku_id: &str,
        attributes: &SkuAttributes,
    ) -> Result<Response<SkuAttributes>> {
        let spec = upload_attributes_spec();
        let input = with_body(&spec, sku_input(merchant_sku_id), attributes)?;
        self.client.execute_as(&spec, input).await
    }

    /// Catalogue counters. An empty `fields` asks for all of them.
    pub async fn statistics(&self, fields: &[&str]) -> Result<Response<SkuStatistics>> {
        let mut input = CallInput::new();
        if !fields.is_empty() {
            input = input.query("fields", fields.join(","));
        }
        self.client.execute_as(&statistics_spec(), input).await
    }

    pub async fn get_prices(&self, merchant_sku_id: &str) -> Result<Response<SkuPrices>> {
        self.client
            .execute_as(&get_prices_spec(), sku_input(merchant_sku_id))
            .await
    }

    pub async fn upload_prices(
        &self,
        merchant_sku_id: &str,
        prices: &SkuPrices,
    ) -> Result<Response<SkuPrices>> {
        let spec = upload_prices_spec();
        let input = with_body(&spec, sku_input(merchant_sku_id), prices)?;
        self.client.execute_as(&spec, input).await
    }

    pub async fn get_inventory(&self, merchant_sku_id: &str) -> Result<Response<SkuInventory>> {
        self.client
            .execute_as(&get_inventory_spec(), sku_input(merchant_sku_id))
            .await
    }

    pub async fn upload_inventory(
        &self,
        merchant_sku_id: &str,
        inventory: &SkuInventory,
    ) -> Result<Response<SkuInventory>> {
        let spec = upload_inventory_spec();
        let input = with_body(&spec, sku_input(merchant_sku_id), inventory)?;
        self.client.execute_as(&spec, input).await
    }

    /// Lists SKUs, optionally leaving out archived ones.
    pub async fn list(
        &self,
        page: Page,
        exclude_archived: bool,
    ) -> Result<Response<Vec<SkuListItem>>> {
        let spec = list_spec();
        page.check(&spec)?;
        let input = page
            .apply(CallInput::new())
            .query("exclude_archived", exclude_archived);
        self.client.execute_as(&spec, input).await
    }

    /// Like [`list`](Self::list), with paging metadata.
    pub async fn list_page(
        &self,
        page: Page,
        exclude_archived: bool,
    ) -> Result<Response<Paginated<SkuListItem>>> {
        let response = self.list(page, exclude_archived).await?;
        Ok(Paginated::from_response(response, page))
    }
}

fn sku_input(merchant_sku_id: &str) -> CallInput {
    CallInput::new().path_param("merchant_sku_id", merchant_sku_id)
}
