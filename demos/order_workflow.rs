//! Walks the new-order queue: fetch, acknowledge, ship.
//!
//! This demo shows how to:
//! - Configure a client with a credential, retries and a local rate limit
//! - Page through an order queue
//! - Acknowledge orders and create shipments through typed resources
//! - Branch on error kinds, including server rate-limit hints
//!
//! Run with: `MYSALE_TOKEN=... cargo run --example order_workflow`

use mysale_client::rate_limit::RateLimitConfig;
use mysale_client::resources::orders::{
    AcknowledgementItem, Order, OrderAcknowledgement, ShipmentCreate, ShipmentItem,
};
use mysale_client::resources::Page;
use mysale_client::retry::{Backoff, RetryPolicy};
use mysale_client::{Client, Error, ErrorKind};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("mysale_client=debug")
        .init();

    let token = std::env::var("MYSALE_TOKEN").unwrap_or_else(|_| "your_api_token_here".to_string());

    let client = Client::builder()
        .base_url("https://api.mysale.example")?
        .credential(token)
        .timeout(Duration::from_secs(10))
        .retry_policy(RetryPolicy::new(
            4,
            Backoff::Exponential {
                initial_delay: Duration::from_millis(200),
                max_delay: Duration::from_secs(5),
                jitter: true,
            },
        ))
        .rate_limit(RateLimitConfig::new(10, 5.0))
        .build()?;

    let mut page = Page::new(0, 50);
    loop {
        let queue = match client.orders().list_new(page).await {
            Ok(queue) => queue,
            Err(e) if e.kind() == ErrorKind::HttpClient && e.rate_limit_info().is_some() => {
                let wait = e.rate_limit_delay(Duration::from_secs(60)).unwrap_or(Duration::from_secs(5));
                println!("Server rate limit hit, waiting {:?}", wait);
                tokio::time::sleep(wait).await;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        println!("Fetched {} new orders in {:?}", queue.data.len(), queue.latency);
        if queue.data.is_empty() {
            break;
        }

        for item in queue.data.iter() {
            let order_id = item.order_id.to_string();
            match process(&client, &order_id).await {
                Ok(shipment_id) => println!("Order {} shipped as {}", order_id, shipment_id),
                Err(Error::Validation { source, .. }) => {
                    println!("Order {} skipped, bad input: {}", order_id, source)
                }
                Err(e) => println!("Order {} failed ({:?}): {}", order_id, e.kind(), e),
            }
        }

        if queue.data.len() < page.limit as usize {
            break;
        }
        page = page.next();
    }

    Ok(())
}

async fn process(client: &Client, order_id: &str) -> mysale_client::Result<String> {
    let order = client.orders().get(order_id).await?.into_data();
    let internal_id = format!("INT-{}", order.customer_order_reference);

    client
        .orders()
        .acknowledge(order_id, &acknowledgement(&order, &internal_id))
        .await?;

    let shipment = ShipmentCreate {
        merchant_shipment_id: format!("SHIP-{}", internal_id),
        tracking_number: None,
        carrier: "Australia Post".to_string(),
        carrier_shipment_method: Some("Express Post".to_string()),
        delivery_option: Some("standard".to_string()),
        dispatch_date: "2024-05-02".to_string(),
        expected_delivery_date: None,
        shipment_items: order
            .order_items
            .iter()
            .enumerate()
            .map(|(i, item)| ShipmentItem {
                merchant_shipment_item_id: format!("SHIP-{}-{}", internal_id, i + 1),
                merchant_sku_id: item.merchant_sku_id.clone(),
                sku_id: item.sku_id,
                sku_qty: item.sku_qty,
            })
            .collect(),
    };

    Ok(client
        .orders()
        .create_shipment(order_id, &shipment)
        .await?
        .into_data())
}

fn acknowledgement(order: &Order, internal_id: &str) -> OrderAcknowledgement {
    OrderAcknowledgement {
        merchant_order_id: internal_id.to_string(),
        order_items: order
            .order_items
            .iter()
            .enumerate()
            .map(|(i, item)| AcknowledgementItem {
                order_item_id: item.order_item_id,
                merchant_order_item_id: format!("{}-{}", internal_id, i + 1),
            })
            .collect(),
    }
}
