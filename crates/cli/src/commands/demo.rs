//! End-to-end checkout against the in-memory store.
//!
//! Seeds the catalog and a cart, quotes and places the order, shows that a
//! second checkout finds the cart empty, then cancels the order.

use std::sync::Arc;

use tracing::info;

use orderline_core::{ShippingAddress, UserId};
use orderline_engine::services::events::BroadcastSink;
use orderline_engine::store::memory::MemoryStore;
use orderline_engine::{CheckoutError, CheckoutService, EngineConfig, OrderService, PlaceOrderRequest};

use super::print_json;
use super::seed;

/// Run the demo.
///
/// # Errors
///
/// Returns an error if any step behaves differently than a healthy engine
/// would.
pub async fn run(config: &EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = MemoryStore::new();
    let user_id = UserId::generate();

    let products = seed::catalog(&store).await?;
    seed::sample_cart(&store, user_id, &products).await?;

    let events = Arc::new(BroadcastSink::new(16));
    let mut received = events.subscribe();
    let checkout = CheckoutService::new(store.clone(), config.checkout).with_events(events);

    let quote = checkout.quote(user_id).await?;
    info!(total = %quote.total_amount, "Quoted cart");

    let request = PlaceOrderRequest::new(ShippingAddress {
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        address_line1: "12 St James's Square".to_string(),
        address_line2: None,
        city: "London".to_string(),
        state: "Greater London".to_string(),
        postal_code: "SW1Y 4JH".to_string(),
        country: "GB".to_string(),
    })
    .with_notes("Ring twice");

    let placed = checkout.place_order(user_id, request.clone()).await?;
    print_json(&placed)?;
    if placed.order.total_amount != quote.total_amount {
        return Err("placed total differs from the quote".into());
    }

    let event = received.recv().await?;
    info!(order_number = %event.order_number, "Received order event");

    match checkout.place_order(user_id, request).await {
        Err(CheckoutError::EmptyCart) => info!("Second checkout rejected: cart is empty"),
        other => return Err(format!("expected an empty cart, got {other:?}").into()),
    }

    let orders = OrderService::new(store.clone());
    let cancelled = orders.cancel_order(placed.order.id).await?;
    info!(status = %cancelled.status, "Order cancelled");

    let tables = store.snapshot().await;
    for product in &products {
        let restored = tables.product(product.id).map(|p| p.stock_quantity);
        if restored != Some(product.stock_quantity) {
            return Err(format!("stock for {} not restored", product.sku).into());
        }
    }
    info!("Stock restored");
    Ok(())
}
