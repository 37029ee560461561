//! Order lookups, fulfilment and cancellation after checkout.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use orderline_core::{OrderStatus, UserId};
use orderline_engine::models::PlacedOrder;
use orderline_engine::store::memory::MemoryStore;
use orderline_engine::{CheckoutConfig, CheckoutService, OrderError, OrderService, PlaceOrderRequest};
use orderline_integration_tests::{add_to_cart, address, stock_of, stock_product};

async fn placed(store: &MemoryStore, user: UserId, quantity: i32) -> PlacedOrder {
    let product = stock_product(store, "Widget", 1250, 10).await;
    add_to_cart(store, user, &product, quantity).await;
    CheckoutService::new(store.clone(), CheckoutConfig::default())
        .place_order(user, PlaceOrderRequest::new(address()).with_notes("Side door"))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_placed_order_can_be_read_back() {
    let store = MemoryStore::new();
    let user = UserId::generate();
    let order = placed(&store, user, 2).await;
    let service = OrderService::new(store);

    let by_number = service
        .get_order_by_number(&order.order.order_number)
        .await
        .unwrap();
    assert_eq!(by_number, order);
    assert_eq!(by_number.order.notes.as_deref(), Some("Side door"));
    assert_eq!(by_number.order.shipping_address, address());

    let by_id = service.get_order(order.order.id).await.unwrap();
    assert_eq!(by_id.subtotal(), order.subtotal());

    let mine = service.orders_for_user(user).await.unwrap();
    assert_eq!(mine.len(), 1);
}

#[tokio::test]
async fn test_cancelling_pending_order_restores_stock() {
    let store = MemoryStore::new();
    let user = UserId::generate();
    let order = placed(&store, user, 3).await;
    let product_id = order.lines[0].product_id;
    let product = store.snapshot().await.product(product_id).cloned().unwrap();
    assert_eq!(product.stock_quantity, 7);

    let cancelled = OrderService::new(store.clone())
        .cancel_order(order.order.id)
        .await
        .unwrap();

    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(stock_of(&store, &product).await, 10);
}

#[tokio::test]
async fn test_cancelling_twice_is_rejected() {
    let store = MemoryStore::new();
    let order = placed(&store, UserId::generate(), 1).await;
    let service = OrderService::new(store.clone());

    service.cancel_order(order.order.id).await.unwrap();
    let err = service.cancel_order(order.order.id).await.unwrap_err();
    assert!(matches!(
        err,
        OrderError::NotCancellable {
            status: OrderStatus::Cancelled,
            ..
        }
    ));
}

#[tokio::test]
async fn test_shipped_order_cannot_be_cancelled() {
    let store = MemoryStore::new();
    let order = placed(&store, UserId::generate(), 2).await;
    let service = OrderService::new(store.clone());

    let shipped = service
        .update_status(order.order.id, OrderStatus::Shipped)
        .await
        .unwrap();
    assert!(shipped.shipped_at.is_some());

    let err = service.cancel_order(order.order.id).await.unwrap_err();
    assert!(matches!(
        err,
        OrderError::NotCancellable {
            status: OrderStatus::Shipped,
            ..
        }
    ));

    let product = store
        .snapshot()
        .await
        .product(order.lines[0].product_id)
        .cloned()
        .unwrap();
    assert_eq!(product.stock_quantity, 8);
}

#[tokio::test]
async fn test_cancelled_order_cannot_be_reopened_or_shipped() {
    let store = MemoryStore::new();
    let order = placed(&store, UserId::generate(), 2).await;
    let product_id = order.lines[0].product_id;
    let service = OrderService::new(store.clone());

    service.cancel_order(order.order.id).await.unwrap();

    let err = service
        .update_status(order.order.id, OrderStatus::Pending)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrderError::InvalidTransition {
            from: OrderStatus::Cancelled,
            to: OrderStatus::Pending,
            ..
        }
    ));
    let err = service
        .update_status(order.order.id, OrderStatus::Shipped)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrderError::InvalidTransition {
            from: OrderStatus::Cancelled,
            to: OrderStatus::Shipped,
            ..
        }
    ));
    assert!(service.cancel_order(order.order.id).await.is_err());

    let stored = service.get_order(order.order.id).await.unwrap();
    assert_eq!(stored.order.status, OrderStatus::Cancelled);
    assert_eq!(stored.order.shipped_at, None);
    let product = store.snapshot().await.product(product_id).cloned().unwrap();
    assert_eq!(product.stock_quantity, 10);
    assert_eq!(store.abandoned_transactions(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cancels_restock_once() {
    let store = MemoryStore::new();
    let order = placed(&store, UserId::generate(), 4).await;
    let product_id = order.lines[0].product_id;
    let service = Arc::new(OrderService::new(store.clone()));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = Arc::clone(&service);
            let order_id = order.order.id;
            tokio::spawn(async move { service.cancel_order(order_id).await })
        })
        .collect();

    let mut cancelled = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => cancelled += 1,
            Err(OrderError::NotCancellable {
                status: OrderStatus::Cancelled,
                ..
            }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(cancelled, 1);
    let product = store.snapshot().await.product(product_id).cloned().unwrap();
    assert_eq!(product.stock_quantity, 10);
}
