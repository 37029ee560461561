//! Checkout against `PostgreSQL`.
//!
//! Skipped unless `ORDERLINE_TEST_DATABASE_URL` points at a database the
//! tests may write to. Every test works with fresh products and users, so
//! runs do not interfere with each other.

#![allow(clippy::unwrap_used, clippy::print_stderr)]

use std::sync::Arc;

use orderline_core::{Money, OrderStatus, UserId};
use orderline_engine::db::PgStore;
use orderline_engine::{
    CheckoutConfig, CheckoutError, CheckoutService, OrderError, OrderService, PlaceOrderRequest,
};
use orderline_integration_tests::{
    ScriptedNumbers, add_to_cart, address, cart_size, postgres, stock_of, stock_product,
};

macro_rules! require_postgres {
    () => {
        match postgres().await {
            Some(store) => store,
            None => {
                eprintln!("ORDERLINE_TEST_DATABASE_URL not set, skipping");
                return;
            }
        }
    };
}

fn service(store: &PgStore) -> CheckoutService<PgStore> {
    CheckoutService::new(store.clone(), CheckoutConfig::default())
}

#[tokio::test]
async fn test_checkout_commits_order_lines_stock_and_cart() {
    let store = require_postgres!();
    let user = UserId::generate();
    let a = stock_product(&store, "A", 1000, 5).await;
    let b = stock_product(&store, "B", 500, 5).await;
    add_to_cart(&store, user, &a, 2).await;
    add_to_cart(&store, user, &b, 1).await;

    let placed = service(&store)
        .place_order(user, PlaceOrderRequest::new(address()))
        .await
        .unwrap();

    assert_eq!(placed.order.total_amount, Money::from_cents(3750));
    assert_eq!(stock_of(&store, &a).await, 3);
    assert_eq!(stock_of(&store, &b).await, 4);
    assert_eq!(cart_size(&store, user).await, 0);

    let stored = OrderService::new(store.clone())
        .get_order_by_number(&placed.order.order_number)
        .await
        .unwrap();
    assert_eq!(stored.order.total_amount, placed.order.total_amount);
    assert_eq!(stored.lines.len(), 2);
    assert_eq!(stored.subtotal(), Money::from_cents(2500));
}

#[tokio::test]
async fn test_insufficient_stock_rolls_back() {
    let store = require_postgres!();
    let user = UserId::generate();
    let plenty = stock_product(&store, "Plenty", 1000, 50).await;
    let scarce = stock_product(&store, "Scarce", 1000, 5).await;
    add_to_cart(&store, user, &plenty, 4).await;
    add_to_cart(&store, user, &scarce, 6).await;

    let err = service(&store)
        .place_order(user, PlaceOrderRequest::new(address()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::InsufficientStock {
            requested: 6,
            available: 5,
            ..
        }
    ));
    assert_eq!(stock_of(&store, &plenty).await, 50);
    assert_eq!(stock_of(&store, &scarce).await, 5);
    assert_eq!(cart_size(&store, user).await, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_last_unit_is_sold_once() {
    let store = require_postgres!();
    let last = stock_product(&store, "Last", 1000, 1).await;
    let users = [UserId::generate(), UserId::generate()];
    for user in users {
        add_to_cart(&store, user, &last, 1).await;
    }

    let checkout = Arc::new(service(&store));
    let handles: Vec<_> = users
        .into_iter()
        .map(|user| {
            let checkout = Arc::clone(&checkout);
            tokio::spawn(async move {
                checkout
                    .place_order(user, PlaceOrderRequest::new(address()))
                    .await
            })
        })
        .collect();

    let mut committed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => committed += 1,
            Err(CheckoutError::InsufficientStock { .. }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(committed, 1);
    assert_eq!(stock_of(&store, &last).await, 0);
}

#[tokio::test]
async fn test_order_number_collision_hits_unique_constraint() {
    let store = require_postgres!();
    let first_user = UserId::generate();
    let product = stock_product(&store, "A", 1000, 10).await;
    add_to_cart(&store, first_user, &product, 1).await;
    let first = service(&store)
        .place_order(first_user, PlaceOrderRequest::new(address()))
        .await
        .unwrap();

    let second_user = UserId::generate();
    add_to_cart(&store, second_user, &product, 2).await;
    let taken = first.order.order_number.clone();
    let err = service(&store)
        .with_order_numbers(ScriptedNumbers::new([taken.clone(), taken]))
        .place_order(second_user, PlaceOrderRequest::new(address()))
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::DuplicateOrderNumber));
    assert_eq!(stock_of(&store, &product).await, 9);
    assert_eq!(cart_size(&store, second_user).await, 1);
}

#[tokio::test]
async fn test_cancel_restocks() {
    let store = require_postgres!();
    let user = UserId::generate();
    let product = stock_product(&store, "A", 1000, 4).await;
    add_to_cart(&store, user, &product, 3).await;
    let placed = service(&store)
        .place_order(user, PlaceOrderRequest::new(address()))
        .await
        .unwrap();
    assert_eq!(stock_of(&store, &product).await, 1);

    let cancelled = OrderService::new(store.clone())
        .cancel_order(placed.order.id)
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(stock_of(&store, &product).await, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cancels_restock_once() {
    let store = require_postgres!();
    let user = UserId::generate();
    let product = stock_product(&store, "A", 1000, 5).await;
    add_to_cart(&store, user, &product, 2).await;
    let placed = service(&store)
        .place_order(user, PlaceOrderRequest::new(address()))
        .await
        .unwrap();
    assert_eq!(stock_of(&store, &product).await, 3);

    let orders = Arc::new(OrderService::new(store.clone()));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let orders = Arc::clone(&orders);
            let order_id = placed.order.id;
            tokio::spawn(async move { orders.cancel_order(order_id).await })
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
    assert_eq!(stock_of(&store, &product).await, 5);
}

#[tokio::test]
async fn test_cancelled_order_cannot_be_reopened() {
    let store = require_postgres!();
    let user = UserId::generate();
    let product = stock_product(&store, "A", 1000, 5).await;
    add_to_cart(&store, user, &product, 2).await;
    let placed = service(&store)
        .place_order(user, PlaceOrderRequest::new(address()))
        .await
        .unwrap();
    let orders = OrderService::new(store.clone());
    orders.cancel_order(placed.order.id).await.unwrap();

    let err = orders
        .update_status(placed.order.id, OrderStatus::Pending)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::InvalidTransition { .. }));
    assert!(orders.cancel_order(placed.order.id).await.is_err());
    assert_eq!(stock_of(&store, &product).await, 5);
}
