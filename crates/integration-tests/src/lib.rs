//! Integration tests for Orderline.
//!
//! # Running Tests
//!
//! ```bash
//! # In-memory scenarios only
//! cargo test -p orderline-integration-tests
//!
//! # Also run the PostgreSQL scenarios (migrations are applied automatically)
//! ORDERLINE_TEST_DATABASE_URL=postgres://localhost/orderline_test \
//!     cargo test -p orderline-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `checkout` - Cart to order against the in-memory store
//! - `orders` - Lookups, fulfilment and cancellation
//! - `postgres` - The same guarantees against a real database
//!
//! This module holds the shared fixtures.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use secrecy::SecretString;

use orderline_core::{
    Money, OrderId, OrderNumber, OrderStatus, PaymentStatus, ShippingAddress, UserId,
};
use orderline_engine::db::{self, MIGRATOR, PgStore};
use orderline_engine::models::{CartLine, Order, Product};
use orderline_engine::services::checkout::{DailySequence, OrderNumberGenerator};
use orderline_engine::store::OrderQueries;
use orderline_engine::{Store, StoreError, UnitOfWork};

/// A deliverable address.
#[must_use]
pub fn address() -> ShippingAddress {
    ShippingAddress {
        first_name: "Grace".to_string(),
        last_name: "Hopper".to_string(),
        address_line1: "1 Compiler Way".to_string(),
        address_line2: Some("Suite 2".to_string()),
        city: "Arlington".to_string(),
        state: "VA".to_string(),
        postal_code: "22201".to_string(),
        country: "US".to_string(),
    }
}

/// Insert a product and commit.
pub async fn stock_product<S: Store>(store: &S, name: &str, price_cents: i64, stock: i32) -> Product {
    let sku = format!("SKU-{}", uuid::Uuid::new_v4().simple());
    let mut uow = UnitOfWork::new(store.clone());
    let product = uow.add(Product::new(name, sku, Money::from_cents(price_cents), stock));
    uow.persist().await.unwrap();
    product
}

/// Put `quantity` of `product` in the user's cart and commit.
pub async fn add_to_cart<S: Store>(
    store: &S,
    user_id: UserId,
    product: &Product,
    quantity: i32,
) -> CartLine {
    let mut uow = UnitOfWork::new(store.clone());
    let line = uow.add(CartLine::new(user_id, product.id, quantity));
    uow.persist().await.unwrap();
    line
}

/// Current stock of a product, read in its own transaction.
pub async fn stock_of<S: Store>(store: &S, product: &Product) -> i32 {
    let mut uow = UnitOfWork::new(store.clone());
    uow.get_by_id::<Product>(product.id)
        .await
        .unwrap()
        .unwrap()
        .stock_quantity
}

/// Number of lines in a user's cart.
pub async fn cart_size<S: Store>(store: &S, user_id: UserId) -> usize {
    let mut uow = UnitOfWork::new(store.clone());
    uow.get_all::<CartLine>()
        .await
        .unwrap()
        .into_iter()
        .filter(|line| line.user_id == user_id)
        .count()
}

/// An order that already holds `number`, for collision tests.
pub async fn existing_order<S: Store>(
    store: &S,
    number: OrderNumber,
    created_at: DateTime<Utc>,
) -> Order {
    let mut uow = UnitOfWork::new(store.clone());
    let order = uow.add(Order {
        id: OrderId::nil(),
        order_number: number,
        user_id: UserId::generate(),
        total_amount: Money::from_cents(1000),
        shipping_cost: Money::from_cents(1000),
        tax_amount: Money::ZERO,
        status: OrderStatus::Pending,
        payment_status: PaymentStatus::Pending,
        shipping_address: address(),
        notes: None,
        created_at,
        shipped_at: None,
        delivered_at: None,
    });
    uow.persist().await.unwrap();
    order
}

/// Hands out queued numbers first, then falls back to the daily sequence.
#[derive(Debug, Default)]
pub struct ScriptedNumbers {
    queue: Mutex<VecDeque<OrderNumber>>,
}

impl ScriptedNumbers {
    #[must_use]
    pub fn new(numbers: impl IntoIterator<Item = OrderNumber>) -> Self {
        Self {
            queue: Mutex::new(numbers.into_iter().collect()),
        }
    }
}

impl OrderNumberGenerator for ScriptedNumbers {
    async fn generate<Q: OrderQueries>(
        &self,
        queries: &mut Q,
        now: DateTime<Utc>,
    ) -> Result<OrderNumber, StoreError> {
        let next = self.queue.lock().unwrap().pop_front();
        match next {
            Some(number) => Ok(number),
            None => DailySequence.generate(queries, now).await,
        }
    }
}

/// A migrated `PostgreSQL` store, if `ORDERLINE_TEST_DATABASE_URL` is set.
pub async fn postgres() -> Option<PgStore> {
    let url = std::env::var("ORDERLINE_TEST_DATABASE_URL").ok()?;
    let pool = db::create_pool(&SecretString::from(url), 5).await.unwrap();
    MIGRATOR.run(&pool).await.unwrap();
    Some(PgStore::new(pool))
}
