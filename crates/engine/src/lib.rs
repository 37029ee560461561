//! Orderline order placement engine.
//!
//! Turns a user's cart into a persisted order inside a single transaction:
//! the cart is snapshotted, stock is reserved with conditional decrements,
//! an order number is minted, totals are computed and the order and its lines
//! are written before the cart is cleared and everything commits together.
//!
//! The engine is storage-agnostic. [`store::Store`] abstracts a transactional
//! backend; [`db::PgStore`] is the `PostgreSQL` implementation and
//! [`store::memory::MemoryStore`] an in-process one for tests and demos.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod unit_of_work;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{CheckoutConfig, ConfigError, EngineConfig};
pub use error::{CheckoutError, ErrorClass};
pub use services::checkout::{CheckoutService, CheckoutState, PlaceOrderRequest};
pub use services::orders::{OrderError, OrderService};
pub use store::{Store, StoreError};
pub use unit_of_work::UnitOfWork;
