//! Storage contracts.
//!
//! A [`Store`] opens transactions. A transaction handle implements [`Table`]
//! once per entity kind for keyed CRUD, plus the entity-specific capability
//! traits ([`CartQueries`], [`StockLedger`], [`OrderQueries`]) checkout needs.
//! Writes are normally staged in a [`gateway::Gateway`] and flushed through
//! [`Table`] by the [`crate::unit_of_work::UnitOfWork`].
//!
//! Methods return `impl Future + Send` so that checkouts can run on spawned
//! tasks; implementations are free to write them as `async fn`.

pub mod gateway;
pub mod memory;

use core::fmt;
use core::future::Future;
use core::hash::Hash;

use chrono::{DateTime, Utc};
use thiserror::Error;

use orderline_core::{OrderId, OrderNumber, OrderStatus, ProductId, UserId};

use crate::models::{CartLine, CheckoutLine, Order, OrderLine, Product};

/// Name of the unique constraint on `orders.order_number`.
pub const ORDER_NUMBER_CONSTRAINT: &str = "orders_order_number_key";

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database query failed.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A stored row could not be turned back into a domain value.
    #[error("Data corruption: {0}")]
    DataCorruption(String),

    /// An update or delete targeted a row that does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Entity kind.
        kind: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// A unique constraint rejected the write.
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation {
        /// Constraint name.
        constraint: String,
    },

    /// A check or foreign key constraint rejected the write.
    #[error("Constraint violated: {constraint}")]
    ConstraintViolation {
        /// Constraint name.
        constraint: String,
    },

    /// The backend could not be reached or a connection was lost.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// `begin` was called while a transaction was already open.
    #[error("A transaction is already active")]
    TransactionAlreadyActive,

    /// An operation that needs an open transaction was called without one.
    #[error("No transaction is active")]
    NoActiveTransaction,
}

impl StoreError {
    pub(crate) fn not_found(kind: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether this is a unique violation of the named constraint.
    #[must_use]
    pub fn is_unique_violation_of(&self, name: &str) -> bool {
        matches!(self, Self::UniqueViolation { constraint } if constraint == name)
    }

    /// Whether retrying later might succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = e {
            let constraint = db_err.constraint().unwrap_or("unknown").to_string();
            if db_err.is_unique_violation() {
                return Self::UniqueViolation { constraint };
            }
            if db_err.is_check_violation() || db_err.is_foreign_key_violation() {
                return Self::ConstraintViolation { constraint };
            }
        }
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Unavailable(e.to_string())
            }
            other => Self::Database(other),
        }
    }
}

/// A persisted entity kind.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Identifier type.
    type Id: Copy + Eq + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Kind name used in logs and errors.
    const KIND: &'static str;

    /// The entity's identifier, possibly nil if not yet assigned.
    fn id(&self) -> Self::Id;

    /// Assign a fresh identifier if the current one is nil, and return it.
    fn assign_id(&mut self) -> Self::Id;
}

/// Keyed CRUD for one entity kind inside a transaction.
pub trait Table<E: Entity>: Send {
    /// Load one row.
    fn find(&mut self, id: E::Id) -> impl Future<Output = Result<Option<E>, StoreError>> + Send;

    /// Load every row.
    fn find_all(&mut self) -> impl Future<Output = Result<Vec<E>, StoreError>> + Send;

    /// Insert a new row.
    fn insert(&mut self, entity: &E) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Overwrite the mutable columns of an existing row.
    ///
    /// Fails with [`StoreError::NotFound`] if the row does not exist.
    fn update(&mut self, entity: &E) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove a row.
    ///
    /// Fails with [`StoreError::NotFound`] if the row does not exist.
    fn delete(&mut self, id: E::Id) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Cart reads used by checkout.
pub trait CartQueries: Send {
    /// A user's cart lines joined with their products' current price and stock,
    /// oldest line first.
    fn checkout_lines(
        &mut self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<CheckoutLine>, StoreError>> + Send;
}

/// Guarded stock movements.
///
/// Stock is never written by read-modify-write; both operations are single
/// conditional statements evaluated by the store.
pub trait StockLedger: Send {
    /// Decrement stock by `quantity` if at least that much remains.
    ///
    /// Returns `false` when nothing was changed, either because stock is
    /// insufficient at write time or because the product does not exist.
    fn decrement_stock(
        &mut self,
        product_id: ProductId,
        quantity: i32,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Return `quantity` units to stock.
    fn restock(
        &mut self,
        product_id: ProductId,
        quantity: i32,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Order reads and guarded status moves.
pub trait OrderQueries: Send {
    /// Number of orders created in `[from, to)`.
    fn count_orders_created_between(
        &mut self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Future<Output = Result<i64, StoreError>> + Send;

    /// Look an order up by its number.
    fn find_order_by_number(
        &mut self,
        number: &OrderNumber,
    ) -> impl Future<Output = Result<Option<Order>, StoreError>> + Send;

    /// Lines of an order.
    fn lines_for_order(
        &mut self,
        order_id: OrderId,
    ) -> impl Future<Output = Result<Vec<OrderLine>, StoreError>> + Send;

    /// A user's orders, newest first.
    fn orders_for_user(
        &mut self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<Order>, StoreError>> + Send;

    /// Write `order`'s status and fulfilment stamps if the stored order is
    /// still `expected`.
    ///
    /// Returns `false` when nothing was changed, either because another
    /// writer moved the status first or because the order does not exist.
    fn transition_order(
        &mut self,
        order: &Order,
        expected: OrderStatus,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;
}

/// An open transaction.
///
/// Dropping a transaction without calling [`Transaction::commit`] rolls it back.
pub trait Transaction: Send + Sized {
    /// Make every write in the transaction durable.
    fn commit(self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Discard every write in the transaction.
    fn rollback(self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Mark a point that later writes can be rolled back to.
    fn savepoint(
        &mut self,
        name: &'static str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Undo every write made since the named savepoint. The savepoint stays set.
    fn rollback_to_savepoint(
        &mut self,
        name: &'static str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Forget the named savepoint, keeping its writes.
    fn release_savepoint(
        &mut self,
        name: &'static str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// A transactional backend.
pub trait Store: Clone + Send + Sync + 'static {
    /// Transaction handle with every capability the engine uses.
    type Tx: Transaction
        + Table<Product>
        + Table<CartLine>
        + Table<Order>
        + Table<OrderLine>
        + CartQueries
        + StockLedger
        + OrderQueries;

    /// Open a transaction.
    fn begin(&self) -> impl Future<Output = Result<Self::Tx, StoreError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_transient() {
        let err = StoreError::from(sqlx::Error::PoolTimedOut);
        assert!(err.is_transient());
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[test]
    fn test_other_sqlx_errors_are_not_transient() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(!err.is_transient());
        assert!(matches!(err, StoreError::Database(_)));
    }

    #[test]
    fn test_unique_violation_matches_constraint_name() {
        let err = StoreError::UniqueViolation {
            constraint: ORDER_NUMBER_CONSTRAINT.to_string(),
        };
        assert!(err.is_unique_violation_of(ORDER_NUMBER_CONSTRAINT));
        assert!(!err.is_unique_violation_of("cart_lines_user_product_key"));
    }
}
