//! Order lookups and fulfilment transitions after checkout.
//!
//! Every operation runs in one transaction that is committed on success and
//! rolled back on any error. Status changes are compare-and-set against the
//! status that was read, so a concurrent change makes the later writer fail
//! instead of overwriting it.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, instrument};

use orderline_core::{OrderId, OrderNumber, OrderStatus, UserId};

use crate::clock::{Clock, SystemClock};
use crate::models::{Order, PlacedOrder};
use crate::store::{OrderQueries, StockLedger, Store, StoreError};
use crate::unit_of_work::UnitOfWork;

/// Errors from [`OrderService`].
#[derive(Debug, Error)]
pub enum OrderError {
    /// No order has that id or number.
    #[error("Order {0} not found")]
    NotFound(String),

    /// Shipped, delivered and cancelled orders cannot be cancelled.
    #[error("Order {order_number} cannot be cancelled while {status}")]
    NotCancellable {
        order_number: OrderNumber,
        status: OrderStatus,
    },

    /// The move is backward, out of a terminal status, or skips a step.
    #[error("Order {order_number} cannot move from {from} to {to}")]
    InvalidTransition {
        order_number: OrderNumber,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Reads orders and moves them through fulfilment.
pub struct OrderService<S: Store> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: Store> OrderService<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// An order with its lines.
    ///
    /// # Errors
    ///
    /// `NotFound` if no order has this id.
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<PlacedOrder, OrderError> {
        let mut uow = self.begin().await?;
        let result = async {
            let order = load(&mut uow, order_id).await?;
            let lines = uow.transaction()?.lines_for_order(order.id).await?;
            Ok::<_, OrderError>(PlacedOrder { order, lines })
        }
        .await;
        finish(uow, result).await
    }

    /// An order with its lines, by order number.
    ///
    /// # Errors
    ///
    /// `NotFound` if no order has this number.
    #[instrument(skip(self), fields(order_number = %number))]
    pub async fn get_order_by_number(
        &self,
        number: &OrderNumber,
    ) -> Result<PlacedOrder, OrderError> {
        let mut uow = self.begin().await?;
        let result = async {
            let tx = uow.transaction()?;
            let order = tx
                .find_order_by_number(number)
                .await?
                .ok_or_else(|| OrderError::NotFound(number.to_string()))?;
            let lines = tx.lines_for_order(order.id).await?;
            Ok::<_, OrderError>(PlacedOrder { order, lines })
        }
        .await;
        finish(uow, result).await
    }

    /// A user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns a store error if the read fails.
    #[instrument(skip(self))]
    pub async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, OrderError> {
        let mut uow = self.begin().await?;
        let result = async {
            let orders = uow.transaction()?.orders_for_user(user_id).await?;
            Ok::<_, OrderError>(orders)
        }
        .await;
        finish(uow, result).await
    }

    /// Move an order to a new status.
    ///
    /// Only forward moves are allowed; see [`OrderStatus::can_transition_to`].
    /// Shipping stamps `shipped_at` and delivery stamps `delivered_at`.
    /// Moving to `Cancelled` cancels the order, restoring stock.
    ///
    /// # Errors
    ///
    /// `NotFound`, `InvalidTransition`, `NotCancellable` when cancelling, or
    /// a store error. Nothing changes on error.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, OrderError> {
        if status == OrderStatus::Cancelled {
            return self.cancel_order(order_id).await;
        }

        let mut uow = self.begin().await?;
        let result = self.transition(&mut uow, order_id, status).await;
        let (order, previous) = finish(uow, result).await?;
        info!(
            order_number = %order.order_number,
            from = %previous,
            to = %status,
            "Order status updated"
        );
        Ok(order)
    }

    /// Cancel a pending or confirmed order and put its quantities back in stock.
    ///
    /// Stock is restored at most once per order, however many cancellations
    /// race for it.
    ///
    /// # Errors
    ///
    /// `NotFound`, `NotCancellable`, or a store error. Nothing changes on error.
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order, OrderError> {
        let mut uow = self.begin().await?;
        let result = cancel(&mut uow, order_id).await;
        let (order, restocked_lines) = finish(uow, result).await?;
        info!(
            order_number = %order.order_number,
            restocked_lines,
            "Order cancelled"
        );
        Ok(order)
    }

    async fn begin(&self) -> Result<UnitOfWork<S>, OrderError> {
        let mut uow = UnitOfWork::new(self.store.clone());
        uow.begin_transaction().await?;
        Ok(uow)
    }

    async fn transition(
        &self,
        uow: &mut UnitOfWork<S>,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<(Order, OrderStatus), OrderError> {
        let mut order = load(uow, order_id).await?;
        let previous = order.status;
        if !previous.can_transition_to(status) {
            return Err(OrderError::InvalidTransition {
                order_number: order.order_number,
                from: previous,
                to: status,
            });
        }

        order.status = status;
        match status {
            OrderStatus::Shipped => order.shipped_at = Some(self.clock.now()),
            OrderStatus::Delivered => order.delivered_at = Some(self.clock.now()),
            OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Cancelled => {}
        }

        if !uow.transaction()?.transition_order(&order, previous).await? {
            let current = load(uow, order_id).await?;
            return Err(OrderError::InvalidTransition {
                order_number: current.order_number,
                from: current.status,
                to: status,
            });
        }
        Ok((order, previous))
    }
}

/// Cancel inside `uow`, returning the order and the number of restocked lines.
async fn cancel<S: Store>(
    uow: &mut UnitOfWork<S>,
    order_id: OrderId,
) -> Result<(Order, usize), OrderError> {
    let mut order = load(uow, order_id).await?;
    let previous = order.status;
    if !previous.is_cancellable() {
        return Err(OrderError::NotCancellable {
            order_number: order.order_number,
            status: previous,
        });
    }

    order.status = OrderStatus::Cancelled;
    if !uow.transaction()?.transition_order(&order, previous).await? {
        let current = load(uow, order_id).await?;
        return Err(OrderError::NotCancellable {
            order_number: current.order_number,
            status: current.status,
        });
    }

    // Only the writer whose status change matched may restock.
    let tx = uow.transaction()?;
    let lines = tx.lines_for_order(order.id).await?;
    for line in &lines {
        tx.restock(line.product_id, line.quantity).await?;
    }
    Ok((order, lines.len()))
}

async fn load<S: Store>(uow: &mut UnitOfWork<S>, order_id: OrderId) -> Result<Order, OrderError> {
    uow.get_by_id::<Order>(order_id)
        .await?
        .ok_or_else(|| OrderError::NotFound(order_id.to_string()))
}

/// Commit on success, otherwise roll back and return the error.
async fn finish<S: Store, T>(
    mut uow: UnitOfWork<S>,
    result: Result<T, OrderError>,
) -> Result<T, OrderError> {
    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = uow.rollback().await {
                error!(error = %rollback_err, "Rollback failed");
            }
            debug!(error = %err, "Order transaction rolled back");
            Err(err)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::{OrderLine, Product};
    use crate::store::memory::MemoryStore;
    use crate::store::{Entity, Table, Transaction};
    use chrono::{DateTime, TimeDelta, Utc};
    use orderline_core::{Money, OrderLineId, PaymentStatus, ShippingAddress};

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
    }

    /// One product with 3 left after an order for 2 of them.
    async fn seeded(
        status: OrderStatus,
        created_at: DateTime<Utc>,
    ) -> (MemoryStore, Product, Order) {
        let store = MemoryStore::new();
        let mut product = Product::new("Widget", "W-1", Money::from_cents(1000), 3);
        product.assign_id();
        let order = Order {
            id: OrderId::generate(),
            order_number: OrderNumber::new(created_at.date_naive(), 1),
            user_id: UserId::generate(),
            total_amount: Money::from_cents(3200),
            shipping_cost: Money::from_cents(1000),
            tax_amount: Money::from_cents(200),
            status,
            payment_status: PaymentStatus::Pending,
            shipping_address: ShippingAddress::default(),
            notes: None,
            created_at,
            shipped_at: None,
            delivered_at: None,
        };
        let line = OrderLine {
            id: OrderLineId::generate(),
            order_id: order.id,
            product_id: product.id,
            quantity: 2,
            unit_price: Money::from_cents(1000),
            line_total: Money::from_cents(2000),
        };
        let mut tx = store.begin().await.unwrap();
        tx.insert(&product).await.unwrap();
        tx.insert(&order).await.unwrap();
        tx.insert(&line).await.unwrap();
        tx.commit().await.unwrap();
        (store, product, order)
    }

    #[tokio::test]
    async fn test_get_order_by_id_and_number() {
        let (store, _, order) = seeded(OrderStatus::Pending, Utc::now()).await;
        let service = OrderService::new(store);

        let by_id = service.get_order(order.id).await.unwrap();
        assert_eq!(by_id.order, order);
        assert_eq!(by_id.lines.len(), 1);
        assert_eq!(by_id.subtotal(), Money::from_cents(2000));

        let by_number = service
            .get_order_by_number(&order.order_number)
            .await
            .unwrap();
        assert_eq!(by_number, by_id);
    }

    #[tokio::test]
    async fn test_missing_order_is_not_found() {
        let service = OrderService::new(MemoryStore::new());
        let err = service.get_order(OrderId::generate()).await.unwrap_err();
        assert!(matches!(err, OrderError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cancel_restocks_each_line() {
        let (store, product, order) = seeded(OrderStatus::Confirmed, Utc::now()).await;
        let service = OrderService::new(store.clone());

        let cancelled = service.cancel_order(order.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        let tables = store.snapshot().await;
        assert_eq!(tables.product(product.id).unwrap().stock_quantity, 5);
    }

    #[tokio::test]
    async fn test_shipped_order_cannot_be_cancelled() {
        let (store, product, order) = seeded(OrderStatus::Shipped, Utc::now()).await;
        let service = OrderService::new(store.clone());

        let err = service
            .update_status(order.id, OrderStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::NotCancellable {
                status: OrderStatus::Shipped,
                ..
            }
        ));
        let tables = store.snapshot().await;
        assert_eq!(tables.product(product.id).unwrap().stock_quantity, 3);
    }

    #[tokio::test]
    async fn test_cancelled_order_cannot_be_reopened() {
        let (store, product, order) = seeded(OrderStatus::Pending, Utc::now()).await;
        let service = OrderService::new(store.clone());
        service.cancel_order(order.id).await.unwrap();

        for next in [OrderStatus::Pending, OrderStatus::Shipped] {
            let err = service.update_status(order.id, next).await.unwrap_err();
            assert!(matches!(
                err,
                OrderError::InvalidTransition {
                    from: OrderStatus::Cancelled,
                    to,
                    ..
                } if to == next
            ));
        }
        assert!(matches!(
            service.cancel_order(order.id).await.unwrap_err(),
            OrderError::NotCancellable { .. }
        ));

        let tables = store.snapshot().await;
        assert_eq!(tables.product(product.id).unwrap().stock_quantity, 5);
        let stored = service.get_order(order.id).await.unwrap();
        assert_eq!(stored.order.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_backward_moves_are_rejected() {
        let (store, _, order) = seeded(OrderStatus::Shipped, Utc::now()).await;
        let service = OrderService::new(store);

        let err = service
            .update_status(order.id, OrderStatus::Confirmed)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidTransition {
                from: OrderStatus::Shipped,
                to: OrderStatus::Confirmed,
                ..
            }
        ));
        service
            .update_status(order.id, OrderStatus::Delivered)
            .await
            .unwrap();
        assert!(
            service
                .update_status(order.id, OrderStatus::Shipped)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_failed_operations_roll_back_their_transaction() {
        let (store, _, order) = seeded(OrderStatus::Shipped, Utc::now()).await;
        let service = OrderService::new(store.clone());

        assert!(service.get_order(OrderId::generate()).await.is_err());
        assert!(
            service
                .get_order_by_number(&OrderNumber::new(Utc::now().date_naive(), 99))
                .await
                .is_err()
        );
        assert!(service.cancel_order(order.id).await.is_err());
        assert!(
            service
                .update_status(order.id, OrderStatus::Pending)
                .await
                .is_err()
        );
        assert!(
            service
                .update_status(OrderId::generate(), OrderStatus::Shipped)
                .await
                .is_err()
        );

        assert_eq!(store.abandoned_transactions(), 0);
    }

    #[tokio::test]
    async fn test_shipping_and_delivery_are_stamped() {
        let placed_at = at("2026-03-01T10:00:00Z");
        let (store, _, order) = seeded(OrderStatus::Confirmed, placed_at).await;
        let clock = Arc::new(FixedClock::new(placed_at + TimeDelta::days(1)));
        let service = OrderService::new(store).with_clock(clock.clone());

        let shipped = service
            .update_status(order.id, OrderStatus::Shipped)
            .await
            .unwrap();
        assert_eq!(shipped.shipped_at, Some(placed_at + TimeDelta::days(1)));
        assert_eq!(shipped.delivered_at, None);

        clock.advance(TimeDelta::days(2));
        let delivered = service
            .update_status(order.id, OrderStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(delivered.shipped_at, shipped.shipped_at);
        assert_eq!(delivered.delivered_at, Some(placed_at + TimeDelta::days(3)));

        let stored = service.get_order(order.id).await.unwrap();
        assert_eq!(stored.order.status, OrderStatus::Delivered);
        assert_eq!(stored.order.total_amount, order.total_amount);
    }

    #[tokio::test]
    async fn test_orders_for_user_newest_first() {
        let (store, _, first) = seeded(OrderStatus::Pending, at("2026-03-01T10:00:00Z")).await;
        let mut second = first.clone();
        second.id = OrderId::generate();
        second.order_number = OrderNumber::new(at("2026-03-02T10:00:00Z").date_naive(), 1);
        second.created_at = at("2026-03-02T10:00:00Z");
        let mut tx = store.begin().await.unwrap();
        Table::<Order>::insert(&mut tx, &second).await.unwrap();
        tx.commit().await.unwrap();

        let service = OrderService::new(store);
        let orders = service.orders_for_user(first.user_id).await.unwrap();
        let ids: Vec<_> = orders.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert!(
            service
                .orders_for_user(UserId::generate())
                .await
                .unwrap()
                .is_empty()
        );
    }
}
