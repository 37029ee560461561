//! In-process store.
//!
//! A transaction holds the whole-store lock for its lifetime and works on a
//! private copy of the tables, so transactions are fully serialized and
//! nothing is visible to others until commit. Constraints mirror the
//! `PostgreSQL` schema: primary keys, unique order numbers, one cart line per
//! user and product, non-negative stock and positive quantities.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use orderline_core::{
    CartLineId, OrderId, OrderLineId, OrderNumber, OrderStatus, ProductId, UserId,
};

use super::{
    CartQueries, Entity, ORDER_NUMBER_CONSTRAINT, OrderQueries, StockLedger, Store, StoreError,
    Table, Transaction,
};
use crate::models::{CartLine, CheckoutLine, Order, OrderLine, Product};

/// Committed contents of a [`MemoryStore`].
#[derive(Debug, Clone, Default)]
pub struct Tables {
    products: BTreeMap<ProductId, Product>,
    cart_lines: BTreeMap<CartLineId, CartLine>,
    orders: BTreeMap<OrderId, Order>,
    order_lines: BTreeMap<OrderLineId, OrderLine>,
}

impl Tables {
    #[must_use]
    pub fn product(&self, id: ProductId) -> Option<&Product> {
        self.products.get(&id)
    }

    /// A user's cart lines, oldest first.
    #[must_use]
    pub fn cart_for(&self, user_id: UserId) -> Vec<&CartLine> {
        let mut lines: Vec<_> = self
            .cart_lines
            .values()
            .filter(|line| line.user_id == user_id)
            .collect();
        lines.sort_by_key(|line| line.created_at);
        lines
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    #[must_use]
    pub fn lines_for(&self, order_id: OrderId) -> Vec<&OrderLine> {
        self.order_lines
            .values()
            .filter(|line| line.order_id == order_id)
            .collect()
    }
}

#[derive(Debug, Default)]
struct Faults {
    fail_next_commit: AtomicBool,
    unavailable: AtomicBool,
}

/// In-memory [`Store`], cheap to clone and shared between clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Faults>,
    abandoned: Arc<AtomicUsize>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the committed state. Waits for any open transaction.
    pub async fn snapshot(&self) -> Tables {
        self.tables.lock().await.clone()
    }

    /// Make the next commit fail with [`StoreError::Unavailable`].
    pub fn fail_next_commit(&self) {
        self.faults.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Make `begin` fail with [`StoreError::Unavailable`] until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Transactions dropped without an explicit commit or rollback.
    #[must_use]
    pub fn abandoned_transactions(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }
}

impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, StoreError> {
        if self.faults.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        let committed = Arc::clone(&self.tables).lock_owned().await;
        let working = committed.clone();
        Ok(MemoryTx {
            committed,
            working,
            savepoints: Vec::new(),
            faults: Arc::clone(&self.faults),
            abandoned: Arc::clone(&self.abandoned),
            finished: false,
        })
    }
}

/// Transaction on a [`MemoryStore`]. Dropping it discards its writes.
#[derive(Debug)]
pub struct MemoryTx {
    committed: OwnedMutexGuard<Tables>,
    working: Tables,
    savepoints: Vec<(&'static str, Tables)>,
    faults: Arc<Faults>,
    abandoned: Arc<AtomicUsize>,
    finished: bool,
}

impl MemoryTx {
    fn savepoint_index(&self, name: &'static str) -> Result<usize, StoreError> {
        self.savepoints
            .iter()
            .rposition(|(saved, _)| *saved == name)
            .ok_or_else(|| StoreError::not_found("savepoint", name))
    }
}

impl Transaction for MemoryTx {
    async fn commit(mut self) -> Result<(), StoreError> {
        self.finished = true;
        if self.faults.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("commit failed".to_string()));
        }
        *self.committed = std::mem::take(&mut self.working);
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), StoreError> {
        self.finished = true;
        Ok(())
    }

    async fn savepoint(&mut self, name: &'static str) -> Result<(), StoreError> {
        self.savepoints.push((name, self.working.clone()));
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &'static str) -> Result<(), StoreError> {
        let index = self.savepoint_index(name)?;
        self.savepoints.truncate(index + 1);
        if let Some((_, saved)) = self.savepoints.last() {
            self.working = saved.clone();
        }
        Ok(())
    }

    async fn release_savepoint(&mut self, name: &'static str) -> Result<(), StoreError> {
        let index = self.savepoint_index(name)?;
        self.savepoints.truncate(index);
        Ok(())
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if !self.finished {
            self.abandoned.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Entity kinds a [`MemoryStore`] can hold, and the constraints it enforces on them.
pub trait MemoryRow: Entity {
    fn rows(tables: &Tables) -> &BTreeMap<Self::Id, Self>;
    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<Self::Id, Self>;

    /// Reject the row if it would break a constraint. `self` is not yet in
    /// `tables` for inserts; for updates the old version is.
    fn check(&self, tables: &Tables) -> Result<(), StoreError>;

    /// Apply an update to the stored row.
    fn apply_update(stored: &mut Self, incoming: &Self) {
        stored.clone_from(incoming);
    }
}

fn violation(constraint: &str) -> StoreError {
    StoreError::ConstraintViolation {
        constraint: constraint.to_string(),
    }
}

fn unique(constraint: &str) -> StoreError {
    StoreError::UniqueViolation {
        constraint: constraint.to_string(),
    }
}

impl MemoryRow for Product {
    fn rows(tables: &Tables) -> &BTreeMap<ProductId, Self> {
        &tables.products
    }

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<ProductId, Self> {
        &mut tables.products
    }

    fn check(&self, tables: &Tables) -> Result<(), StoreError> {
        if self.stock_quantity < 0 {
            return Err(violation("products_stock_quantity_check"));
        }
        if self.price.is_negative() {
            return Err(violation("products_price_check"));
        }
        if tables
            .products
            .values()
            .any(|p| p.id != self.id && p.sku == self.sku)
        {
            return Err(unique("products_sku_key"));
        }
        Ok(())
    }

    fn apply_update(stored: &mut Self, incoming: &Self) {
        let stock = stored.stock_quantity;
        stored.clone_from(incoming);
        stored.stock_quantity = stock;
    }
}

impl MemoryRow for CartLine {
    fn rows(tables: &Tables) -> &BTreeMap<CartLineId, Self> {
        &tables.cart_lines
    }

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<CartLineId, Self> {
        &mut tables.cart_lines
    }

    fn check(&self, tables: &Tables) -> Result<(), StoreError> {
        if self.quantity <= 0 {
            return Err(violation("cart_lines_quantity_check"));
        }
        if !tables.products.contains_key(&self.product_id) {
            return Err(violation("cart_lines_product_id_fkey"));
        }
        if tables.cart_lines.values().any(|line| {
            line.id != self.id && line.user_id == self.user_id && line.product_id == self.product_id
        }) {
            return Err(unique("cart_lines_user_product_key"));
        }
        Ok(())
    }
}

impl MemoryRow for Order {
    fn rows(tables: &Tables) -> &BTreeMap<OrderId, Self> {
        &tables.orders
    }

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<OrderId, Self> {
        &mut tables.orders
    }

    fn check(&self, tables: &Tables) -> Result<(), StoreError> {
        if tables
            .orders
            .values()
            .any(|o| o.id != self.id && o.order_number == self.order_number)
        {
            return Err(unique(ORDER_NUMBER_CONSTRAINT));
        }
        Ok(())
    }

    fn apply_update(stored: &mut Self, incoming: &Self) {
        stored.apply_fulfilment(incoming);
    }
}

impl MemoryRow for OrderLine {
    fn rows(tables: &Tables) -> &BTreeMap<OrderLineId, Self> {
        &tables.order_lines
    }

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<OrderLineId, Self> {
        &mut tables.order_lines
    }

    fn check(&self, tables: &Tables) -> Result<(), StoreError> {
        if self.quantity <= 0 {
            return Err(violation("order_lines_quantity_check"));
        }
        if !tables.orders.contains_key(&self.order_id) {
            return Err(violation("order_lines_order_id_fkey"));
        }
        if !tables.products.contains_key(&self.product_id) {
            return Err(violation("order_lines_product_id_fkey"));
        }
        Ok(())
    }
}

impl<E: MemoryRow> Table<E> for MemoryTx {
    async fn find(&mut self, id: E::Id) -> Result<Option<E>, StoreError> {
        Ok(E::rows(&self.working).get(&id).cloned())
    }

    async fn find_all(&mut self) -> Result<Vec<E>, StoreError> {
        Ok(E::rows(&self.working).values().cloned().collect())
    }

    async fn insert(&mut self, entity: &E) -> Result<(), StoreError> {
        if E::rows(&self.working).contains_key(&entity.id()) {
            return Err(unique(&format!("{}_pkey", E::KIND)));
        }
        entity.check(&self.working)?;
        E::rows_mut(&mut self.working).insert(entity.id(), entity.clone());
        Ok(())
    }

    async fn update(&mut self, entity: &E) -> Result<(), StoreError> {
        let mut row = E::rows(&self.working)
            .get(&entity.id())
            .cloned()
            .ok_or_else(|| StoreError::not_found(E::KIND, entity.id()))?;
        E::apply_update(&mut row, entity);
        row.check(&self.working)?;
        E::rows_mut(&mut self.working).insert(row.id(), row);
        Ok(())
    }

    async fn delete(&mut self, id: E::Id) -> Result<(), StoreError> {
        E::rows_mut(&mut self.working)
            .remove(&id)
            .map(drop)
            .ok_or_else(|| StoreError::not_found(E::KIND, id))
    }
}

impl CartQueries for MemoryTx {
    async fn checkout_lines(&mut self, user_id: UserId) -> Result<Vec<CheckoutLine>, StoreError> {
        self.working
            .cart_for(user_id)
            .into_iter()
            .map(|line| -> Result<CheckoutLine, StoreError> {
                let product = self.working.product(line.product_id).ok_or_else(|| {
                    StoreError::DataCorruption(format!(
                        "cart line {} references missing product {}",
                        line.id, line.product_id
                    ))
                })?;
                Ok(CheckoutLine {
                    cart_line: line.clone(),
                    product: product.clone(),
                })
            })
            .collect()
    }
}

impl StockLedger for MemoryTx {
    async fn decrement_stock(
        &mut self,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<bool, StoreError> {
        match self.working.products.get_mut(&product_id) {
            Some(product) if product.stock_quantity >= quantity => {
                product.stock_quantity -= quantity;
                debug!(%product_id, quantity, remaining = product.stock_quantity, "Stock decremented");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn restock(&mut self, product_id: ProductId, quantity: i32) -> Result<(), StoreError> {
        let product = self
            .working
            .products
            .get_mut(&product_id)
            .ok_or_else(|| StoreError::not_found(Product::KIND, product_id))?;
        product.stock_quantity = product
            .stock_quantity
            .checked_add(quantity)
            .ok_or_else(|| violation("products_stock_quantity_check"))?;
        Ok(())
    }
}

impl OrderQueries for MemoryTx {
    async fn count_orders_created_between(
        &mut self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let count = self
            .working
            .orders
            .values()
            .filter(|o| o.created_at >= from && o.created_at < to)
            .count();
        i64::try_from(count).map_err(|e| StoreError::DataCorruption(e.to_string()))
    }

    async fn find_order_by_number(
        &mut self,
        number: &OrderNumber,
    ) -> Result<Option<Order>, StoreError> {
        Ok(self
            .working
            .orders
            .values()
            .find(|o| &o.order_number == number)
            .cloned())
    }

    async fn lines_for_order(&mut self, order_id: OrderId) -> Result<Vec<OrderLine>, StoreError> {
        Ok(self
            .working
            .lines_for(order_id)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn orders_for_user(&mut self, user_id: UserId) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self
            .working
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn transition_order(
        &mut self,
        order: &Order,
        expected: OrderStatus,
    ) -> Result<bool, StoreError> {
        match self.working.orders.get_mut(&order.id) {
            Some(stored) if stored.status == expected => {
                stored.status = order.status;
                stored.shipped_at = order.shipped_at;
                stored.delivered_at = order.delivered_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use orderline_core::Money;

    async fn seeded(stock: i32) -> (MemoryStore, Product) {
        let store = MemoryStore::new();
        let mut product = Product::new("Widget", "W-1", Money::from_cents(1000), stock);
        product.assign_id();
        let mut tx = store.begin().await.unwrap();
        tx.insert(&product).await.unwrap();
        tx.commit().await.unwrap();
        (store, product)
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_discarded_on_drop() {
        let (store, product) = seeded(5).await;
        {
            let mut tx = store.begin().await.unwrap();
            assert!(tx.decrement_stock(product.id, 2).await.unwrap());
        }
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.product(product.id).unwrap().stock_quantity, 5);
        assert_eq!(store.abandoned_transactions(), 1);
    }

    #[tokio::test]
    async fn test_finished_transactions_are_not_abandoned() {
        let (store, _) = seeded(5).await;
        store.begin().await.unwrap().rollback().await.unwrap();
        store.begin().await.unwrap().commit().await.unwrap();
        assert_eq!(store.abandoned_transactions(), 0);
    }

    #[tokio::test]
    async fn test_decrement_is_conditional() {
        let (store, product) = seeded(3).await;
        let mut tx = store.begin().await.unwrap();
        assert!(!tx.decrement_stock(product.id, 4).await.unwrap());
        assert!(tx.decrement_stock(product.id, 3).await.unwrap());
        assert!(!tx.decrement_stock(product.id, 1).await.unwrap());
        assert!(!tx.decrement_stock(ProductId::generate(), 1).await.unwrap());
        tx.commit().await.unwrap();
        assert_eq!(store.snapshot().await.product(product.id).unwrap().stock_quantity, 0);
    }

    #[tokio::test]
    async fn test_product_update_keeps_stock() {
        let (store, product) = seeded(5).await;
        let mut tx = store.begin().await.unwrap();
        let mut changed = product.clone();
        changed.stock_quantity = 100;
        changed.price = Money::from_cents(1200);
        tx.update(&changed).await.unwrap();
        let stored = Table::<Product>::find(&mut tx, product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock_quantity, 5);
        assert_eq!(stored.price, Money::from_cents(1200));
    }

    #[tokio::test]
    async fn test_one_cart_line_per_user_and_product() {
        let (store, product) = seeded(5).await;
        let user = UserId::generate();
        let mut tx = store.begin().await.unwrap();

        let mut first = CartLine::new(user, product.id, 1);
        first.assign_id();
        tx.insert(&first).await.unwrap();

        let mut second = CartLine::new(user, product.id, 2);
        second.assign_id();
        let err = tx.insert(&second).await.unwrap_err();
        assert!(err.is_unique_violation_of("cart_lines_user_product_key"));
    }

    #[tokio::test]
    async fn test_savepoint_restores_working_copy() {
        let (store, product) = seeded(5).await;
        let mut tx = store.begin().await.unwrap();
        tx.savepoint("sp").await.unwrap();
        assert!(tx.decrement_stock(product.id, 5).await.unwrap());
        tx.rollback_to_savepoint("sp").await.unwrap();
        let stored = Table::<Product>::find(&mut tx, product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock_quantity, 5);
        tx.release_savepoint("sp").await.unwrap();
        assert!(tx.release_savepoint("sp").await.is_err());
    }

    #[tokio::test]
    async fn test_injected_commit_failure_keeps_committed_state() {
        let (store, product) = seeded(5).await;
        store.fail_next_commit();
        let mut tx = store.begin().await.unwrap();
        assert!(tx.decrement_stock(product.id, 1).await.unwrap());
        assert!(matches!(tx.commit().await, Err(StoreError::Unavailable(_))));
        assert_eq!(store.snapshot().await.product(product.id).unwrap().stock_quantity, 5);
    }

    #[tokio::test]
    async fn test_restock_overflow_is_a_constraint_violation() {
        let (store, product) = seeded(i32::MAX - 1).await;
        let mut tx = store.begin().await.unwrap();
        tx.restock(product.id, 1).await.unwrap();
        let err = tx.restock(product.id, 1).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::ConstraintViolation { ref constraint } if constraint == "products_stock_quantity_check"
        ));
        let stored = Table::<Product>::find(&mut tx, product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock_quantity, i32::MAX);
    }

    #[tokio::test]
    async fn test_transition_only_applies_from_expected_status() {
        use orderline_core::{PaymentStatus, ShippingAddress};

        let store = MemoryStore::new();
        let created_at = Utc::now();
        let order = Order {
            id: OrderId::generate(),
            order_number: OrderNumber::new(created_at.date_naive(), 1),
            user_id: UserId::generate(),
            total_amount: Money::from_cents(1000),
            shipping_cost: Money::from_cents(1000),
            tax_amount: Money::ZERO,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            shipping_address: ShippingAddress::default(),
            notes: None,
            created_at,
            shipped_at: None,
            delivered_at: None,
        };
        let mut tx = store.begin().await.unwrap();
        Table::<Order>::insert(&mut tx, &order).await.unwrap();

        let mut cancelled = order.clone();
        cancelled.status = OrderStatus::Cancelled;
        assert!(tx.transition_order(&cancelled, OrderStatus::Pending).await.unwrap());
        assert!(!tx.transition_order(&cancelled, OrderStatus::Pending).await.unwrap());

        let mut missing = cancelled.clone();
        missing.id = OrderId::generate();
        assert!(!tx.transition_order(&missing, OrderStatus::Pending).await.unwrap());

        tx.commit().await.unwrap();
        let stored = store.snapshot().await.orders().next().cloned().unwrap();
        assert_eq!(stored.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_delete_missing_row_is_not_found() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = Table::<Order>::delete(&mut tx, OrderId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "order", .. }));
    }
}
