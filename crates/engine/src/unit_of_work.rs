//! One transactional boundary over every entity gateway.
//!
//! ```text
//! begin_transaction ─► add/update/delete (staged) ─► persist (flush) ─► commit
//!                                    │                                    │
//!                                    └──────────── rollback ◄─────────────┘
//! ```
//!
//! Staged writes stay in memory until [`UnitOfWork::persist`] or
//! [`UnitOfWork::commit`] flushes them. Capability queries (stock decrements,
//! cart joins) go straight to the open transaction through
//! [`UnitOfWork::transaction`].

use tracing::{debug, instrument, warn};

use crate::models::{CartLine, Order, OrderLine, Product};
use crate::store::gateway::Gateway;
use crate::store::{Entity, Store, StoreError, Table, Transaction};

/// Staged changes for every entity kind.
#[derive(Debug, Default)]
pub struct ChangeSet {
    products: Gateway<Product>,
    cart_lines: Gateway<CartLine>,
    orders: Gateway<Order>,
    order_lines: Gateway<OrderLine>,
}

/// Selects the gateway for an entity kind.
pub trait Staging<E: Entity> {
    fn gateway(&self) -> &Gateway<E>;
    fn gateway_mut(&mut self) -> &mut Gateway<E>;
}

macro_rules! staging {
    ($entity:ty, $field:ident) => {
        impl Staging<$entity> for ChangeSet {
            fn gateway(&self) -> &Gateway<$entity> {
                &self.$field
            }

            fn gateway_mut(&mut self) -> &mut Gateway<$entity> {
                &mut self.$field
            }
        }
    };
}

staging!(Product, products);
staging!(CartLine, cart_lines);
staging!(Order, orders);
staging!(OrderLine, order_lines);

impl ChangeSet {
    /// Total staged changes across all kinds.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.products.pending()
            + self.cart_lines.pending()
            + self.orders.pending()
            + self.order_lines.pending()
    }

    fn discard_all(&mut self) {
        self.products.discard();
        self.cart_lines.discard();
        self.orders.discard();
        self.order_lines.discard();
    }

    /// Flush parents before children: products, orders, order lines, then
    /// cart lines.
    async fn flush<T>(&mut self, tx: &mut T) -> Result<usize, StoreError>
    where
        T: Table<Product> + Table<CartLine> + Table<Order> + Table<OrderLine>,
    {
        let mut count = self.products.flush(tx).await?;
        count += self.orders.flush(tx).await?;
        count += self.order_lines.flush(tx).await?;
        count += self.cart_lines.flush(tx).await?;
        Ok(count)
    }
}

/// Groups staged writes and at most one open transaction.
///
/// Dropping a unit of work with an open transaction rolls that transaction
/// back.
pub struct UnitOfWork<S: Store> {
    store: S,
    tx: Option<S::Tx>,
    changes: ChangeSet,
}

impl<S: Store> UnitOfWork<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            tx: None,
            changes: ChangeSet::default(),
        }
    }

    /// Whether a transaction is open.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.tx.is_some()
    }

    /// Number of staged, unflushed changes.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.changes.pending()
    }

    /// Open a transaction.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::TransactionAlreadyActive` if one is already open,
    /// or the backend's error if it cannot start one.
    #[instrument(skip(self))]
    pub async fn begin_transaction(&mut self) -> Result<(), StoreError> {
        if self.tx.is_some() {
            return Err(StoreError::TransactionAlreadyActive);
        }
        self.tx = Some(self.store.begin().await?);
        debug!("Transaction started");
        Ok(())
    }

    /// The open transaction, for capability queries.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NoActiveTransaction` if none is open.
    pub fn transaction(&mut self) -> Result<&mut S::Tx, StoreError> {
        self.tx.as_mut().ok_or(StoreError::NoActiveTransaction)
    }

    /// Stage an insert, assigning an id if the entity has none.
    pub fn add<E>(&mut self, entity: E) -> E
    where
        E: Entity,
        ChangeSet: Staging<E>,
    {
        Staging::<E>::gateway_mut(&mut self.changes).add(entity)
    }

    /// Stage an update.
    pub fn update<E>(&mut self, entity: E)
    where
        E: Entity,
        ChangeSet: Staging<E>,
    {
        Staging::<E>::gateway_mut(&mut self.changes).update(entity);
    }

    /// Stage a delete.
    pub fn delete<E>(&mut self, id: E::Id)
    where
        E: Entity,
        ChangeSet: Staging<E>,
    {
        Staging::<E>::gateway_mut(&mut self.changes).delete(id);
    }

    /// Drop the staged, unflushed changes for one entity kind.
    pub fn discard<E>(&mut self)
    where
        E: Entity,
        ChangeSet: Staging<E>,
    {
        Staging::<E>::gateway_mut(&mut self.changes).discard();
    }

    /// Read one entity, seeing this unit's staged writes.
    ///
    /// Without an open transaction the read runs in a short transaction of
    /// its own.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the read fails.
    pub async fn get_by_id<E>(&mut self, id: E::Id) -> Result<Option<E>, StoreError>
    where
        E: Entity,
        ChangeSet: Staging<E>,
        S::Tx: Table<E>,
    {
        let gateway = Staging::<E>::gateway(&self.changes);
        if let Some(tx) = self.tx.as_mut() {
            return gateway.get_by_id(tx, id).await;
        }
        let mut tx = self.store.begin().await?;
        let found = gateway.get_by_id(&mut tx, id).await;
        tx.rollback().await?;
        found
    }

    /// Read every entity of a kind, seeing this unit's staged writes.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the read fails.
    pub async fn get_all<E>(&mut self) -> Result<Vec<E>, StoreError>
    where
        E: Entity,
        ChangeSet: Staging<E>,
        S::Tx: Table<E>,
    {
        let gateway = Staging::<E>::gateway(&self.changes);
        if let Some(tx) = self.tx.as_mut() {
            return gateway.get_all(tx).await;
        }
        let mut tx = self.store.begin().await?;
        let found = gateway.get_all(&mut tx).await;
        tx.rollback().await?;
        found
    }

    /// Flush every staged change.
    ///
    /// Inside a transaction the writes stay uncommitted. Without one they are
    /// written and committed as a single batch.
    ///
    /// # Errors
    ///
    /// Returns the first write error. Staged changes are gone afterwards; an
    /// open transaction is left for the caller to roll back.
    #[instrument(skip(self), fields(pending = self.changes.pending()))]
    pub async fn persist(&mut self) -> Result<usize, StoreError> {
        if let Some(tx) = self.tx.as_mut() {
            let flushed = self.changes.flush(tx).await;
            if flushed.is_err() {
                self.changes.discard_all();
            }
            return flushed;
        }

        let mut tx = self.store.begin().await?;
        match self.changes.flush(&mut tx).await {
            Ok(count) => {
                tx.commit().await?;
                debug!(count, "Persisted and committed");
                Ok(count)
            }
            Err(e) => {
                self.changes.discard_all();
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback after failed persist also failed");
                }
                Err(e)
            }
        }
    }

    /// Flush anything still staged and commit. A no-op without a transaction.
    ///
    /// # Errors
    ///
    /// Returns the flush or commit error; the transaction is closed either way.
    #[instrument(skip(self))]
    pub async fn commit(&mut self) -> Result<(), StoreError> {
        let Some(mut tx) = self.tx.take() else {
            return Ok(());
        };

        if let Err(e) = self.changes.flush(&mut tx).await {
            self.changes.discard_all();
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback after failed flush also failed");
            }
            return Err(e);
        }

        tx.commit().await?;
        debug!("Transaction committed");
        Ok(())
    }

    /// Discard every staged change and roll back the open transaction, if any.
    ///
    /// Entities read before the rollback may be stale; re-read them.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the rollback itself fails.
    #[instrument(skip(self))]
    pub async fn rollback(&mut self) -> Result<(), StoreError> {
        self.changes.discard_all();
        match self.tx.take() {
            Some(tx) => {
                tx.rollback().await?;
                debug!("Transaction rolled back");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl<S: Store> Drop for UnitOfWork<S> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            warn!(
                pending = self.changes.pending(),
                "Unit of work dropped with an open transaction; rolling back"
            );
        }
    }
}
