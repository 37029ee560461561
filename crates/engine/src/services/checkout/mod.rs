//! Checkout: turning a cart into an order.
//!
//! ```text
//! NotStarted ─► CartLoaded ─► StockReserved ─► OrderAssembled ─► CartCleared ─► Committed
//!      │             │              │                 │                │
//!      └─────────────┴──────────────┴─────────────────┴────────────────┴──► RolledBack
//! ```
//!
//! All steps share one [`UnitOfWork`] and one transaction. Any error rolls
//! the transaction back before it is returned, so cart and stock are exactly
//! as they were. The only automatic retry is for an order number that
//! collides with a concurrently placed order.

mod assembly;
mod cart_snapshot;
mod order_number;
mod reservation;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use orderline_core::{ShippingAddress, UserId};

pub use assembly::{PricingError, PricingPolicy, Totals, assemble, line_total};
pub use cart_snapshot::load_for_checkout;
pub use order_number::{DailySequence, OrderNumberGenerator};
pub use reservation::reserve_stock;

use crate::clock::{Clock, SystemClock};
use crate::config::CheckoutConfig;
use crate::error::CheckoutError;
use crate::models::{CartLine, CheckoutLine, Order, OrderLine, PlacedOrder};
use crate::services::events::{OrderEventSink, OrderPlaced, TracingSink};
use crate::store::{ORDER_NUMBER_CONSTRAINT, Store, Transaction};
use crate::unit_of_work::UnitOfWork;

/// Savepoint taken before the order insert so a number collision can be
/// undone without losing the stock reservations.
const ORDER_SAVEPOINT: &str = "order_insert";

/// Order number attempts per checkout: the first plus one retry.
const ORDER_NUMBER_ATTEMPTS: u32 = 2;

/// Where a checkout is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutState {
    NotStarted,
    CartLoaded,
    StockReserved,
    OrderAssembled,
    CartCleared,
    Committed,
    RolledBack,
}

impl CheckoutState {
    /// The next state on the success path, if any.
    #[must_use]
    pub const fn successor(self) -> Option<Self> {
        match self {
            Self::NotStarted => Some(Self::CartLoaded),
            Self::CartLoaded => Some(Self::StockReserved),
            Self::StockReserved => Some(Self::OrderAssembled),
            Self::OrderAssembled => Some(Self::CartCleared),
            Self::CartCleared => Some(Self::Committed),
            Self::Committed | Self::RolledBack => None,
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }

    fn advance_to(&mut self, next: Self) {
        debug_assert!(
            self.successor() == Some(next)
                || (next == Self::RolledBack && !self.is_terminal()),
            "illegal checkout transition {self:?} -> {next:?}"
        );
        debug!(from = ?*self, to = ?next, "Checkout state");
        *self = next;
    }
}

/// What the caller supplies to place an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    pub shipping_address: ShippingAddress,
    pub notes: Option<String>,
}

impl PlaceOrderRequest {
    /// Maximum length of order notes.
    pub const MAX_NOTES_LENGTH: usize = 1000;

    #[must_use]
    pub const fn new(shipping_address: ShippingAddress) -> Self {
        Self {
            shipping_address,
            notes: None,
        }
    }

    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Check the request before any transaction is opened.
    ///
    /// # Errors
    ///
    /// `InvalidShippingAddress` or `NotesTooLong`.
    pub fn validate(&self) -> Result<(), CheckoutError> {
        self.shipping_address.validate()?;
        if self
            .notes
            .as_ref()
            .is_some_and(|notes| notes.chars().count() > Self::MAX_NOTES_LENGTH)
        {
            return Err(CheckoutError::NotesTooLong {
                max: Self::MAX_NOTES_LENGTH,
            });
        }
        Ok(())
    }
}

/// Places orders.
///
/// Cheap to share behind an `Arc`; every call works on its own unit of work.
pub struct CheckoutService<S: Store, G = DailySequence> {
    store: S,
    pricing: PricingPolicy,
    timeout: Option<Duration>,
    numbers: G,
    clock: Arc<dyn Clock>,
    events: Arc<dyn OrderEventSink>,
}

impl<S: Store> CheckoutService<S> {
    /// A service using the system clock, daily order numbers and a
    /// log-only event sink.
    #[must_use]
    pub fn new(store: S, config: CheckoutConfig) -> Self {
        Self {
            store,
            pricing: config.pricing,
            timeout: config.timeout,
            numbers: DailySequence,
            clock: Arc::new(SystemClock),
            events: Arc::new(TracingSink),
        }
    }
}

impl<S: Store, G: OrderNumberGenerator> CheckoutService<S, G> {
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn OrderEventSink>) -> Self {
        self.events = events;
        self
    }

    /// Swap the order number generator.
    #[must_use]
    pub fn with_order_numbers<H: OrderNumberGenerator>(self, numbers: H) -> CheckoutService<S, H> {
        CheckoutService {
            store: self.store,
            pricing: self.pricing,
            timeout: self.timeout,
            numbers,
            clock: self.clock,
            events: self.events,
        }
    }

    #[must_use]
    pub const fn pricing(&self) -> &PricingPolicy {
        &self.pricing
    }

    /// Convert the user's cart into a `Pending` order.
    ///
    /// On success the order and its lines are committed, stock is reduced by
    /// each line's quantity and the cart is empty. On failure nothing has
    /// changed.
    ///
    /// # Errors
    ///
    /// See [`CheckoutError`]; [`CheckoutError::class`] says whether the user
    /// can fix it.
    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn place_order(
        &self,
        user_id: UserId,
        request: PlaceOrderRequest,
    ) -> Result<PlacedOrder, CheckoutError> {
        request.validate()?;

        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.checkout(user_id, &request))
                .await
                .unwrap_or(Err(CheckoutError::TimedOut(limit))),
            None => self.checkout(user_id, &request).await,
        };

        match outcome {
            Ok(placed) => {
                info!(
                    order_id = %placed.order.id,
                    order_number = %placed.order.order_number,
                    total = %placed.order.total_amount,
                    lines = placed.lines.len(),
                    "Order placed"
                );
                self.publish(&placed);
                Ok(placed)
            }
            Err(err) => {
                if err.is_client_error() {
                    info!(error = %err, "Checkout rejected");
                } else {
                    err.report();
                }
                Err(err)
            }
        }
    }

    /// What checking out the current cart would cost, without changing anything.
    ///
    /// # Errors
    ///
    /// `EmptyCart`, `ProductUnavailable` or a store error.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn quote(&self, user_id: UserId) -> Result<Totals, CheckoutError> {
        let mut uow = UnitOfWork::new(self.store.clone());
        uow.begin_transaction().await?;
        let lines = load_for_checkout(&mut uow, user_id).await;
        uow.rollback().await?;
        let lines = lines?;
        Ok(self.pricing.totals(lines.iter().map(line_total)))
    }

    /// One attempt inside its own transaction, rolled back on any error.
    async fn checkout(
        &self,
        user_id: UserId,
        request: &PlaceOrderRequest,
    ) -> Result<PlacedOrder, CheckoutError> {
        let mut uow = UnitOfWork::new(self.store.clone());
        uow.begin_transaction().await?;

        let mut state = CheckoutState::NotStarted;
        match self.run(&mut uow, &mut state, user_id, request).await {
            Ok(placed) => Ok(placed),
            Err(err) => {
                let failed_at = state;
                state.advance_to(CheckoutState::RolledBack);
                if let Err(rollback_err) = uow.rollback().await {
                    error!(error = %rollback_err, "Rollback failed");
                }
                debug!(?failed_at, error = %err, "Checkout rolled back");
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        uow: &mut UnitOfWork<S>,
        state: &mut CheckoutState,
        user_id: UserId,
        request: &PlaceOrderRequest,
    ) -> Result<PlacedOrder, CheckoutError> {
        let lines = load_for_checkout(uow, user_id).await?;
        state.advance_to(CheckoutState::CartLoaded);

        reserve_stock(uow, &lines).await?;
        state.advance_to(CheckoutState::StockReserved);

        let placed = self.insert_order(uow, user_id, &lines, request).await?;
        state.advance_to(CheckoutState::OrderAssembled);

        for line in &lines {
            uow.delete::<CartLine>(line.cart_line.id);
        }
        uow.persist().await?;
        state.advance_to(CheckoutState::CartCleared);

        uow.commit().await?;
        state.advance_to(CheckoutState::Committed);
        Ok(placed)
    }

    /// Mint a number, build the order and write it, regenerating the number
    /// once if it collides.
    async fn insert_order(
        &self,
        uow: &mut UnitOfWork<S>,
        user_id: UserId,
        lines: &[CheckoutLine],
        request: &PlaceOrderRequest,
    ) -> Result<PlacedOrder, CheckoutError> {
        let now = self.clock.now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let number = self.numbers.generate(uow.transaction()?, now).await?;
            let placed = assemble(user_id, number, lines, request, &self.pricing, now);

            uow.transaction()?.savepoint(ORDER_SAVEPOINT).await?;
            assembly::stage(uow, &placed);

            match uow.persist().await {
                Ok(_) => {
                    uow.transaction()?.release_savepoint(ORDER_SAVEPOINT).await?;
                    return Ok(placed);
                }
                Err(err)
                    if err.is_unique_violation_of(ORDER_NUMBER_CONSTRAINT)
                        && attempt < ORDER_NUMBER_ATTEMPTS =>
                {
                    warn!(
                        order_number = %placed.order.order_number,
                        attempt,
                        "Order number already taken, regenerating"
                    );
                    let tx = uow.transaction()?;
                    tx.rollback_to_savepoint(ORDER_SAVEPOINT).await?;
                    tx.release_savepoint(ORDER_SAVEPOINT).await?;
                    uow.discard::<Order>();
                    uow.discard::<OrderLine>();
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn publish(&self, placed: &PlacedOrder) {
        let event = OrderPlaced::from(placed);
        if let Err(e) = self.events.publish(&event) {
            warn!(
                error = %e,
                order_number = %event.order_number,
                "Failed to publish order event"
            );
        }
    }
}
