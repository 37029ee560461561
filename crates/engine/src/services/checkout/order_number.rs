//! Order number generation.
//!
//! The default [`DailySequence`] counts the orders already placed on the
//! current UTC day and takes the next number. Two checkouts that count at the
//! same time mint the same number; the unique constraint on
//! `orders.order_number` rejects the second insert and checkout regenerates
//! once.

use std::future::Future;

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};

use orderline_core::OrderNumber;

use crate::store::{OrderQueries, StoreError};

/// Mints order numbers inside the checkout transaction.
pub trait OrderNumberGenerator: Send + Sync {
    /// Produce a number for an order placed at `now`.
    fn generate<Q: OrderQueries>(
        &self,
        queries: &mut Q,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<OrderNumber, StoreError>> + Send;
}

/// `ORD-YYYYMMDD-NNNN`, where `NNNN` is one more than the day's order count.
#[derive(Debug, Clone, Copy, Default)]
pub struct DailySequence;

impl OrderNumberGenerator for DailySequence {
    async fn generate<Q: OrderQueries>(
        &self,
        queries: &mut Q,
        now: DateTime<Utc>,
    ) -> Result<OrderNumber, StoreError> {
        let date = now.date_naive();
        let start = date.and_time(NaiveTime::MIN).and_utc();
        let placed_today = queries
            .count_orders_created_between(start, start + TimeDelta::days(1))
            .await?;

        let sequence = u32::try_from(placed_today + 1).map_err(|_| {
            StoreError::DataCorruption(format!("order count {placed_today} out of range"))
        })?;
        Ok(OrderNumber::new(date, sequence))
    }
}
