//! Post-commit order notifications.
//!
//! Publishing is fire-and-forget: it happens after the checkout transaction
//! has committed, and a failed publish is logged without affecting the
//! order.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::info;

use orderline_core::{Money, OrderId, OrderNumber, UserId};

use crate::models::PlacedOrder;

/// Emitted once per committed checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub user_id: UserId,
    pub total_amount: Money,
    pub line_count: usize,
    pub placed_at: DateTime<Utc>,
}

impl OrderPlaced {
    /// Topic name for message brokers.
    pub const TOPIC: &'static str = "order.placed";
}

impl From<&PlacedOrder> for OrderPlaced {
    fn from(placed: &PlacedOrder) -> Self {
        Self {
            order_id: placed.order.id,
            order_number: placed.order.order_number.clone(),
            user_id: placed.order.user_id,
            total_amount: placed.order.total_amount,
            line_count: placed.lines.len(),
            placed_at: placed.order.created_at,
        }
    }
}

/// Errors a sink may report.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("No subscribers")]
    NoSubscribers,
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Receives order events.
pub trait OrderEventSink: Send + Sync + fmt::Debug {
    /// Deliver an event without blocking.
    ///
    /// # Errors
    ///
    /// Returns an error if the event could not be handed off.
    fn publish(&self, event: &OrderPlaced) -> Result<(), PublishError>;
}

/// Writes each event to the log as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl OrderEventSink for TracingSink {
    fn publish(&self, event: &OrderPlaced) -> Result<(), PublishError> {
        let payload = serde_json::to_string(event)?;
        info!(topic = OrderPlaced::TOPIC, %payload, "Order event");
        Ok(())
    }
}

/// Fans events out to in-process subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<OrderPlaced>,
}

impl BroadcastSink {
    /// A sink that buffers up to `capacity` events per lagging subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<OrderPlaced> {
        self.sender.subscribe()
    }
}

impl OrderEventSink for BroadcastSink {
    fn publish(&self, event: &OrderPlaced) -> Result<(), PublishError> {
        self.sender
            .send(event.clone())
            .map(drop)
            .map_err(|_| PublishError::NoSubscribers)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn event() -> OrderPlaced {
        OrderPlaced {
            order_id: OrderId::generate(),
            order_number: OrderNumber::new(chrono::NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(), 3),
            user_id: UserId::generate(),
            total_amount: Money::from_cents(3750),
            line_count: 2,
            placed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscribers() {
        let sink = BroadcastSink::new(8);
        let mut rx = sink.subscribe();
        let sent = event();
        sink.publish(&sent).unwrap();
        assert_eq!(rx.recv().await.unwrap(), sent);
    }

    #[test]
    fn test_broadcast_without_subscribers_fails() {
        let sink = BroadcastSink::new(8);
        assert!(matches!(
            sink.publish(&event()),
            Err(PublishError::NoSubscribers)
        ));
    }

    #[test]
    fn test_event_serializes_money_as_string() {
        let json = serde_json::to_value(event()).unwrap();
        assert_eq!(json["total_amount"], "37.50");
        assert_eq!(json["order_number"], "ORD-20260102-0003");
    }
}
