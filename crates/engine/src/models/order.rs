use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orderline_core::{
    Money, OrderId, OrderLineId, OrderNumber, OrderStatus, PaymentStatus, ProductId,
    ShippingAddress, UserId,
};

/// A placed order.
///
/// Amounts are stored rounded to cents. `total_amount` is always
/// `subtotal + shipping_cost + tax_amount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub user_id: UserId,
    pub total_amount: Money,
    pub shipping_cost: Money,
    pub tax_amount: Money,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub shipping_address: ShippingAddress,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Sum of the line totals, derived from the stored amounts.
    #[must_use]
    pub fn subtotal(&self) -> Money {
        self.total_amount - self.shipping_cost - self.tax_amount
    }

    /// Copy the fields that may change after placement.
    ///
    /// Number, owner, amounts and address are fixed once an order exists.
    pub fn apply_fulfilment(&mut self, from: &Self) {
        self.status = from.status;
        self.payment_status = from.payment_status;
        self.notes.clone_from(&from.notes);
        self.shipped_at = from.shipped_at;
        self.delivered_at = from.delivered_at;
    }
}

/// One priced quantity of one product within an order. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i32,
    /// Product price at checkout.
    pub unit_price: Money,
    pub line_total: Money,
}

/// An order together with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

impl PlacedOrder {
    /// Sum of the line totals.
    #[must_use]
    pub fn subtotal(&self) -> Money {
        self.lines.iter().map(|line| line.line_total).sum()
    }
}
