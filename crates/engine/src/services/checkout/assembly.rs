//! Order totals and order construction.
//!
//! Amounts are combined exactly and rounded half-even to cents only where a
//! value is stored: each line total and the tax. The grand total is the exact
//! sum of stored parts, so it never drifts from them by a rounding step.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use orderline_core::{
    Money, OrderId, OrderLineId, OrderNumber, OrderStatus, PaymentStatus, UserId,
};

use super::PlaceOrderRequest;
use crate::models::{CheckoutLine, Order, OrderLine, PlacedOrder};
use crate::store::Store;
use crate::unit_of_work::UnitOfWork;

/// Why a [`PricingPolicy`] was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("shipping cost {0} is negative")]
    NegativeShipping(Money),

    #[error("tax rate {0} is outside 0..=1")]
    RateOutOfRange(Decimal),
}

/// Flat shipping charge and tax rate applied to every order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingPolicy {
    pub shipping_cost: Money,
    pub tax_rate: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            shipping_cost: Money::from_cents(1000),
            tax_rate: Decimal::new(10, 2),
        }
    }
}

impl PricingPolicy {
    /// Build a policy, rounding the shipping charge to cents.
    ///
    /// # Errors
    ///
    /// `NegativeShipping` or `RateOutOfRange` when the rate is outside `0..=1`.
    pub fn new(shipping_cost: Money, tax_rate: Decimal) -> Result<Self, PricingError> {
        if shipping_cost.is_negative() {
            return Err(PricingError::NegativeShipping(shipping_cost));
        }
        if tax_rate.is_sign_negative() || tax_rate > Decimal::ONE {
            return Err(PricingError::RateOutOfRange(tax_rate));
        }
        Ok(Self {
            shipping_cost: shipping_cost.round_for_storage(),
            tax_rate,
        })
    }

    /// Totals for a set of already-rounded line totals.
    #[must_use]
    pub fn totals(&self, line_totals: impl IntoIterator<Item = Money>) -> Totals {
        let subtotal: Money = line_totals.into_iter().sum();
        let tax_amount = subtotal.apply_rate(self.tax_rate).round_for_storage();
        Totals {
            subtotal,
            shipping_cost: self.shipping_cost,
            tax_amount,
            total_amount: subtotal + self.shipping_cost + tax_amount,
        }
    }
}

/// What an order costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub tax_amount: Money,
    pub total_amount: Money,
}

/// Price one cart line at the product's current price.
#[must_use]
pub fn line_total(line: &CheckoutLine) -> Money {
    line.extended_price().round_for_storage()
}

/// Build an order and its lines from a reserved cart snapshot.
///
/// Ids are assigned here so the lines can point at the order before either
/// is written.
#[must_use]
pub fn assemble(
    user_id: UserId,
    order_number: OrderNumber,
    lines: &[CheckoutLine],
    request: &PlaceOrderRequest,
    pricing: &PricingPolicy,
    now: DateTime<Utc>,
) -> PlacedOrder {
    let order_id = OrderId::generate();

    let order_lines: Vec<OrderLine> = lines
        .iter()
        .map(|line| OrderLine {
            id: OrderLineId::generate(),
            order_id,
            product_id: line.product.id,
            quantity: line.requested(),
            unit_price: line.product.price,
            line_total: line_total(line),
        })
        .collect();

    let totals = pricing.totals(order_lines.iter().map(|line| line.line_total));

    let order = Order {
        id: order_id,
        order_number,
        user_id,
        total_amount: totals.total_amount,
        shipping_cost: totals.shipping_cost,
        tax_amount: totals.tax_amount,
        status: OrderStatus::Pending,
        payment_status: PaymentStatus::Pending,
        shipping_address: request.shipping_address.clone(),
        notes: request.notes.clone(),
        created_at: now,
        shipped_at: None,
        delivered_at: None,
    };

    PlacedOrder {
        order,
        lines: order_lines,
    }
}

/// Stage the order, then its lines.
pub fn stage<S: Store>(uow: &mut UnitOfWork<S>, placed: &PlacedOrder) {
    uow.add(placed.order.clone());
    for line in &placed.lines {
        uow.add(line.clone());
    }
}
