use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orderline_core::{CartLineId, Money, ProductId, UserId};

use super::Product;

/// One product in a user's cart.
///
/// A user has at most one line per product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: CartLineId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: i32,
    /// Price shown when the item was added. Checkout always charges the
    /// product's current price.
    pub unit_price_snapshot: Option<Money>,
    pub created_at: DateTime<Utc>,
}

impl CartLine {
    /// A new cart line without an id.
    #[must_use]
    pub fn new(user_id: UserId, product_id: ProductId, quantity: i32) -> Self {
        Self {
            id: CartLineId::nil(),
            user_id,
            product_id,
            quantity,
            unit_price_snapshot: None,
            created_at: Utc::now(),
        }
    }
}

/// A cart line joined with the product as it is at checkout time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLine {
    pub cart_line: CartLine,
    pub product: Product,
}

impl CheckoutLine {
    /// Quantity requested by the cart.
    #[must_use]
    pub const fn requested(&self) -> i32 {
        self.cart_line.quantity
    }

    /// Current price times requested quantity, unrounded.
    #[must_use]
    pub fn extended_price(&self) -> Money {
        self.product.price * self.cart_line.quantity
    }
}
