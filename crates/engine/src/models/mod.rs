//! Domain models persisted by the engine.
//!
//! These are plain data; validation of inputs happens in the core types
//! ([`orderline_core::ShippingAddress`], [`orderline_core::OrderNumber`]) and
//! invariants that span rows are enforced by the store.

mod cart;
mod order;
mod product;

pub use cart::{CartLine, CheckoutLine};
pub use order::{Order, OrderLine, PlacedOrder};
pub use product::Product;

use orderline_core::{CartLineId, OrderId, OrderLineId, ProductId};

use crate::store::Entity;

macro_rules! entity {
    ($model:ty, $id:ty, $kind:literal) => {
        impl Entity for $model {
            type Id = $id;
            const KIND: &'static str = $kind;

            fn id(&self) -> $id {
                self.id
            }

            fn assign_id(&mut self) -> $id {
                if self.id.is_nil() {
                    self.id = <$id>::generate();
                }
                self.id
            }
        }
    };
}

entity!(Product, ProductId, "product");
entity!(CartLine, CartLineId, "cart_line");
entity!(Order, OrderId, "order");
entity!(OrderLine, OrderLineId, "order_line");

#[cfg(test)]
mod tests {
    use super::*;
    use orderline_core::Money;

    #[test]
    fn test_assign_id_fills_nil_only() {
        let mut product = Product::new("Widget", "W-1", Money::from_cents(500), 3);
        assert!(product.id.is_nil());

        let assigned = product.assign_id();
        assert!(!assigned.is_nil());
        assert_eq!(product.assign_id(), assigned);
    }
}
