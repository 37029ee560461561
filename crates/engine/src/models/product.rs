use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orderline_core::{Money, ProductId};

/// A sellable product and its on-hand stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Stock keeping unit, unique across the catalog.
    pub sku: String,
    /// Current unit price.
    pub price: Money,
    /// Units on hand. Never negative.
    pub stock_quantity: i32,
    /// Inactive products stay in carts but cannot be checked out.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// A new active product without an id; one is assigned when it is staged.
    #[must_use]
    pub fn new(name: impl Into<String>, sku: impl Into<String>, price: Money, stock: i32) -> Self {
        Self {
            id: ProductId::nil(),
            name: name.into(),
            sku: sku.into(),
            price,
            stock_quantity: stock,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}
