//! Cart rows and the checkout join.

use chrono::{DateTime, Utc};

use orderline_core::{CartLineId, Money, ProductId, UserId};

use super::{PgTx, expect_row};
use crate::models::{CartLine, CheckoutLine, Product};
use crate::store::{CartQueries, Entity, StoreError, Table};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct CartLineRow {
    id: CartLineId,
    user_id: UserId,
    product_id: ProductId,
    quantity: i32,
    unit_price_snapshot: Option<Money>,
    created_at: DateTime<Utc>,
}

impl From<CartLineRow> for CartLine {
    fn from(row: CartLineRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            product_id: row.product_id,
            quantity: row.quantity,
            unit_price_snapshot: row.unit_price_snapshot,
            created_at: row.created_at,
        }
    }
}

/// A cart line joined with its product.
#[derive(Debug, sqlx::FromRow)]
struct CheckoutLineRow {
    #[sqlx(flatten)]
    line: CartLineRow,
    name: String,
    sku: String,
    price: Money,
    stock_quantity: i32,
    is_active: bool,
    product_created_at: DateTime<Utc>,
}

impl From<CheckoutLineRow> for CheckoutLine {
    fn from(row: CheckoutLineRow) -> Self {
        let product = Product {
            id: row.line.product_id,
            name: row.name,
            sku: row.sku,
            price: row.price,
            stock_quantity: row.stock_quantity,
            is_active: row.is_active,
            created_at: row.product_created_at,
        };
        Self {
            cart_line: row.line.into(),
            product,
        }
    }
}

const SELECT_CART_LINES: &str = r"
    SELECT id, user_id, product_id, quantity, unit_price_snapshot, created_at
    FROM cart_lines
";

// =============================================================================
// Table
// =============================================================================

impl Table<CartLine> for PgTx {
    async fn find(&mut self, id: CartLineId) -> Result<Option<CartLine>, StoreError> {
        let row =
            sqlx::query_as::<_, CartLineRow>(&format!("{SELECT_CART_LINES} WHERE id = $1"))
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(row.map(Into::into))
    }

    async fn find_all(&mut self) -> Result<Vec<CartLine>, StoreError> {
        let rows =
            sqlx::query_as::<_, CartLineRow>(&format!("{SELECT_CART_LINES} ORDER BY created_at"))
                .fetch_all(&mut *self.tx)
                .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert(&mut self, line: &CartLine) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO cart_lines (id, user_id, product_id, quantity, unit_price_snapshot, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(line.id)
        .bind(line.user_id)
        .bind(line.product_id)
        .bind(line.quantity)
        .bind(line.unit_price_snapshot)
        .bind(line.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update(&mut self, line: &CartLine) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE cart_lines SET quantity = $2, unit_price_snapshot = $3 WHERE id = $1",
        )
        .bind(line.id)
        .bind(line.quantity)
        .bind(line.unit_price_snapshot)
        .execute(&mut *self.tx)
        .await?;
        expect_row(&result, CartLine::KIND, line.id)
    }

    async fn delete(&mut self, id: CartLineId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM cart_lines WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        expect_row(&result, CartLine::KIND, id)
    }
}

impl CartQueries for PgTx {
    async fn checkout_lines(&mut self, user_id: UserId) -> Result<Vec<CheckoutLine>, StoreError> {
        let rows = sqlx::query_as::<_, CheckoutLineRow>(
            r"
            SELECT c.id, c.user_id, c.product_id, c.quantity, c.unit_price_snapshot, c.created_at,
                   p.name, p.sku, p.price, p.stock_quantity, p.is_active,
                   p.created_at AS product_created_at
            FROM cart_lines c
            JOIN products p ON p.id = c.product_id
            WHERE c.user_id = $1
            ORDER BY c.created_at, c.id
            ",
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
