//! Product rows and stock movements.

use chrono::{DateTime, Utc};

use orderline_core::{Money, ProductId};

use super::{PgTx, expect_row};
use crate::models::Product;
use crate::store::{Entity, StockLedger, StoreError, Table};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    name: String,
    sku: String,
    price: Money,
    stock_quantity: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            sku: row.sku,
            price: row.price,
            stock_quantity: row.stock_quantity,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

const SELECT_PRODUCTS: &str = r"
    SELECT id, name, sku, price, stock_quantity, is_active, created_at
    FROM products
";

// =============================================================================
// Table
// =============================================================================

impl Table<Product> for PgTx {
    async fn find(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!("{SELECT_PRODUCTS} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn find_all(&mut self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!("{SELECT_PRODUCTS} ORDER BY name"))
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert(&mut self, product: &Product) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO products (id, name, sku, price, stock_quantity, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.sku)
        .bind(product.price)
        .bind(product.stock_quantity)
        .bind(product.is_active)
        .bind(product.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    /// Writes everything except `stock_quantity`, which only moves through
    /// [`StockLedger`].
    async fn update(&mut self, product: &Product) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE products
            SET name = $2, sku = $3, price = $4, is_active = $5
            WHERE id = $1
            ",
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.sku)
        .bind(product.price)
        .bind(product.is_active)
        .execute(&mut *self.tx)
        .await?;
        expect_row(&result, Product::KIND, product.id)
    }

    async fn delete(&mut self, id: ProductId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        expect_row(&result, Product::KIND, id)
    }
}

// =============================================================================
// Stock
// =============================================================================

impl StockLedger for PgTx {
    async fn decrement_stock(
        &mut self,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r"
            UPDATE products
            SET stock_quantity = stock_quantity - $2
            WHERE id = $1 AND stock_quantity >= $2
            ",
        )
        .bind(product_id)
        .bind(quantity)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn restock(&mut self, product_id: ProductId, quantity: i32) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE products SET stock_quantity = stock_quantity + $2 WHERE id = $1",
        )
        .bind(product_id)
        .bind(quantity)
        .execute(&mut *self.tx)
        .await?;
        expect_row(&result, Product::KIND, product_id)
    }
}
