//! Order and order line rows.

use chrono::{DateTime, Utc};

use orderline_core::{
    Money, OrderId, OrderLineId, OrderNumber, OrderStatus, PaymentStatus, ProductId,
    ShippingAddress, UserId,
};

use super::{PgTx, expect_row};
use crate::models::{Order, OrderLine};
use crate::store::{Entity, OrderQueries, StoreError, Table};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    order_number: String,
    user_id: UserId,
    total_amount: Money,
    shipping_cost: Money,
    tax_amount: Money,
    status: OrderStatus,
    payment_status: PaymentStatus,
    shipping_first_name: String,
    shipping_last_name: String,
    shipping_address_line1: String,
    shipping_address_line2: Option<String>,
    shipping_city: String,
    shipping_state: String,
    shipping_postal_code: String,
    shipping_country: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let order_number = OrderNumber::parse(&row.order_number).map_err(|e| {
            StoreError::DataCorruption(format!("invalid order number in database: {e}"))
        })?;

        Ok(Self {
            id: row.id,
            order_number,
            user_id: row.user_id,
            total_amount: row.total_amount,
            shipping_cost: row.shipping_cost,
            tax_amount: row.tax_amount,
            status: row.status,
            payment_status: row.payment_status,
            shipping_address: ShippingAddress {
                first_name: row.shipping_first_name,
                last_name: row.shipping_last_name,
                address_line1: row.shipping_address_line1,
                address_line2: row.shipping_address_line2,
                city: row.shipping_city,
                state: row.shipping_state,
                postal_code: row.shipping_postal_code,
                country: row.shipping_country,
            },
            notes: row.notes,
            created_at: row.created_at,
            shipped_at: row.shipped_at,
            delivered_at: row.delivered_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderLineRow {
    id: OrderLineId,
    order_id: OrderId,
    product_id: ProductId,
    quantity: i32,
    unit_price: Money,
    line_total: Money,
}

impl From<OrderLineRow> for OrderLine {
    fn from(row: OrderLineRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            quantity: row.quantity,
            unit_price: row.unit_price,
            line_total: row.line_total,
        }
    }
}

macro_rules! order_columns {
    () => {
        r"id, order_number, user_id, total_amount, shipping_cost, tax_amount,
          status, payment_status,
          shipping_first_name, shipping_last_name, shipping_address_line1,
          shipping_address_line2, shipping_city, shipping_state,
          shipping_postal_code, shipping_country,
          notes, created_at, shipped_at, delivered_at"
    };
}

macro_rules! order_line_columns {
    () => {
        "id, order_id, product_id, quantity, unit_price, line_total"
    };
}

fn into_orders(rows: Vec<OrderRow>) -> Result<Vec<Order>, StoreError> {
    rows.into_iter().map(Order::try_from).collect()
}

// =============================================================================
// Orders
// =============================================================================

impl Table<Order> for PgTx {
    async fn find(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Order::try_from).transpose()
    }

    async fn find_all(&mut self) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM orders ORDER BY created_at DESC"
        ))
        .fetch_all(&mut *self.tx)
        .await?;
        into_orders(rows)
    }

    async fn insert(&mut self, order: &Order) -> Result<(), StoreError> {
        let address = &order.shipping_address;
        sqlx::query(concat!(
            "INSERT INTO orders (",
            order_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                       $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)"
        ))
        .bind(order.id)
        .bind(order.order_number.as_str())
        .bind(order.user_id)
        .bind(order.total_amount)
        .bind(order.shipping_cost)
        .bind(order.tax_amount)
        .bind(order.status)
        .bind(order.payment_status)
        .bind(&address.first_name)
        .bind(&address.last_name)
        .bind(&address.address_line1)
        .bind(&address.address_line2)
        .bind(&address.city)
        .bind(&address.state)
        .bind(&address.postal_code)
        .bind(&address.country)
        .bind(&order.notes)
        .bind(order.created_at)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    /// Writes the fulfilment fields only; see [`Order::apply_fulfilment`].
    async fn update(&mut self, order: &Order) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE orders
            SET status = $2, payment_status = $3, notes = $4,
                shipped_at = $5, delivered_at = $6
            WHERE id = $1
            ",
        )
        .bind(order.id)
        .bind(order.status)
        .bind(order.payment_status)
        .bind(&order.notes)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .execute(&mut *self.tx)
        .await?;
        expect_row(&result, Order::KIND, order.id)
    }

    async fn delete(&mut self, id: OrderId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        expect_row(&result, Order::KIND, id)
    }
}

impl OrderQueries for PgTx {
    async fn count_orders_created_between(
        &mut self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM orders WHERE created_at >= $1 AND created_at < $2",
        )
        .bind(from)
        .bind(to)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count)
    }

    async fn find_order_by_number(
        &mut self,
        number: &OrderNumber,
    ) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM orders WHERE order_number = $1"
        ))
        .bind(number.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Order::try_from).transpose()
    }

    async fn lines_for_order(&mut self, order_id: OrderId) -> Result<Vec<OrderLine>, StoreError> {
        let rows = sqlx::query_as::<_, OrderLineRow>(concat!(
            "SELECT ",
            order_line_columns!(),
            " FROM order_lines WHERE order_id = $1 ORDER BY id"
        ))
        .bind(order_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn orders_for_user(&mut self, user_id: UserId) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM orders WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;
        into_orders(rows)
    }

    /// Compare-and-set on `status`. A concurrent writer that got there first
    /// holds the row lock; once it commits, the predicate is re-checked
    /// against its status and this update matches nothing.
    async fn transition_order(
        &mut self,
        order: &Order,
        expected: OrderStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r"
            UPDATE orders
            SET status = $3, shipped_at = $4, delivered_at = $5
            WHERE id = $1 AND status = $2
            ",
        )
        .bind(order.id)
        .bind(expected)
        .bind(order.status)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Order lines
// =============================================================================

impl Table<OrderLine> for PgTx {
    async fn find(&mut self, id: OrderLineId) -> Result<Option<OrderLine>, StoreError> {
        let row = sqlx::query_as::<_, OrderLineRow>(concat!(
            "SELECT ",
            order_line_columns!(),
            " FROM order_lines WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn find_all(&mut self) -> Result<Vec<OrderLine>, StoreError> {
        let rows = sqlx::query_as::<_, OrderLineRow>(concat!(
            "SELECT ",
            order_line_columns!(),
            " FROM order_lines ORDER BY order_id, id"
        ))
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert(&mut self, line: &OrderLine) -> Result<(), StoreError> {
        sqlx::query(concat!(
            "INSERT INTO order_lines (",
            order_line_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6)"
        ))
        .bind(line.id)
        .bind(line.order_id)
        .bind(line.product_id)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.line_total)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update(&mut self, line: &OrderLine) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE order_lines
            SET quantity = $2, unit_price = $3, line_total = $4
            WHERE id = $1
            ",
        )
        .bind(line.id)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.line_total)
        .execute(&mut *self.tx)
        .await?;
        expect_row(&result, OrderLine::KIND, line.id)
    }

    async fn delete(&mut self, id: OrderLineId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM order_lines WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        expect_row(&result, OrderLine::KIND, id)
    }
}
