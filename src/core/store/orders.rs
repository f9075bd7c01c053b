//! Order repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::{Database, OrderStore};
use crate::core::domain::{ConditionId, Order, OrderId, OrderMode, OrderStatus, Side, TokenId};
use crate::error::{Error, Result};

/// Closed allow-list of sort fields exposed to callers. Anything outside it
/// is rejected before the field name is interpolated into SQL.
const SORT_FIELDS: &[&str] = &[
    "created_at",
    "updated_at",
    "price",
    "size",
    "filled_size",
    "status",
];

/// PostgreSQL-backed order store.
pub struct PgOrderStore {
    db: Database,
}

impl PgOrderStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    order_id: String,
    token_id: String,
    condition_id: String,
    side: String,
    price: Decimal,
    size: Decimal,
    filled_size: Decimal,
    avg_fill_price: Option<Decimal>,
    status: String,
    mode: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self) -> Result<Order> {
        let side = Side::parse(&self.side)
            .ok_or_else(|| Error::invalid("side", format!("unknown side {:?}", self.side)))?;
        let status = OrderStatus::parse(&self.status).ok_or_else(|| {
            Error::invalid("status", format!("unknown order status {:?}", self.status))
        })?;
        let mode = OrderMode::parse(&self.mode)
            .ok_or_else(|| Error::invalid("mode", format!("unknown order mode {:?}", self.mode)))?;
        Ok(Order {
            id: OrderId::from(self.order_id),
            token_id: TokenId::from(self.token_id),
            condition_id: ConditionId::from(self.condition_id),
            side,
            price: self.price,
            size: self.size,
            filled_size: self.filled_size,
            avg_fill_price: self.avg_fill_price,
            status,
            mode,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn upsert(&self, order: &Order) -> Result<()> {
        self.db
            .with_retry("order_upsert", || {
                sqlx::query(
                    r"
                    INSERT INTO orders
                        (order_id, token_id, condition_id, side, price, size,
                         filled_size, avg_fill_price, status, mode, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                    ON CONFLICT (order_id) DO UPDATE
                    SET filled_size = EXCLUDED.filled_size,
                        avg_fill_price = EXCLUDED.avg_fill_price,
                        status = EXCLUDED.status,
                        updated_at = EXCLUDED.updated_at
                    ",
                )
                .bind(order.id.as_str())
                .bind(order.token_id.as_str())
                .bind(order.condition_id.as_str())
                .bind(order.side.as_str())
                .bind(order.price)
                .bind(order.size)
                .bind(order.filled_size)
                .bind(order.avg_fill_price)
                .bind(order.status.as_str())
                .bind(order.mode.as_str())
                .bind(order.created_at)
                .bind(order.updated_at)
                .execute(self.db.pool())
            })
            .await?;
        Ok(())
    }

    async fn replace_id(&self, old: &OrderId, new: &OrderId) -> Result<()> {
        self.db
            .with_retry("order_replace_id", || {
                sqlx::query("UPDATE orders SET order_id = $2, updated_at = NOW() WHERE order_id = $1")
                    .bind(old.as_str())
                    .bind(new.as_str())
                    .execute(self.db.pool())
            })
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &OrderId) -> Result<()> {
        self.db
            .with_retry("order_delete", || {
                sqlx::query("DELETE FROM orders WHERE order_id = $1")
                    .bind(id.as_str())
                    .execute(self.db.pool())
            })
            .await?;
        Ok(())
    }

    async fn get(&self, id: &OrderId) -> Result<Option<Order>> {
        let row: Option<OrderRow> = self
            .db
            .with_retry("order_get", || {
                sqlx::query_as(
                    r"
                    SELECT order_id, token_id, condition_id, side, price, size,
                           filled_size, avg_fill_price, status, mode, created_at, updated_at
                    FROM orders
                    WHERE order_id = $1
                    ",
                )
                .bind(id.as_str())
                .fetch_optional(self.db.pool())
            })
            .await?;
        row.map(OrderRow::into_order).transpose()
    }

    async fn open_orders(&self) -> Result<Vec<Order>> {
        let rows: Vec<OrderRow> = self
            .db
            .with_retry("order_open", || {
                sqlx::query_as(
                    r"
                    SELECT order_id, token_id, condition_id, side, price, size,
                           filled_size, avg_fill_price, status, mode, created_at, updated_at
                    FROM orders
                    WHERE status IN ('pending', 'live', 'partial')
                    ORDER BY created_at
                    ",
                )
                .fetch_all(self.db.pool())
            })
            .await?;
        rows.into_iter().map(OrderRow::into_order).collect()
    }

    async fn list(&self, sort_by: &str, limit: i64) -> Result<Vec<Order>> {
        if !SORT_FIELDS.contains(&sort_by) {
            return Err(Error::invalid(
                "sort_by",
                format!("{sort_by:?} is not a sortable field"),
            ));
        }
        // Safe: sort_by was just validated against the closed allow-list.
        let sql = format!(
            "SELECT order_id, token_id, condition_id, side, price, size, \
             filled_size, avg_fill_price, status, mode, created_at, updated_at \
             FROM orders ORDER BY {sort_by} DESC LIMIT $1"
        );
        let rows: Vec<OrderRow> = self
            .db
            .with_retry("order_list", || {
                sqlx::query_as(&sql).bind(limit).fetch_all(self.db.pool())
            })
            .await?;
        rows.into_iter().map(OrderRow::into_order).collect()
    }
}
