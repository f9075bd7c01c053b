//! Position and exit-event repository.
//!
//! All timestamps are TIMESTAMPTZ and come back as UTC; rows migrated from
//! older naive-timestamp data are normalized by PostgreSQL at the column
//! boundary rather than rewritten.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::{Database, PositionStore};
use crate::core::domain::{
    ConditionId, ExitEvent, ExitStatus, ExitType, OrderId, Position, PositionId, PositionStatus,
    TokenId,
};
use crate::error::{Error, Result};

/// PostgreSQL-backed position store.
pub struct PgPositionStore {
    db: Database,
}

impl PgPositionStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(sqlx::FromRow)]
struct PositionRow {
    position_id: String,
    token_id: String,
    condition_id: String,
    size: Decimal,
    entry_price: Decimal,
    entry_cost: Decimal,
    entry_time: DateTime<Utc>,
    hold_start_at: DateTime<Utc>,
    hold_hours: f64,
    realized_pnl: Decimal,
    current_price: Option<Decimal>,
    unrealized_pnl: Option<Decimal>,
    status: String,
    exit_order_id: Option<String>,
    exit_timestamp: Option<DateTime<Utc>>,
}

impl PositionRow {
    fn into_position(self) -> Result<Position> {
        let status = PositionStatus::parse(&self.status).ok_or_else(|| {
            Error::invalid("status", format!("unknown position status {:?}", self.status))
        })?;
        Ok(Position {
            id: PositionId::from(self.position_id),
            token_id: TokenId::from(self.token_id),
            condition_id: ConditionId::from(self.condition_id),
            size: self.size,
            entry_price: self.entry_price,
            entry_cost: self.entry_cost,
            entry_time: self.entry_time,
            hold_start_at: self.hold_start_at,
            hold_hours: self.hold_hours,
            realized_pnl: self.realized_pnl,
            current_price: self.current_price,
            unrealized_pnl: self.unrealized_pnl,
            status,
            exit_order_id: self.exit_order_id.map(OrderId::from),
            exit_timestamp: self.exit_timestamp,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ExitRow {
    position_id: String,
    exit_type: String,
    entry_price: Decimal,
    exit_price: Decimal,
    size: Decimal,
    gross_pnl: Decimal,
    net_pnl: Decimal,
    hours_held: f64,
    status: String,
    created_at: DateTime<Utc>,
}

impl ExitRow {
    fn into_event(self) -> Result<ExitEvent> {
        let exit_type = ExitType::parse(&self.exit_type).ok_or_else(|| {
            Error::invalid("exit_type", format!("unknown exit type {:?}", self.exit_type))
        })?;
        let status = match self.status.as_str() {
            "pending" => ExitStatus::Pending,
            "executed" => ExitStatus::Executed,
            other => {
                return Err(Error::invalid(
                    "status",
                    format!("unknown exit status {other:?}"),
                ))
            }
        };
        Ok(ExitEvent {
            position_id: PositionId::from(self.position_id),
            exit_type,
            entry_price: self.entry_price,
            exit_price: self.exit_price,
            size: self.size,
            gross_pnl: self.gross_pnl,
            net_pnl: self.net_pnl,
            hours_held: self.hours_held,
            status,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl PositionStore for PgPositionStore {
    async fn upsert(&self, position: &Position) -> Result<()> {
        self.db
            .with_retry("position_upsert", || {
                sqlx::query(
                    r"
                    INSERT INTO positions
                        (position_id, token_id, condition_id, size, entry_price, entry_cost,
                         entry_time, hold_start_at, hold_hours, realized_pnl, current_price,
                         unrealized_pnl, status, exit_order_id, exit_timestamp)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                    ON CONFLICT (position_id) DO UPDATE
                    SET size = EXCLUDED.size,
                        entry_price = EXCLUDED.entry_price,
                        entry_cost = EXCLUDED.entry_cost,
                        hold_start_at = EXCLUDED.hold_start_at,
                        hold_hours = EXCLUDED.hold_hours,
                        realized_pnl = EXCLUDED.realized_pnl,
                        current_price = EXCLUDED.current_price,
                        unrealized_pnl = EXCLUDED.unrealized_pnl,
                        status = EXCLUDED.status,
                        exit_order_id = EXCLUDED.exit_order_id,
                        exit_timestamp = EXCLUDED.exit_timestamp
                    ",
                )
                .bind(position.id.as_str())
                .bind(position.token_id.as_str())
                .bind(position.condition_id.as_str())
                .bind(position.size)
                .bind(position.entry_price)
                .bind(position.entry_cost)
                .bind(position.entry_time)
                .bind(position.hold_start_at)
                .bind(position.hold_hours)
                .bind(position.realized_pnl)
                .bind(position.current_price)
                .bind(position.unrealized_pnl)
                .bind(position.status.as_str())
                .bind(position.exit_order_id.as_ref().map(OrderId::as_str))
                .bind(position.exit_timestamp)
                .execute(self.db.pool())
            })
            .await?;
        Ok(())
    }

    async fn get(&self, id: &PositionId) -> Result<Option<Position>> {
        let row: Option<PositionRow> = self
            .db
            .with_retry("position_get", || {
                sqlx::query_as(
                    r"
                    SELECT position_id, token_id, condition_id, size, entry_price, entry_cost,
                           entry_time, hold_start_at, hold_hours, realized_pnl, current_price,
                           unrealized_pnl, status, exit_order_id, exit_timestamp
                    FROM positions
                    WHERE position_id = $1
                    ",
                )
                .bind(id.as_str())
                .fetch_optional(self.db.pool())
            })
            .await?;
        row.map(PositionRow::into_position).transpose()
    }

    async fn open_positions(&self) -> Result<Vec<Position>> {
        let rows: Vec<PositionRow> = self
            .db
            .with_retry("position_open", || {
                sqlx::query_as(
                    r"
                    SELECT position_id, token_id, condition_id, size, entry_price, entry_cost,
                           entry_time, hold_start_at, hold_hours, realized_pnl, current_price,
                           unrealized_pnl, status, exit_order_id, exit_timestamp
                    FROM positions
                    WHERE status = 'open'
                    ORDER BY entry_time
                    ",
                )
                .fetch_all(self.db.pool())
            })
            .await?;
        rows.into_iter().map(PositionRow::into_position).collect()
    }

    async fn record_exit(&self, event: &ExitEvent) -> Result<()> {
        self.db
            .with_retry("exit_record", || {
                sqlx::query(
                    r"
                    INSERT INTO exit_events
                        (position_id, exit_type, entry_price, exit_price, size,
                         gross_pnl, net_pnl, hours_held, status, created_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                    ",
                )
                .bind(event.position_id.as_str())
                .bind(event.exit_type.as_str())
                .bind(event.entry_price)
                .bind(event.exit_price)
                .bind(event.size)
                .bind(event.gross_pnl)
                .bind(event.net_pnl)
                .bind(event.hours_held)
                .bind(event.status.as_str())
                .bind(event.created_at)
                .execute(self.db.pool())
            })
            .await?;
        Ok(())
    }

    async fn exits_for(&self, position_id: &PositionId) -> Result<Vec<ExitEvent>> {
        let rows: Vec<ExitRow> = self
            .db
            .with_retry("exit_list", || {
                sqlx::query_as(
                    r"
                    SELECT position_id, exit_type, entry_price, exit_price, size,
                           gross_pnl, net_pnl, hours_held, status, created_at
                    FROM exit_events
                    WHERE position_id = $1
                    ORDER BY created_at
                    ",
                )
                .bind(position_id.as_str())
                .fetch_all(self.db.pool())
            })
            .await?;
        rows.into_iter().map(ExitRow::into_event).collect()
    }
}
