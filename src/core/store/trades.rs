//! Trade repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::{Database, TradeStore};
use crate::core::domain::{ConditionId, Side, TokenId, Trade};
use crate::error::{Error, Result};

/// PostgreSQL-backed trade store.
pub struct PgTradeStore {
    db: Database,
}

impl PgTradeStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(sqlx::FromRow)]
struct TradeRow {
    condition_id: String,
    trade_id: String,
    token_id: String,
    price: Decimal,
    size: Decimal,
    side: String,
    executed_at: DateTime<Utc>,
}

impl TradeRow {
    fn into_trade(self) -> Result<Trade> {
        let side = Side::parse(&self.side)
            .ok_or_else(|| Error::invalid("side", format!("unknown side {:?}", self.side)))?;
        Ok(Trade {
            condition_id: ConditionId::from(self.condition_id),
            trade_id: self.trade_id,
            token_id: TokenId::from(self.token_id),
            price: self.price,
            size: self.size,
            side,
            timestamp: self.executed_at,
        })
    }
}

#[async_trait]
impl TradeStore for PgTradeStore {
    async fn upsert_trades(&self, trades: &[Trade]) -> Result<u64> {
        let mut inserted = 0;
        for trade in trades {
            let result = self
                .db
                .with_retry("trade_upsert", || {
                    sqlx::query(
                        r"
                        INSERT INTO trades
                            (condition_id, trade_id, token_id, price, size, side, executed_at)
                        VALUES ($1, $2, $3, $4, $5, $6, $7)
                        ON CONFLICT (condition_id, trade_id) DO NOTHING
                        ",
                    )
                    .bind(trade.condition_id.as_str())
                    .bind(&trade.trade_id)
                    .bind(trade.token_id.as_str())
                    .bind(trade.price)
                    .bind(trade.size)
                    .bind(trade.side.as_str())
                    .bind(trade.timestamp)
                    .execute(self.db.pool())
                })
                .await?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    async fn recent_by_condition(
        &self,
        condition_id: &ConditionId,
        limit: i64,
    ) -> Result<Vec<Trade>> {
        let rows: Vec<TradeRow> = self
            .db
            .with_retry("trade_recent", || {
                sqlx::query_as(
                    r"
                    SELECT condition_id, trade_id, token_id, price, size, side, executed_at
                    FROM trades
                    WHERE condition_id = $1
                    ORDER BY executed_at DESC
                    LIMIT $2
                    ",
                )
                .bind(condition_id.as_str())
                .bind(limit)
                .fetch_all(self.db.pool())
            })
            .await?;
        rows.into_iter().map(TradeRow::into_trade).collect()
    }
}
