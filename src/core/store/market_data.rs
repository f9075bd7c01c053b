//! Tier-2/3 market data: candles and order book snapshots.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::{Database, MarketDataStore};
use crate::core::domain::{BookLevel, BookSnapshot, TokenId};
use crate::error::Result;

/// PostgreSQL-backed candle and book snapshot store.
pub struct PgMarketDataStore {
    db: Database,
}

impl PgMarketDataStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn levels_json(levels: &[BookLevel]) -> serde_json::Value {
        serde_json::Value::Array(
            levels
                .iter()
                .map(|l| {
                    serde_json::json!({
                        "price": l.price.to_string(),
                        "size": l.size.to_string(),
                    })
                })
                .collect(),
        )
    }
}

#[async_trait]
impl MarketDataStore for PgMarketDataStore {
    async fn record_book_snapshot(&self, snapshot: &BookSnapshot) -> Result<()> {
        let bids = Self::levels_json(&snapshot.bids);
        let asks = Self::levels_json(&snapshot.asks);
        self.db
            .with_retry("book_snapshot", || {
                sqlx::query(
                    r"
                    INSERT INTO book_snapshots
                        (token_id, condition_id, best_bid, best_ask, bids, asks, captured_at)
                    VALUES ($1, $2, $3, $4, $5, $6, NOW())
                    ",
                )
                .bind(snapshot.token_id.as_str())
                .bind(snapshot.condition_id.as_ref().map(|c| c.as_str()))
                .bind(snapshot.best_bid())
                .bind(snapshot.best_ask())
                .bind(&bids)
                .bind(&asks)
                .execute(self.db.pool())
            })
            .await?;
        Ok(())
    }

    async fn upsert_candle(
        &self,
        token_id: &TokenId,
        price: Decimal,
        size: Option<Decimal>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.db
            .with_retry("candle_upsert", || {
                sqlx::query(
                    r"
                    INSERT INTO candles
                        (token_id, bucket_start, open, high, low, close, volume)
                    VALUES ($1, date_trunc('minute', $2::timestamptz), $3, $3, $3, $3,
                            COALESCE($4, 0))
                    ON CONFLICT (token_id, bucket_start) DO UPDATE
                    SET high = GREATEST(candles.high, EXCLUDED.high),
                        low = LEAST(candles.low, EXCLUDED.low),
                        close = EXCLUDED.close,
                        volume = candles.volume + EXCLUDED.volume
                    ",
                )
                .bind(token_id.as_str())
                .bind(at)
                .bind(price)
                .bind(size)
                .execute(self.db.pool())
            })
            .await?;
        Ok(())
    }
}
