//! Market metadata repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::{Database, MarketStore};
use crate::core::domain::{ConditionId, Market, OutcomeToken, TokenId, TokenMeta};
use crate::error::Result;

/// PostgreSQL-backed market metadata store.
pub struct PgMarketStore {
    db: Database,
}

impl PgMarketStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(sqlx::FromRow)]
struct MarketRow {
    condition_id: String,
    question: String,
    category: Option<String>,
    end_date: Option<DateTime<Utc>>,
    resolved: bool,
    resolution_outcome: Option<String>,
    volume_24h: Option<f64>,
    liquidity: Option<f64>,
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    token_id: String,
    outcome: String,
    outcome_index: i32,
    price: Option<Decimal>,
}

#[derive(sqlx::FromRow)]
struct TokenMetaRow {
    token_id: String,
    condition_id: String,
    question: String,
    outcome: String,
    outcome_index: i32,
    category: Option<String>,
    end_date: Option<DateTime<Utc>>,
}

#[async_trait]
impl MarketStore for PgMarketStore {
    async fn upsert_market(&self, market: &Market) -> Result<()> {
        self.db
            .with_retry("market_upsert", || {
                sqlx::query(
                    r"
                    INSERT INTO markets
                        (condition_id, question, category, end_date, resolved,
                         resolution_outcome, volume_24h, liquidity, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
                    ON CONFLICT (condition_id) DO UPDATE
                    SET question = EXCLUDED.question,
                        category = EXCLUDED.category,
                        end_date = EXCLUDED.end_date,
                        resolved = EXCLUDED.resolved,
                        resolution_outcome = EXCLUDED.resolution_outcome,
                        volume_24h = EXCLUDED.volume_24h,
                        liquidity = EXCLUDED.liquidity,
                        updated_at = NOW()
                    ",
                )
                .bind(market.condition_id.as_str())
                .bind(&market.question)
                .bind(&market.category)
                .bind(market.end_date)
                .bind(market.resolved)
                .bind(&market.resolution_outcome)
                .bind(market.volume_24h)
                .bind(market.liquidity)
                .execute(self.db.pool())
            })
            .await?;

        for token in &market.tokens {
            self.db
                .with_retry("market_token_upsert", || {
                    sqlx::query(
                        r"
                        INSERT INTO market_tokens
                            (token_id, condition_id, outcome, outcome_index, price)
                        VALUES ($1, $2, $3, $4, $5)
                        ON CONFLICT (token_id) DO UPDATE
                        SET outcome = EXCLUDED.outcome,
                            outcome_index = EXCLUDED.outcome_index,
                            price = EXCLUDED.price
                        ",
                    )
                    .bind(token.token_id.as_str())
                    .bind(market.condition_id.as_str())
                    .bind(&token.outcome)
                    .bind(token.outcome_index)
                    .bind(token.price)
                    .execute(self.db.pool())
                })
                .await?;
        }
        Ok(())
    }

    async fn market(&self, condition_id: &ConditionId) -> Result<Option<Market>> {
        let row: Option<MarketRow> = self
            .db
            .with_retry("market_get", || {
                sqlx::query_as(
                    r"
                    SELECT condition_id, question, category, end_date, resolved,
                           resolution_outcome, volume_24h, liquidity
                    FROM markets
                    WHERE condition_id = $1
                    ",
                )
                .bind(condition_id.as_str())
                .fetch_optional(self.db.pool())
            })
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let tokens: Vec<TokenRow> = self
            .db
            .with_retry("market_tokens", || {
                sqlx::query_as(
                    r"
                    SELECT token_id, outcome, outcome_index, price
                    FROM market_tokens
                    WHERE condition_id = $1
                    ORDER BY outcome_index
                    ",
                )
                .bind(condition_id.as_str())
                .fetch_all(self.db.pool())
            })
            .await?;

        Ok(Some(Market {
            condition_id: ConditionId::from(row.condition_id),
            question: row.question,
            category: row.category,
            end_date: row.end_date,
            resolved: row.resolved,
            resolution_outcome: row.resolution_outcome,
            tokens: tokens
                .into_iter()
                .map(|t| OutcomeToken {
                    token_id: TokenId::from(t.token_id),
                    outcome: t.outcome,
                    outcome_index: t.outcome_index,
                    price: t.price,
                })
                .collect(),
            volume_24h: row.volume_24h,
            liquidity: row.liquidity,
        }))
    }

    async fn token_meta(&self, token_id: &TokenId) -> Result<Option<TokenMeta>> {
        let row: Option<TokenMetaRow> = self
            .db
            .with_retry("token_meta", || {
                sqlx::query_as(
                    r"
                    SELECT t.token_id, t.condition_id, m.question, t.outcome,
                           t.outcome_index, m.category, m.end_date
                    FROM market_tokens t
                    JOIN markets m ON m.condition_id = t.condition_id
                    WHERE t.token_id = $1
                    ",
                )
                .bind(token_id.as_str())
                .fetch_optional(self.db.pool())
            })
            .await?;

        Ok(row.map(|r| TokenMeta {
            token_id: TokenId::from(r.token_id),
            condition_id: ConditionId::from(r.condition_id),
            question: r.question,
            outcome: r.outcome,
            outcome_index: r.outcome_index,
            category: r.category,
            end_date: r.end_date,
        }))
    }

    async fn mark_resolved(
        &self,
        condition_id: &ConditionId,
        outcome: Option<&str>,
    ) -> Result<()> {
        self.db
            .with_retry("market_resolve", || {
                sqlx::query(
                    r"
                    UPDATE markets
                    SET resolved = TRUE, resolution_outcome = $2, updated_at = NOW()
                    WHERE condition_id = $1
                    ",
                )
                .bind(condition_id.as_str())
                .bind(outcome)
                .execute(self.db.pool())
            })
            .await?;
        self.db
            .with_retry("resolution_record", || {
                sqlx::query(
                    r"
                    INSERT INTO resolutions (condition_id, outcome, resolved_at)
                    VALUES ($1, $2, NOW())
                    ON CONFLICT (condition_id) DO NOTHING
                    ",
                )
                .bind(condition_id.as_str())
                .bind(outcome)
                .execute(self.db.pool())
            })
            .await?;
        Ok(())
    }
}
