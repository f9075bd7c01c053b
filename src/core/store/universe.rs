//! Market universe and tier-request repository.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Database, UniverseQuery, UniverseStore};
use crate::core::domain::{ConditionId, MarketUniverse, PriceSnapshot, Tier, TierRequest};
use crate::error::{Error, Result};

/// PostgreSQL-backed universe store.
pub struct PgUniverseStore {
    db: Database,
}

impl PgUniverseStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(sqlx::FromRow)]
struct UniverseRow {
    condition_id: String,
    question: String,
    category: Option<String>,
    tier: i16,
    interestingness_score: f64,
    pinned_tier: Option<i16>,
    last_strategy_signal_at: Option<DateTime<Utc>>,
    score_below_threshold_since: Option<DateTime<Utc>>,
    price: Option<f64>,
    volume_24h: f64,
    liquidity: f64,
    trade_count_24h: i64,
    price_change_24h: f64,
    price_change_1h: f64,
    spread: Option<f64>,
    days_to_end: Option<f64>,
    market_age_days: Option<f64>,
    outcome_count: i32,
    updated_at: DateTime<Utc>,
}

impl UniverseRow {
    fn into_universe(self) -> Result<MarketUniverse> {
        let tier = Tier::from_i16(self.tier)
            .ok_or_else(|| Error::invalid("tier", format!("unknown tier {}", self.tier)))?;
        let pinned_tier = match self.pinned_tier {
            Some(v) => Some(
                Tier::from_i16(v)
                    .ok_or_else(|| Error::invalid("pinned_tier", format!("unknown tier {v}")))?,
            ),
            None => None,
        };
        Ok(MarketUniverse {
            condition_id: ConditionId::from(self.condition_id),
            question: self.question,
            category: self.category,
            tier,
            interestingness_score: self.interestingness_score,
            pinned_tier,
            last_strategy_signal_at: self.last_strategy_signal_at,
            score_below_threshold_since: self.score_below_threshold_since,
            price: self.price,
            volume_24h: self.volume_24h,
            liquidity: self.liquidity,
            trade_count_24h: self.trade_count_24h,
            price_change_24h: self.price_change_24h,
            price_change_1h: self.price_change_1h,
            spread: self.spread,
            days_to_end: self.days_to_end,
            market_age_days: self.market_age_days,
            outcome_count: self.outcome_count,
            updated_at: self.updated_at,
        })
    }
}

const UNIVERSE_COLUMNS: &str = "condition_id, question, category, tier, interestingness_score, \
     pinned_tier, last_strategy_signal_at, score_below_threshold_since, price, volume_24h, \
     liquidity, trade_count_24h, price_change_24h, price_change_1h, spread, days_to_end, \
     market_age_days, outcome_count, updated_at";

#[async_trait]
impl UniverseStore for PgUniverseStore {
    async fn upsert_many(&self, rows: &[MarketUniverse]) -> Result<u64> {
        let mut written = 0;
        for m in rows {
            let result = self
                .db
                .with_retry("universe_upsert", || {
                    sqlx::query(
                        r"
                        INSERT INTO market_universe
                            (condition_id, question, category, tier, interestingness_score,
                             pinned_tier, last_strategy_signal_at, score_below_threshold_since,
                             price, volume_24h, liquidity, trade_count_24h, price_change_24h,
                             price_change_1h, spread, days_to_end, market_age_days,
                             outcome_count, updated_at)
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                                $14, $15, $16, $17, $18, NOW())
                        ON CONFLICT (condition_id) DO UPDATE
                        SET question = EXCLUDED.question,
                            category = EXCLUDED.category,
                            price = EXCLUDED.price,
                            volume_24h = EXCLUDED.volume_24h,
                            liquidity = EXCLUDED.liquidity,
                            trade_count_24h = EXCLUDED.trade_count_24h,
                            price_change_24h = EXCLUDED.price_change_24h,
                            price_change_1h = EXCLUDED.price_change_1h,
                            spread = EXCLUDED.spread,
                            days_to_end = EXCLUDED.days_to_end,
                            market_age_days = EXCLUDED.market_age_days,
                            outcome_count = EXCLUDED.outcome_count,
                            updated_at = NOW()
                        ",
                    )
                    .bind(m.condition_id.as_str())
                    .bind(&m.question)
                    .bind(&m.category)
                    .bind(m.tier.as_i16())
                    .bind(m.interestingness_score)
                    .bind(m.pinned_tier.map(Tier::as_i16))
                    .bind(m.last_strategy_signal_at)
                    .bind(m.score_below_threshold_since)
                    .bind(m.price)
                    .bind(m.volume_24h)
                    .bind(m.liquidity)
                    .bind(m.trade_count_24h)
                    .bind(m.price_change_24h)
                    .bind(m.price_change_1h)
                    .bind(m.spread)
                    .bind(m.days_to_end)
                    .bind(m.market_age_days)
                    .bind(m.outcome_count)
                    .execute(self.db.pool())
                })
                .await?;
            written += result.rows_affected();
        }
        Ok(written)
    }

    async fn by_tier(&self, tier: Tier) -> Result<Vec<MarketUniverse>> {
        let sql = format!(
            "SELECT {UNIVERSE_COLUMNS} FROM market_universe \
             WHERE tier = $1 ORDER BY interestingness_score DESC"
        );
        let rows: Vec<UniverseRow> = self
            .db
            .with_retry("universe_by_tier", || {
                sqlx::query_as(&sql)
                    .bind(tier.as_i16())
                    .fetch_all(self.db.pool())
            })
            .await?;
        rows.into_iter().map(UniverseRow::into_universe).collect()
    }

    async fn tier_counts(&self) -> Result<HashMap<i16, i64>> {
        let rows: Vec<(i16, i64)> = self
            .db
            .with_retry("universe_tier_counts", || {
                sqlx::query_as("SELECT tier, COUNT(*) FROM market_universe GROUP BY tier")
                    .fetch_all(self.db.pool())
            })
            .await?;
        Ok(rows.into_iter().collect())
    }

    async fn query(&self, query: &UniverseQuery) -> Result<Vec<MarketUniverse>> {
        // Deterministic selection: highest score first.
        let sql = format!(
            "SELECT {UNIVERSE_COLUMNS} FROM market_universe \
             WHERE ($1::smallint IS NULL OR tier = $1) \
               AND ($2::float8 IS NULL OR interestingness_score >= $2) \
             ORDER BY interestingness_score DESC \
             LIMIT $3"
        );
        let rows: Vec<UniverseRow> = self
            .db
            .with_retry("universe_query", || {
                sqlx::query_as(&sql)
                    .bind(query.tier.map(Tier::as_i16))
                    .bind(query.min_interestingness)
                    .bind(query.limit.unwrap_or(i64::MAX))
                    .fetch_all(self.db.pool())
            })
            .await?;
        rows.into_iter().map(UniverseRow::into_universe).collect()
    }

    async fn promote(
        &self,
        condition_id: &ConditionId,
        target: Tier,
        reason: &str,
    ) -> Result<bool> {
        let result = self
            .db
            .with_retry("universe_promote", || {
                sqlx::query(
                    r"
                    UPDATE market_universe
                    SET tier = $2, last_tier_change_reason = $3, updated_at = NOW()
                    WHERE condition_id = $1 AND tier < $2
                    ",
                )
                .bind(condition_id.as_str())
                .bind(target.as_i16())
                .bind(reason)
                .execute(self.db.pool())
            })
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn demote(&self, condition_id: &ConditionId, target: Tier) -> Result<bool> {
        let result = self
            .db
            .with_retry("universe_demote", || {
                sqlx::query(
                    r"
                    UPDATE market_universe
                    SET tier = $2, updated_at = NOW()
                    WHERE condition_id = $1
                      AND tier > $2
                      AND (pinned_tier IS NULL OR pinned_tier <= $2)
                    ",
                )
                .bind(condition_id.as_str())
                .bind(target.as_i16())
                .execute(self.db.pool())
            })
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_scores(
        &self,
        scores: &[(ConditionId, f64)],
        low_score_threshold: f64,
    ) -> Result<u64> {
        let mut updated = 0;
        for (condition_id, score) in scores {
            let result = self
                .db
                .with_retry("universe_update_score", || {
                    sqlx::query(
                        r"
                        UPDATE market_universe
                        SET interestingness_score = $2,
                            score_below_threshold_since = CASE
                                WHEN $2 < $3 THEN COALESCE(score_below_threshold_since, NOW())
                                ELSE NULL
                            END,
                            updated_at = NOW()
                        WHERE condition_id = $1
                        ",
                    )
                    .bind(condition_id.as_str())
                    .bind(score)
                    .bind(low_score_threshold)
                    .execute(self.db.pool())
                })
                .await?;
            updated += result.rows_affected();
        }
        Ok(updated)
    }

    async fn record_strategy_signal(&self, condition_id: &ConditionId) -> Result<()> {
        self.db
            .with_retry("universe_signal", || {
                sqlx::query(
                    "UPDATE market_universe SET last_strategy_signal_at = NOW() \
                     WHERE condition_id = $1",
                )
                .bind(condition_id.as_str())
                .execute(self.db.pool())
            })
            .await?;
        Ok(())
    }

    async fn active_tier_requests(&self) -> Result<Vec<TierRequest>> {
        let rows: Vec<(String, String, i16, String, DateTime<Utc>, DateTime<Utc>)> = self
            .db
            .with_retry("tier_requests_active", || {
                sqlx::query_as(
                    r"
                    SELECT strategy_name, condition_id, requested_tier, reason,
                           requested_at, expires_at
                    FROM tier_requests
                    WHERE expires_at > NOW()
                    ORDER BY requested_at
                    ",
                )
                .fetch_all(self.db.pool())
            })
            .await?;
        rows.into_iter()
            .map(|(strategy_name, condition_id, tier, reason, requested_at, expires_at)| {
                let requested_tier = Tier::from_i16(tier)
                    .ok_or_else(|| Error::invalid("requested_tier", format!("unknown tier {tier}")))?;
                Ok(TierRequest {
                    strategy_name,
                    condition_id: ConditionId::from(condition_id),
                    requested_tier,
                    reason,
                    requested_at,
                    expires_at,
                })
            })
            .collect()
    }

    async fn create_tier_request(&self, request: &TierRequest) -> Result<()> {
        self.db
            .with_retry("tier_request_create", || {
                sqlx::query(
                    r"
                    INSERT INTO tier_requests
                        (strategy_name, condition_id, requested_tier, reason,
                         requested_at, expires_at)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    ",
                )
                .bind(&request.strategy_name)
                .bind(request.condition_id.as_str())
                .bind(request.requested_tier.as_i16())
                .bind(&request.reason)
                .bind(request.requested_at)
                .bind(request.expires_at)
                .execute(self.db.pool())
            })
            .await?;
        Ok(())
    }

    async fn cleanup_expired_requests(&self) -> Result<u64> {
        let result = self
            .db
            .with_retry("tier_request_cleanup", || {
                sqlx::query("DELETE FROM tier_requests WHERE expires_at <= NOW()")
                    .execute(self.db.pool())
            })
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_price_snapshots(&self, snapshots: &[PriceSnapshot]) -> Result<u64> {
        let mut written = 0;
        for snapshot in snapshots {
            let result = self
                .db
                .with_retry("price_snapshot_insert", || {
                    sqlx::query(
                        "INSERT INTO price_snapshots (condition_id, price, captured_at) \
                         VALUES ($1, $2, $3)",
                    )
                    .bind(snapshot.condition_id.as_str())
                    .bind(snapshot.price)
                    .bind(snapshot.captured_at)
                    .execute(self.db.pool())
                })
                .await?;
            written += result.rows_affected();
        }
        Ok(written)
    }

    async fn snapshot_price_before(
        &self,
        condition_id: &ConditionId,
        seconds_ago: f64,
    ) -> Result<Option<f64>> {
        // Parameterized interval: no string interpolation of time values.
        let price: Option<f64> = self
            .db
            .with_retry("price_snapshot_before", || {
                sqlx::query_scalar(
                    r"
                    SELECT price FROM price_snapshots
                    WHERE condition_id = $1
                      AND captured_at <= NOW() - make_interval(secs => $2)
                    ORDER BY captured_at DESC
                    LIMIT 1
                    ",
                )
                .bind(condition_id.as_str())
                .bind(seconds_ago)
                .fetch_optional(self.db.pool())
            })
            .await?;
        Ok(price)
    }

    async fn top_by_volume(&self, limit: i64) -> Result<Vec<MarketUniverse>> {
        let sql = format!(
            "SELECT {UNIVERSE_COLUMNS} FROM market_universe \
             ORDER BY volume_24h DESC LIMIT $1"
        );
        let rows: Vec<UniverseRow> = self
            .db
            .with_retry("universe_top_volume", || {
                sqlx::query_as(&sql).bind(limit).fetch_all(self.db.pool())
            })
            .await?;
        rows.into_iter().map(UniverseRow::into_universe).collect()
    }
}
