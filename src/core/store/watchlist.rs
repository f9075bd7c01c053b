//! Watchlist repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::{Database, WatchlistStore};
use crate::core::domain::{ConditionId, TokenId, WatchStatus, WatchlistEntry};
use crate::error::{Error, Result};

/// PostgreSQL-backed watchlist store.
pub struct PgWatchlistStore {
    db: Database,
}

impl PgWatchlistStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(sqlx::FromRow)]
struct WatchlistRow {
    token_id: String,
    condition_id: String,
    question: String,
    trigger_price: Option<Decimal>,
    initial_score: f64,
    current_score: f64,
    time_to_end_hours: f64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WatchlistRow {
    fn into_entry(self) -> Result<WatchlistEntry> {
        let status = WatchStatus::parse(&self.status).ok_or_else(|| {
            Error::invalid("status", format!("unknown watch status {:?}", self.status))
        })?;
        Ok(WatchlistEntry {
            token_id: TokenId::from(self.token_id),
            condition_id: ConditionId::from(self.condition_id),
            question: self.question,
            trigger_price: self.trigger_price,
            initial_score: self.initial_score,
            current_score: self.current_score,
            time_to_end_hours: self.time_to_end_hours,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[async_trait]
impl WatchlistStore for PgWatchlistStore {
    async fn upsert(&self, entry: &WatchlistEntry) -> Result<()> {
        self.db
            .with_retry("watchlist_upsert", || {
                sqlx::query(
                    r"
                    INSERT INTO stream_watchlist
                        (token_id, condition_id, question, trigger_price, initial_score,
                         current_score, time_to_end_hours, status, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                    ON CONFLICT (token_id) DO UPDATE
                    SET question = EXCLUDED.question,
                        trigger_price = EXCLUDED.trigger_price,
                        initial_score = EXCLUDED.initial_score,
                        current_score = EXCLUDED.current_score,
                        time_to_end_hours = EXCLUDED.time_to_end_hours,
                        status = EXCLUDED.status,
                        updated_at = EXCLUDED.updated_at
                    ",
                )
                .bind(entry.token_id.as_str())
                .bind(entry.condition_id.as_str())
                .bind(&entry.question)
                .bind(entry.trigger_price)
                .bind(entry.initial_score)
                .bind(entry.current_score)
                .bind(entry.time_to_end_hours)
                .bind(entry.status.as_str())
                .bind(entry.created_at)
                .bind(entry.updated_at)
                .execute(self.db.pool())
            })
            .await?;
        Ok(())
    }

    async fn get(&self, token_id: &TokenId) -> Result<Option<WatchlistEntry>> {
        let row: Option<WatchlistRow> = self
            .db
            .with_retry("watchlist_get", || {
                sqlx::query_as(
                    r"
                    SELECT token_id, condition_id, question, trigger_price, initial_score,
                           current_score, time_to_end_hours, status, created_at, updated_at
                    FROM stream_watchlist
                    WHERE token_id = $1
                    ",
                )
                .bind(token_id.as_str())
                .fetch_optional(self.db.pool())
            })
            .await?;
        row.map(WatchlistRow::into_entry).transpose()
    }

    async fn active(&self) -> Result<Vec<WatchlistEntry>> {
        let rows: Vec<WatchlistRow> = self
            .db
            .with_retry("watchlist_active", || {
                sqlx::query_as(
                    r"
                    SELECT token_id, condition_id, question, trigger_price, initial_score,
                           current_score, time_to_end_hours, status, created_at, updated_at
                    FROM stream_watchlist
                    WHERE status = 'watching'
                    ORDER BY created_at
                    ",
                )
                .fetch_all(self.db.pool())
            })
            .await?;
        rows.into_iter().map(WatchlistRow::into_entry).collect()
    }

    async fn update_score(
        &self,
        token_id: &TokenId,
        score: f64,
        time_to_end_hours: Option<f64>,
    ) -> Result<()> {
        self.db
            .with_retry("watchlist_update_score", || {
                sqlx::query(
                    r"
                    UPDATE stream_watchlist
                    SET current_score = $2,
                        time_to_end_hours = COALESCE($3, time_to_end_hours),
                        updated_at = NOW()
                    WHERE token_id = $1
                    ",
                )
                .bind(token_id.as_str())
                .bind(score)
                .bind(time_to_end_hours)
                .execute(self.db.pool())
            })
            .await?;
        Ok(())
    }

    async fn set_status(&self, token_id: &TokenId, status: WatchStatus) -> Result<()> {
        self.db
            .with_retry("watchlist_set_status", || {
                sqlx::query(
                    "UPDATE stream_watchlist SET status = $2, updated_at = NOW() WHERE token_id = $1",
                )
                .bind(token_id.as_str())
                .bind(status.as_str())
                .execute(self.db.pool())
            })
            .await?;
        Ok(())
    }

    async fn append_score_history(&self, token_id: &TokenId, score: f64) -> Result<()> {
        self.db
            .with_retry("watchlist_history", || {
                sqlx::query(
                    "INSERT INTO watchlist_score_history (token_id, score, recorded_at) \
                     VALUES ($1, $2, NOW())",
                )
                .bind(token_id.as_str())
                .bind(score)
                .execute(self.db.pool())
            })
            .await?;
        Ok(())
    }

    async fn expire_ending(&self, min_hours: f64) -> Result<u64> {
        let result = self
            .db
            .with_retry("watchlist_expire", || {
                sqlx::query(
                    r"
                    UPDATE stream_watchlist
                    SET status = 'expired', updated_at = NOW()
                    WHERE status = 'watching' AND time_to_end_hours <= $1
                    ",
                )
                .bind(min_hours)
                .execute(self.db.pool())
            })
            .await?;
        Ok(result.rows_affected())
    }
}
