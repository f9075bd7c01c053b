//! First-trigger repository with dual-key deduplication.
//!
//! At most one trigger row may exist per `(condition_id, threshold)` even
//! though several token IDs map to the same condition. The only write path
//! is [`PgTriggerStore::try_record_atomic`], which serializes contenders on
//! a transaction-scoped advisory lock derived from the dedup key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::{Database, TriggerStore};
use crate::core::domain::{ConditionId, TokenId, Trigger};
use crate::error::Result;

/// PostgreSQL-backed trigger store.
pub struct PgTriggerStore {
    db: Database,
}

impl PgTriggerStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Advisory lock key for a `(condition, threshold)` pair.
    ///
    /// Thresholds are normalized so `0.95` and `0.950` contend on the same
    /// lock.
    fn lock_id(condition_id: &ConditionId, threshold: Decimal) -> i64 {
        Database::advisory_lock_id(
            "first_trigger",
            &format!("{}:{}", condition_id.as_str(), threshold.normalize()),
        )
    }
}

#[derive(sqlx::FromRow)]
struct TriggerRow {
    token_id: String,
    condition_id: String,
    threshold: Decimal,
    price: Decimal,
    size: Option<Decimal>,
    score: Option<f64>,
    outcome: Option<String>,
    outcome_index: Option<i32>,
    triggered_at: DateTime<Utc>,
}

impl From<TriggerRow> for Trigger {
    fn from(row: TriggerRow) -> Self {
        Self {
            token_id: TokenId::from(row.token_id),
            condition_id: ConditionId::from(row.condition_id),
            threshold: row.threshold,
            price: row.price,
            size: row.size,
            score: row.score,
            outcome: row.outcome,
            outcome_index: row.outcome_index,
            triggered_at: row.triggered_at,
        }
    }
}


#[async_trait]
impl TriggerStore for PgTriggerStore {
    async fn try_record_atomic(&self, trigger: &Trigger) -> Result<bool> {
        let mut tx = self.db.pool().begin().await?;

        // Serialize all contenders for this (condition, threshold). The lock
        // is transaction-scoped: released automatically at commit/rollback.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(Self::lock_id(&trigger.condition_id, trigger.threshold))
            .execute(&mut *tx)
            .await?;

        // Condition-level check covers the token-level one: any row for this
        // condition at this threshold blocks every token of the condition.
        let existing: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM first_triggers WHERE condition_id = $1 AND threshold = $2 LIMIT 1",
        )
        .bind(trigger.condition_id.as_str())
        .bind(trigger.threshold)
        .fetch_optional(&mut *tx)
        .await?;

        if existing.is_some() {
            tx.rollback().await?;
            return Ok(false);
        }

        let result = sqlx::query(
            r"
            INSERT INTO first_triggers
                (token_id, condition_id, threshold, price, size, score,
                 outcome, outcome_index, triggered_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (token_id, condition_id, threshold) DO NOTHING
            ",
        )
        .bind(trigger.token_id.as_str())
        .bind(trigger.condition_id.as_str())
        .bind(trigger.threshold)
        .bind(trigger.price)
        .bind(trigger.size)
        .bind(trigger.score)
        .bind(&trigger.outcome)
        .bind(trigger.outcome_index)
        .bind(trigger.triggered_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn is_first_trigger(
        &self,
        token_id: &TokenId,
        condition_id: &ConditionId,
        threshold: Decimal,
    ) -> Result<bool> {
        let existing: Option<i32> = self
            .db
            .with_retry("trigger_is_first", || {
                sqlx::query_scalar(
                    r"
                    SELECT 1 FROM first_triggers
                    WHERE token_id = $1 AND condition_id = $2 AND threshold = $3
                    ",
                )
                .bind(token_id.as_str())
                .bind(condition_id.as_str())
                .bind(threshold)
                .fetch_optional(self.db.pool())
            })
            .await?;
        Ok(existing.is_none())
    }

    async fn has_condition_triggered(
        &self,
        condition_id: &ConditionId,
        threshold: Decimal,
    ) -> Result<bool> {
        let existing: Option<i32> = self
            .db
            .with_retry("trigger_condition_check", || {
                sqlx::query_scalar(
                    "SELECT 1 FROM first_triggers WHERE condition_id = $1 AND threshold = $2",
                )
                .bind(condition_id.as_str())
                .bind(threshold)
                .fetch_optional(self.db.pool())
            })
            .await?;
        Ok(existing.is_some())
    }

    async fn get(
        &self,
        token_id: &TokenId,
        condition_id: &ConditionId,
        threshold: Decimal,
    ) -> Result<Option<Trigger>> {
        let row: Option<TriggerRow> = self
            .db
            .with_retry("trigger_get", || {
                sqlx::query_as(
                    r"
                    SELECT token_id, condition_id, threshold, price, size, score,
                           outcome, outcome_index, triggered_at
                    FROM first_triggers
                    WHERE token_id = $1 AND condition_id = $2 AND threshold = $3
                    ",
                )
                .bind(token_id.as_str())
                .bind(condition_id.as_str())
                .bind(threshold)
                .fetch_optional(self.db.pool())
            })
            .await?;
        Ok(row.map(Trigger::from))
    }

    async fn recent(
        &self,
        since: DateTime<Utc>,
        threshold: Option<Decimal>,
    ) -> Result<Vec<Trigger>> {
        let rows: Vec<TriggerRow> = if let Some(threshold) = threshold {
            self.db
                .with_retry("trigger_recent", || {
                    sqlx::query_as(
                        r"
                        SELECT token_id, condition_id, threshold, price, size, score,
                               outcome, outcome_index, triggered_at
                        FROM first_triggers
                        WHERE triggered_at >= $1 AND threshold = $2
                        ORDER BY triggered_at DESC
                        ",
                    )
                    .bind(since)
                    .bind(threshold)
                    .fetch_all(self.db.pool())
                })
                .await?
        } else {
            self.db
                .with_retry("trigger_recent", || {
                    sqlx::query_as(
                        r"
                        SELECT token_id, condition_id, threshold, price, size, score,
                               outcome, outcome_index, triggered_at
                        FROM first_triggers
                        WHERE triggered_at >= $1
                        ORDER BY triggered_at DESC
                        ",
                    )
                    .bind(since)
                    .fetch_all(self.db.pool())
                })
                .await?
        };
        Ok(rows.into_iter().map(Trigger::from).collect())
    }
}
