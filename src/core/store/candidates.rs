//! Candidate repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::{CandidateStore, Database};
use crate::core::domain::{Candidate, CandidateStatus, ConditionId, OrderId, TokenId};
use crate::error::{Error, Result};

/// PostgreSQL-backed candidate store.
pub struct PgCandidateStore {
    db: Database,
}

impl PgCandidateStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(sqlx::FromRow)]
struct CandidateRow {
    token_id: String,
    condition_id: String,
    threshold: Decimal,
    trigger_price: Decimal,
    score: f64,
    status: String,
    reason: Option<String>,
    order_id: Option<String>,
    created_at: DateTime<Utc>,
    decided_at: Option<DateTime<Utc>>,
}

impl CandidateRow {
    fn into_candidate(self) -> Result<Candidate> {
        let status = CandidateStatus::parse(&self.status).ok_or_else(|| {
            Error::invalid("status", format!("unknown candidate status {:?}", self.status))
        })?;
        Ok(Candidate {
            token_id: TokenId::from(self.token_id),
            condition_id: ConditionId::from(self.condition_id),
            threshold: self.threshold,
            trigger_price: self.trigger_price,
            score: self.score,
            status,
            reason: self.reason,
            order_id: self.order_id.map(OrderId::from),
            created_at: self.created_at,
            decided_at: self.decided_at,
        })
    }
}

#[async_trait]
impl CandidateStore for PgCandidateStore {
    async fn upsert(&self, candidate: &Candidate) -> Result<()> {
        self.db
            .with_retry("candidate_upsert", || {
                sqlx::query(
                    r"
                    INSERT INTO candidates
                        (token_id, condition_id, threshold, trigger_price, score,
                         status, reason, order_id, created_at, decided_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                    ON CONFLICT (token_id, condition_id, threshold) DO UPDATE
                    SET trigger_price = EXCLUDED.trigger_price,
                        score = EXCLUDED.score,
                        status = EXCLUDED.status,
                        reason = EXCLUDED.reason,
                        order_id = EXCLUDED.order_id,
                        decided_at = EXCLUDED.decided_at
                    ",
                )
                .bind(candidate.token_id.as_str())
                .bind(candidate.condition_id.as_str())
                .bind(candidate.threshold)
                .bind(candidate.trigger_price)
                .bind(candidate.score)
                .bind(candidate.status.as_str())
                .bind(&candidate.reason)
                .bind(candidate.order_id.as_ref().map(OrderId::as_str))
                .bind(candidate.created_at)
                .bind(candidate.decided_at)
                .execute(self.db.pool())
            })
            .await?;
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<Candidate>> {
        let rows: Vec<CandidateRow> = self
            .db
            .with_retry("candidate_pending", || {
                sqlx::query_as(
                    r"
                    SELECT token_id, condition_id, threshold, trigger_price, score,
                           status, reason, order_id, created_at, decided_at
                    FROM candidates
                    WHERE status = 'pending'
                    ORDER BY created_at
                    ",
                )
                .fetch_all(self.db.pool())
            })
            .await?;
        rows.into_iter().map(CandidateRow::into_candidate).collect()
    }

    async fn set_status(
        &self,
        token_id: &TokenId,
        condition_id: &ConditionId,
        threshold: Decimal,
        status: CandidateStatus,
        order_id: Option<&OrderId>,
    ) -> Result<()> {
        self.db
            .with_retry("candidate_set_status", || {
                sqlx::query(
                    r"
                    UPDATE candidates
                    SET status = $4,
                        order_id = COALESCE($5, order_id),
                        decided_at = NOW()
                    WHERE token_id = $1 AND condition_id = $2 AND threshold = $3
                    ",
                )
                .bind(token_id.as_str())
                .bind(condition_id.as_str())
                .bind(threshold)
                .bind(status.as_str())
                .bind(order_id.map(OrderId::as_str))
                .execute(self.db.pool())
            })
            .await?;
        Ok(())
    }
}
