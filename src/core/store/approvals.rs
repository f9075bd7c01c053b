//! Approval repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::{ApprovalStore, Database};
use crate::core::domain::{Approval, ApprovalStatus, TokenId};
use crate::error::{Error, Result};

/// PostgreSQL-backed approval store.
pub struct PgApprovalStore {
    db: Database,
}

impl PgApprovalStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(sqlx::FromRow)]
struct ApprovalRow {
    token_id: String,
    max_price: Decimal,
    status: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl ApprovalRow {
    fn into_approval(self) -> Result<Approval> {
        let status = ApprovalStatus::parse(&self.status).ok_or_else(|| {
            Error::invalid("status", format!("unknown approval status {:?}", self.status))
        })?;
        Ok(Approval {
            token_id: TokenId::from(self.token_id),
            max_price: self.max_price,
            status,
            created_at: self.created_at,
            expires_at: self.expires_at,
        })
    }
}

#[async_trait]
impl ApprovalStore for PgApprovalStore {
    async fn create(&self, approval: &Approval) -> Result<()> {
        self.db
            .with_retry("approval_create", || {
                sqlx::query(
                    r"
                    INSERT INTO approvals (token_id, max_price, status, created_at, expires_at)
                    VALUES ($1, $2, $3, $4, $5)
                    ",
                )
                .bind(approval.token_id.as_str())
                .bind(approval.max_price)
                .bind(approval.status.as_str())
                .bind(approval.created_at)
                .bind(approval.expires_at)
                .execute(self.db.pool())
            })
            .await?;
        Ok(())
    }

    async fn pending_for(&self, token_id: &TokenId) -> Result<Option<Approval>> {
        let row: Option<ApprovalRow> = self
            .db
            .with_retry("approval_pending", || {
                sqlx::query_as(
                    r"
                    SELECT token_id, max_price, status, created_at, expires_at
                    FROM approvals
                    WHERE token_id = $1 AND status = 'pending' AND expires_at > NOW()
                    ORDER BY created_at DESC
                    LIMIT 1
                    ",
                )
                .bind(token_id.as_str())
                .fetch_optional(self.db.pool())
            })
            .await?;
        row.map(ApprovalRow::into_approval).transpose()
    }

    async fn mark_executed(&self, token_id: &TokenId) -> Result<()> {
        self.db
            .with_retry("approval_executed", || {
                sqlx::query(
                    "UPDATE approvals SET status = 'executed' \
                     WHERE token_id = $1 AND status = 'pending'",
                )
                .bind(token_id.as_str())
                .execute(self.db.pool())
            })
            .await?;
        Ok(())
    }

    async fn expire_stale(&self) -> Result<u64> {
        let result = self
            .db
            .with_retry("approval_expire", || {
                sqlx::query(
                    "UPDATE approvals SET status = 'expired' \
                     WHERE status = 'pending' AND expires_at <= NOW()",
                )
                .execute(self.db.pool())
            })
            .await?;
        Ok(result.rows_affected())
    }
}
