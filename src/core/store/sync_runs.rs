//! Sync-run audit repository.

use async_trait::async_trait;

use super::{Database, SyncRunStore, SyncRunSummary};
use crate::error::Result;

/// PostgreSQL-backed sync-run store.
pub struct PgSyncRunStore {
    db: Database,
}

impl PgSyncRunStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SyncRunStore for PgSyncRunStore {
    async fn record_start(&self, job: &str, locked_by: &str) -> Result<i64> {
        let run_id: i64 = self
            .db
            .with_retry("sync_run_start", || {
                sqlx::query_scalar(
                    r"
                    INSERT INTO sync_runs (job_name, status, locked_by)
                    VALUES ($1, 'running', $2)
                    RETURNING id
                    ",
                )
                .bind(job)
                .bind(locked_by)
                .fetch_one(self.db.pool())
            })
            .await?;
        Ok(run_id)
    }

    async fn record_success(&self, run_id: i64, summary: &SyncRunSummary) -> Result<()> {
        self.db
            .with_retry("sync_run_success", || {
                sqlx::query(
                    r"
                    UPDATE sync_runs
                    SET status = 'success',
                        finished_at = NOW(),
                        duration_ms = (EXTRACT(EPOCH FROM (NOW() - started_at)) * 1000)::INT,
                        rows_fetched = $2,
                        rows_upserted = $3,
                        rows_failed = $4,
                        api_calls = $5
                    WHERE id = $1
                    ",
                )
                .bind(run_id)
                .bind(summary.rows_fetched)
                .bind(summary.rows_upserted)
                .bind(summary.rows_failed)
                .bind(summary.api_calls)
                .execute(self.db.pool())
            })
            .await?;
        Ok(())
    }

    async fn record_failure(&self, run_id: i64, error: &str) -> Result<()> {
        // Error messages are capped so a pathological cause cannot bloat the row.
        let message: String = error.chars().take(500).collect();
        self.db
            .with_retry("sync_run_failure", || {
                sqlx::query(
                    r"
                    UPDATE sync_runs
                    SET status = 'failed',
                        finished_at = NOW(),
                        duration_ms = (EXTRACT(EPOCH FROM (NOW() - started_at)) * 1000)::INT,
                        error_message = $2
                    WHERE id = $1
                    ",
                )
                .bind(run_id)
                .bind(&message)
                .execute(self.db.pool())
            })
            .await?;
        Ok(())
    }

    async fn record_skipped(&self, job: &str) -> Result<()> {
        self.db
            .with_retry("sync_run_skipped", || {
                sqlx::query(
                    r"
                    INSERT INTO sync_runs (job_name, status, lock_acquired, finished_at)
                    VALUES ($1, 'skipped', FALSE, NOW())
                    ",
                )
                .bind(job)
                .execute(self.db.pool())
            })
            .await?;
        Ok(())
    }
}
