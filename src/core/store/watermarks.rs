//! Watermark repository.
//!
//! One row per `(stream, key)`. Monotonicity is enforced in SQL with
//! `GREATEST`, so racing writers can never move a watermark backward.

use async_trait::async_trait;

use super::{Database, WatermarkStore};
use crate::error::Result;

/// PostgreSQL-backed watermark store.
pub struct PgWatermarkStore {
    db: Database,
}

impl PgWatermarkStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl WatermarkStore for PgWatermarkStore {
    async fn get(&self, stream: &str, key: &str) -> Result<i64> {
        let value: Option<i64> = self
            .db
            .with_retry("watermark_get", || {
                sqlx::query_scalar(
                    "SELECT last_value FROM watermarks WHERE stream_name = $1 AND stream_key = $2",
                )
                .bind(stream)
                .bind(key)
                .fetch_optional(self.db.pool())
            })
            .await?;
        Ok(value.unwrap_or(0))
    }

    async fn update(&self, stream: &str, key: &str, value: i64) -> Result<i64> {
        let stored: i64 = self
            .db
            .with_retry("watermark_update", || {
                sqlx::query_scalar(
                    r"
                    INSERT INTO watermarks (stream_name, stream_key, last_value, updated_at)
                    VALUES ($1, $2, $3, NOW())
                    ON CONFLICT (stream_name, stream_key) DO UPDATE
                    SET last_value = GREATEST(watermarks.last_value, EXCLUDED.last_value),
                        updated_at = NOW()
                    RETURNING last_value
                    ",
                )
                .bind(stream)
                .bind(key)
                .bind(value)
                .fetch_one(self.db.pool())
            })
            .await?;
        Ok(stored)
    }
}
