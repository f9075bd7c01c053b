//! Async PostgreSQL connection management.
//!
//! Wraps a [`PgPool`] with bounded-backoff connection establishment, a small
//! capped retry loop for transient errors, and advisory-lock helpers. All
//! cross-replica exclusion in the system goes through the advisory locks
//! defined here.

use std::future::Future;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions, Postgres};
use sqlx::pool::PoolConnection;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// PostgreSQL connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL; overridden by `DATABASE_URL` when set.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,

    // Reconnection settings
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,
    #[serde(default = "default_reconnect_initial_delay_ms")]
    pub reconnect_initial_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    #[serde(default = "default_reconnect_multiplier")]
    pub reconnect_multiplier: f64,

    // Retry settings for transient errors
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

fn default_min_connections() -> u32 {
    2
}
fn default_max_connections() -> u32 {
    10
}
fn default_acquire_timeout_secs() -> u64 {
    30
}
fn default_reconnect_max_attempts() -> u32 {
    5
}
fn default_reconnect_initial_delay_ms() -> u64 {
    1_000
}
fn default_reconnect_max_delay_ms() -> u64 {
    60_000
}
fn default_reconnect_multiplier() -> f64 {
    2.0
}
fn default_retry_max_attempts() -> u32 {
    3
}
fn default_retry_initial_delay_ms() -> u64 {
    100
}
fn default_retry_max_delay_ms() -> u64 {
    2_000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            reconnect_max_attempts: default_reconnect_max_attempts(),
            reconnect_initial_delay_ms: default_reconnect_initial_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            reconnect_multiplier: default_reconnect_multiplier(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

/// Shared database handle.
///
/// Cheap to clone; the pool itself reconnects dropped connections, and
/// [`Database::with_retry`] papers over transient errors on individual
/// queries.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    config: DatabaseConfig,
}

impl Database {
    /// Connect with bounded exponential backoff.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Degraded`] after exhausting all attempts.
    pub async fn connect(config: DatabaseConfig) -> Result<Self> {
        let mut delay = Duration::from_millis(config.reconnect_initial_delay_ms);
        let max_delay = Duration::from_millis(config.reconnect_max_delay_ms);
        let mut last_error = None;

        for attempt in 1..=config.reconnect_max_attempts {
            match Self::try_connect(&config).await {
                Ok(pool) => {
                    info!(
                        min = config.min_connections,
                        max = config.max_connections,
                        "Database pool initialized"
                    );
                    return Ok(Self { pool, config });
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts = config.reconnect_max_attempts,
                        error = %e,
                        "Database connect attempt failed"
                    );
                    last_error = Some(e);
                    if attempt < config.reconnect_max_attempts {
                        sleep(delay).await;
                        let next =
                            delay.as_millis() as f64 * config.reconnect_multiplier;
                        delay = Duration::from_millis(next as u64).min(max_delay);
                    }
                }
            }
        }

        Err(Error::Degraded(format!(
            "database connect failed after {} attempts: {}",
            config.reconnect_max_attempts,
            last_error.map_or_else(|| "unknown".to_string(), |e| e.to_string())
        )))
    }

    async fn try_connect(config: &DatabaseConfig) -> sqlx::Result<PgPool> {
        let pool = PgPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;
        // Verify the connection actually works before declaring victory.
        sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&pool).await?;
        Ok(pool)
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply embedded migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// True if a trivial query currently succeeds.
    pub async fn health_check(&self) -> bool {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }

    /// Run `op`, retrying transient connection errors with capped backoff.
    ///
    /// Non-transient errors surface immediately. Exhausting the retries
    /// yields [`Error::Degraded`], which callers treat as degraded-not-fatal.
    pub async fn with_retry<T, F, Fut>(&self, op_name: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = sqlx::Result<T>>,
    {
        let mut delay = Duration::from_millis(self.config.retry_initial_delay_ms);
        let max_delay = Duration::from_millis(self.config.retry_max_delay_ms);
        let mut last_error = None;

        for attempt in 1..=self.config.retry_max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) => {
                    warn!(
                        op = op_name,
                        attempt,
                        error = %e,
                        "Transient database error, retrying"
                    );
                    last_error = Some(e);
                    if attempt < self.config.retry_max_attempts {
                        sleep(delay).await;
                        delay = (delay * 2).min(max_delay);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(Error::Degraded(format!(
            "{op_name} failed after {} attempts: {}",
            self.config.retry_max_attempts,
            last_error.map_or_else(|| "unknown".to_string(), |e| e.to_string())
        )))
    }

    /// Derive a stable advisory lock ID from a namespace and key.
    ///
    /// Stable across processes and releases so that replicas contend on the
    /// same lock.
    #[must_use]
    pub fn advisory_lock_id(namespace: &str, key: &str) -> i64 {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(namespace.as_bytes());
        hasher.update(b":");
        hasher.update(key.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        i64::from_be_bytes(bytes)
    }

    /// Try to acquire a session-level advisory lock without blocking.
    ///
    /// Returns `None` when another session holds the lock. The returned
    /// guard pins the underlying connection; call [`SessionLock::release`]
    /// when done.
    pub async fn try_session_lock(&self, lock_id: i64) -> Result<Option<SessionLock>> {
        let mut conn = self.pool.acquire().await?;
        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(lock_id)
            .fetch_one(&mut *conn)
            .await?;
        if acquired {
            Ok(Some(SessionLock {
                conn: Some(conn),
                lock_id,
            }))
        } else {
            Ok(None)
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("max_connections", &self.config.max_connections)
            .finish_non_exhaustive()
    }
}

/// Guard for a session-level advisory lock.
///
/// Holds its connection so the lock stays pinned to one session. Prefer
/// [`SessionLock::release`]; if the guard is dropped instead, the
/// connection is detached from the pool and closed, which also releases
/// the lock (returning it to the pool still locked would leak the lock to
/// an unrelated caller).
pub struct SessionLock {
    conn: Option<PoolConnection<Postgres>>,
    lock_id: i64,
}

impl SessionLock {
    /// Release the lock and return the connection to the pool.
    pub async fn release(mut self) -> Result<()> {
        if let Some(mut conn) = self.conn.take() {
            sqlx::query("SELECT pg_advisory_unlock($1)")
                .bind(self.lock_id)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            drop(conn.detach());
        }
    }
}

/// Connection-level failures worth retrying; everything else surfaces.
fn is_transient(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}
