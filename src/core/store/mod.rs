//! Durable storage: typed repositories over PostgreSQL.
//!
//! Each entity gets a narrow store trait; the `Pg*` types implement them
//! over the shared [`Database`] handle. In-memory equivalents for tests
//! live in the testkit.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::core::domain::{
    Approval, BookSnapshot, Candidate, CandidateStatus, ConditionId, ExitEvent, Market,
    MarketUniverse, Order, OrderId, Position, PositionId, PriceSnapshot, Tier, TierRequest,
    TokenId, TokenMeta, Trade, Trigger, WatchStatus, WatchlistEntry,
};
use crate::error::Result;

pub mod database;

mod approvals;
mod candidates;
mod market_data;
mod markets;
mod orders;
mod positions;
mod sync_runs;
mod trades;
mod triggers;
mod universe;
mod watchlist;
mod watermarks;

pub use approvals::PgApprovalStore;
pub use candidates::PgCandidateStore;
pub use database::{Database, DatabaseConfig, SessionLock};
pub use market_data::PgMarketDataStore;
pub use markets::PgMarketStore;
pub use orders::PgOrderStore;
pub use positions::PgPositionStore;
pub use sync_runs::PgSyncRunStore;
pub use trades::PgTradeStore;
pub use triggers::PgTriggerStore;
pub use universe::PgUniverseStore;
pub use watchlist::PgWatchlistStore;
pub use watermarks::PgWatermarkStore;

/// Well-known watermark stream names.
pub mod streams {
    /// Trade ingestion, keyed by condition ID.
    pub const TRADES: &str = "trades";
    /// Trigger processing, keyed by threshold.
    pub const TRIGGERS: &str = "triggers";
    /// Candidate processing, keyed by threshold.
    pub const CANDIDATES: &str = "candidates";
}

#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Insert trades, ignoring rows already present; returns the number of
    /// newly inserted rows. Replays are idempotent on
    /// `(condition_id, trade_id)`.
    async fn upsert_trades(&self, trades: &[Trade]) -> Result<u64>;

    async fn recent_by_condition(
        &self,
        condition_id: &ConditionId,
        limit: i64,
    ) -> Result<Vec<Trade>>;
}

#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Stored watermark for `(stream, key)`; 0 when absent.
    async fn get(&self, stream: &str, key: &str) -> Result<i64>;

    /// Persist `max(existing, value)` and return the stored value.
    /// Watermarks never move backward.
    async fn update(&self, stream: &str, key: &str, value: i64) -> Result<i64>;
}

#[async_trait]
pub trait TriggerStore: Send + Sync {
    /// Record a first trigger if and only if no row exists for this
    /// `(condition_id, threshold)` yet, across all token IDs.
    ///
    /// Runs in a transaction holding a transaction-scoped advisory lock
    /// derived from `(condition_id, threshold)`, so concurrent callers on
    /// the same key see exactly one winner. Returns whether this call
    /// inserted the row.
    async fn try_record_atomic(&self, trigger: &Trigger) -> Result<bool>;

    /// Read-only: has this exact `(token, condition, threshold)` triggered?
    ///
    /// Never use this to gate order submission; only
    /// [`TriggerStore::try_record_atomic`] may.
    async fn is_first_trigger(
        &self,
        token_id: &TokenId,
        condition_id: &ConditionId,
        threshold: Decimal,
    ) -> Result<bool>;

    /// Read-only: has ANY token of this condition triggered at this
    /// threshold?
    async fn has_condition_triggered(
        &self,
        condition_id: &ConditionId,
        threshold: Decimal,
    ) -> Result<bool>;

    async fn get(
        &self,
        token_id: &TokenId,
        condition_id: &ConditionId,
        threshold: Decimal,
    ) -> Result<Option<Trigger>>;

    async fn recent(
        &self,
        since: DateTime<Utc>,
        threshold: Option<Decimal>,
    ) -> Result<Vec<Trigger>>;
}

#[async_trait]
pub trait CandidateStore: Send + Sync {
    async fn upsert(&self, candidate: &Candidate) -> Result<()>;

    async fn pending(&self) -> Result<Vec<Candidate>>;

    async fn set_status(
        &self,
        token_id: &TokenId,
        condition_id: &ConditionId,
        threshold: Decimal,
        status: CandidateStatus,
        order_id: Option<&OrderId>,
    ) -> Result<()>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn upsert(&self, order: &Order) -> Result<()>;

    /// Rename an order row after the venue assigns its ID.
    async fn replace_id(&self, old: &OrderId, new: &OrderId) -> Result<()>;

    /// Remove a row (rollback of a PENDING row whose submission failed).
    async fn delete(&self, id: &OrderId) -> Result<()>;

    async fn get(&self, id: &OrderId) -> Result<Option<Order>>;

    /// All non-terminal orders, for startup rehydration.
    async fn open_orders(&self) -> Result<Vec<Order>>;

    /// List orders sorted by `sort_by`, which must be in the allow-list;
    /// anything else fails with an invalid-input error.
    async fn list(&self, sort_by: &str, limit: i64) -> Result<Vec<Order>>;
}

#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn upsert(&self, position: &Position) -> Result<()>;

    async fn get(&self, id: &PositionId) -> Result<Option<Position>>;

    async fn open_positions(&self) -> Result<Vec<Position>>;

    async fn record_exit(&self, event: &ExitEvent) -> Result<()>;

    async fn exits_for(&self, position_id: &PositionId) -> Result<Vec<ExitEvent>>;
}

#[async_trait]
pub trait WatchlistStore: Send + Sync {
    async fn upsert(&self, entry: &WatchlistEntry) -> Result<()>;

    async fn get(&self, token_id: &TokenId) -> Result<Option<WatchlistEntry>>;

    /// Entries still in `watching` status.
    async fn active(&self) -> Result<Vec<WatchlistEntry>>;

    async fn update_score(
        &self,
        token_id: &TokenId,
        score: f64,
        time_to_end_hours: Option<f64>,
    ) -> Result<()>;

    async fn set_status(&self, token_id: &TokenId, status: WatchStatus) -> Result<()>;

    async fn append_score_history(&self, token_id: &TokenId, score: f64) -> Result<()>;

    /// Expire entries whose market closes within `min_hours`; returns the
    /// number of entries expired.
    async fn expire_ending(&self, min_hours: f64) -> Result<u64>;
}

#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn create(&self, approval: &Approval) -> Result<()>;

    async fn pending_for(&self, token_id: &TokenId) -> Result<Option<Approval>>;

    async fn mark_executed(&self, token_id: &TokenId) -> Result<()>;

    /// Flip pending approvals past their expiry to `expired`.
    async fn expire_stale(&self) -> Result<u64>;
}

#[async_trait]
pub trait MarketStore: Send + Sync {
    async fn upsert_market(&self, market: &Market) -> Result<()>;

    async fn market(&self, condition_id: &ConditionId) -> Result<Option<Market>>;

    async fn token_meta(&self, token_id: &TokenId) -> Result<Option<TokenMeta>>;

    async fn mark_resolved(
        &self,
        condition_id: &ConditionId,
        outcome: Option<&str>,
    ) -> Result<()>;
}

/// Filter for universe queries.
#[derive(Debug, Clone, Default)]
pub struct UniverseQuery {
    pub tier: Option<Tier>,
    pub min_interestingness: Option<f64>,
    pub limit: Option<i64>,
}

#[async_trait]
pub trait UniverseStore: Send + Sync {
    async fn upsert_many(&self, rows: &[MarketUniverse]) -> Result<u64>;

    async fn by_tier(&self, tier: Tier) -> Result<Vec<MarketUniverse>>;

    async fn tier_counts(&self) -> Result<HashMap<i16, i64>>;

    async fn query(&self, query: &UniverseQuery) -> Result<Vec<MarketUniverse>>;

    /// Raise a market's tier. Returns false when the market is unknown or
    /// already at or above the target.
    async fn promote(&self, condition_id: &ConditionId, target: Tier, reason: &str)
        -> Result<bool>;

    /// Lower a market's tier, respecting `pinned_tier`. Returns false when
    /// nothing changed.
    async fn demote(&self, condition_id: &ConditionId, target: Tier) -> Result<bool>;

    /// Bulk score update. `low_score_threshold` maintains
    /// `score_below_threshold_since` for demotion decisions.
    async fn update_scores(
        &self,
        scores: &[(ConditionId, f64)],
        low_score_threshold: f64,
    ) -> Result<u64>;

    async fn record_strategy_signal(&self, condition_id: &ConditionId) -> Result<()>;

    async fn active_tier_requests(&self) -> Result<Vec<TierRequest>>;

    async fn create_tier_request(&self, request: &TierRequest) -> Result<()>;

    async fn cleanup_expired_requests(&self) -> Result<u64>;

    async fn insert_price_snapshots(&self, snapshots: &[PriceSnapshot]) -> Result<u64>;

    /// Latest snapshot price captured at least `seconds_ago` seconds ago.
    async fn snapshot_price_before(
        &self,
        condition_id: &ConditionId,
        seconds_ago: f64,
    ) -> Result<Option<f64>>;

    async fn top_by_volume(&self, limit: i64) -> Result<Vec<MarketUniverse>>;
}

#[async_trait]
pub trait MarketDataStore: Send + Sync {
    /// Persist a tier-3 order book snapshot.
    async fn record_book_snapshot(&self, snapshot: &BookSnapshot) -> Result<()>;

    /// Fold a price observation into the current one-minute candle.
    async fn upsert_candle(
        &self,
        token_id: &TokenId,
        price: Decimal,
        size: Option<Decimal>,
        at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Counters reported at the end of a successful sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncRunSummary {
    pub rows_fetched: i64,
    pub rows_upserted: i64,
    pub rows_failed: i64,
    pub api_calls: i64,
}

#[async_trait]
pub trait SyncRunStore: Send + Sync {
    /// Insert a `running` row; returns its ID.
    async fn record_start(&self, job: &str, locked_by: &str) -> Result<i64>;

    async fn record_success(&self, run_id: i64, summary: &SyncRunSummary) -> Result<()>;

    async fn record_failure(&self, run_id: i64, error: &str) -> Result<()>;

    /// Insert a `skipped` row for a run that lost the advisory lock race.
    async fn record_skipped(&self, job: &str) -> Result<()>;
}

/// Bundle of every store, as trait objects so tests can swap in fakes.
#[derive(Clone)]
pub struct Stores {
    pub trades: Arc<dyn TradeStore>,
    pub watermarks: Arc<dyn WatermarkStore>,
    pub triggers: Arc<dyn TriggerStore>,
    pub candidates: Arc<dyn CandidateStore>,
    pub orders: Arc<dyn OrderStore>,
    pub positions: Arc<dyn PositionStore>,
    pub watchlist: Arc<dyn WatchlistStore>,
    pub approvals: Arc<dyn ApprovalStore>,
    pub markets: Arc<dyn MarketStore>,
    pub universe: Arc<dyn UniverseStore>,
    pub market_data: Arc<dyn MarketDataStore>,
    pub sync_runs: Arc<dyn SyncRunStore>,
}

impl Stores {
    /// Wire every store to PostgreSQL.
    #[must_use]
    pub fn postgres(db: &Database) -> Self {
        Self {
            trades: Arc::new(PgTradeStore::new(db.clone())),
            watermarks: Arc::new(PgWatermarkStore::new(db.clone())),
            triggers: Arc::new(PgTriggerStore::new(db.clone())),
            candidates: Arc::new(PgCandidateStore::new(db.clone())),
            orders: Arc::new(PgOrderStore::new(db.clone())),
            positions: Arc::new(PgPositionStore::new(db.clone())),
            watchlist: Arc::new(PgWatchlistStore::new(db.clone())),
            approvals: Arc::new(PgApprovalStore::new(db.clone())),
            markets: Arc::new(PgMarketStore::new(db.clone())),
            universe: Arc::new(PgUniverseStore::new(db.clone())),
            market_data: Arc::new(PgMarketDataStore::new(db.clone())),
            sync_runs: Arc::new(PgSyncRunStore::new(db.clone())),
        }
    }
}
