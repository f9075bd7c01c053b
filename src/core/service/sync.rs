//! Periodic market sync with cross-replica exclusion.
//!
//! Each run first takes a non-blocking session advisory lock; losing the
//! race records a `skipped` row and bails, guaranteeing a single active
//! syncer across replicas. Full syncs refresh the whole universe; price
//! syncs touch only the top markets by volume.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::core::domain::{MarketUniverse, PriceSnapshot};
use crate::core::exchange::polymarket::MarketCatalog;
use crate::core::store::{
    Database, MarketStore, SyncRunStore, SyncRunSummary, UniverseStore,
};
use crate::error::Result;

/// Advisory lock IDs, distinct per loop so the light price sync never
/// blocks behind a full sync.
pub const FULL_SYNC_LOCK_ID: i64 = 90_210_001;
pub const PRICE_SYNC_LOCK_ID: i64 = 90_210_002;

const FULL_SYNC_JOB: &str = "market_sync_full";
const PRICE_SYNC_JOB: &str = "market_sync_price";

/// Sync behavior knobs.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Markets touched by a price-only sync.
    pub price_top_n: i64,
    /// Score threshold below which `score_below_threshold_since` starts.
    pub low_score_threshold: f64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            price_top_n: 200,
            low_score_threshold: 20.0,
        }
    }
}

/// Background market/universe syncer.
pub struct SyncService {
    db: Database,
    catalog: Arc<dyn MarketCatalog>,
    universe: Arc<dyn UniverseStore>,
    markets: Arc<dyn MarketStore>,
    sync_runs: Arc<dyn SyncRunStore>,
    settings: SyncSettings,
    locked_by: String,
}

impl SyncService {
    #[must_use]
    pub fn new(
        db: Database,
        catalog: Arc<dyn MarketCatalog>,
        universe: Arc<dyn UniverseStore>,
        markets: Arc<dyn MarketStore>,
        sync_runs: Arc<dyn SyncRunStore>,
        settings: SyncSettings,
    ) -> Self {
        let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "local".to_string());
        let locked_by = format!("{hostname}:{}", std::process::id());
        Self {
            db,
            catalog,
            universe,
            markets,
            sync_runs,
            settings,
            locked_by,
        }
    }

    /// One full sync iteration, guarded by the full-sync advisory lock.
    pub async fn run_full_sync_once(&self) -> Result<()> {
        let Some(lock) = self.db.try_session_lock(FULL_SYNC_LOCK_ID).await? else {
            info!("Full sync skipped: another replica holds the lock");
            self.sync_runs.record_skipped(FULL_SYNC_JOB).await?;
            return Ok(());
        };

        let run_id = self
            .sync_runs
            .record_start(FULL_SYNC_JOB, &self.locked_by)
            .await?;

        let outcome = self.full_sync_inner().await;
        match &outcome {
            Ok(summary) => {
                info!(
                    fetched = summary.rows_fetched,
                    upserted = summary.rows_upserted,
                    "Full sync complete"
                );
                self.sync_runs.record_success(run_id, summary).await?;
            }
            Err(e) => {
                error!(error = %e, "Full sync failed");
                self.sync_runs.record_failure(run_id, &e.to_string()).await?;
            }
        }

        // The lock must go regardless of how the run went.
        lock.release().await?;
        outcome.map(|_| ())
    }

    async fn full_sync_inner(&self) -> Result<SyncRunSummary> {
        let fetched = self.catalog.fetch_all().await?;
        let mut summary = SyncRunSummary {
            rows_fetched: fetched.len() as i64,
            api_calls: 1,
            ..SyncRunSummary::default()
        };

        let now = Utc::now();
        let mut universe_rows = Vec::with_capacity(fetched.len());
        let mut snapshots = Vec::new();

        for item in &fetched {
            if let Err(e) = self.markets.upsert_market(&item.market).await {
                warn!(condition = %item.market.condition_id, error = %e, "Market upsert failed");
                summary.rows_failed += 1;
                continue;
            }
            if item.market.resolved {
                self.markets
                    .mark_resolved(
                        &item.market.condition_id,
                        item.market.resolution_outcome.as_deref(),
                    )
                    .await?;
            }

            let mut row = item.universe.clone();
            if let Some(price) = row.price {
                snapshots.push(PriceSnapshot {
                    condition_id: row.condition_id.clone(),
                    price,
                    captured_at: now,
                });
                self.fill_price_changes(&mut row, price).await;
            }
            universe_rows.push(row);
        }

        summary.rows_upserted = self.universe.upsert_many(&universe_rows).await? as i64;
        self.universe.insert_price_snapshots(&snapshots).await?;
        self.refresh_scores(&universe_rows).await?;
        Ok(summary)
    }

    /// One price-only iteration, guarded by its own advisory lock.
    pub async fn run_price_sync_once(&self) -> Result<()> {
        let Some(lock) = self.db.try_session_lock(PRICE_SYNC_LOCK_ID).await? else {
            info!("Price sync skipped: another replica holds the lock");
            self.sync_runs.record_skipped(PRICE_SYNC_JOB).await?;
            return Ok(());
        };

        let run_id = self
            .sync_runs
            .record_start(PRICE_SYNC_JOB, &self.locked_by)
            .await?;

        let outcome = self.price_sync_inner().await;
        match &outcome {
            Ok(summary) => self.sync_runs.record_success(run_id, summary).await?,
            Err(e) => {
                error!(error = %e, "Price sync failed");
                self.sync_runs.record_failure(run_id, &e.to_string()).await?;
            }
        }

        lock.release().await?;
        outcome.map(|_| ())
    }

    async fn price_sync_inner(&self) -> Result<SyncRunSummary> {
        let mut rows = self.universe.top_by_volume(self.settings.price_top_n).await?;
        let now = Utc::now();
        let mut snapshots = Vec::new();

        for row in &mut rows {
            if let Some(price) = row.price {
                snapshots.push(PriceSnapshot {
                    condition_id: row.condition_id.clone(),
                    price,
                    captured_at: now,
                });
                self.fill_price_changes(row, price).await;
            }
        }

        let upserted = self.universe.upsert_many(&rows).await?;
        self.universe.insert_price_snapshots(&snapshots).await?;
        self.refresh_scores(&rows).await?;

        Ok(SyncRunSummary {
            rows_fetched: rows.len() as i64,
            rows_upserted: upserted as i64,
            ..SyncRunSummary::default()
        })
    }

    /// Compute 1h/24h changes against stored snapshots.
    async fn fill_price_changes(&self, row: &mut MarketUniverse, price: f64) {
        if let Ok(Some(hour_ago)) = self
            .universe
            .snapshot_price_before(&row.condition_id, 3_600.0)
            .await
        {
            row.price_change_1h = price - hour_ago;
        }
        if let Ok(Some(day_ago)) = self
            .universe
            .snapshot_price_before(&row.condition_id, 86_400.0)
            .await
        {
            row.price_change_24h = price - day_ago;
        }
    }

    async fn refresh_scores(&self, rows: &[MarketUniverse]) -> Result<()> {
        use crate::core::domain::{compute_interestingness, MarketMetrics};
        let scores: Vec<_> = rows
            .iter()
            .map(|m| {
                (
                    m.condition_id.clone(),
                    compute_interestingness(&MarketMetrics::from(m)),
                )
            })
            .collect();
        self.universe
            .update_scores(&scores, self.settings.low_score_threshold)
            .await?;
        Ok(())
    }
}
