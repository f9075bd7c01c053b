//! Application supervisor.
//!
//! Builds every manager from configuration, owns the background tasks, and
//! coordinates graceful shutdown: a watch flag stops the loops, then the
//! supervisor waits a bounded time for them to drain before force-closing
//! the pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::config::{Config, TradeMode};
use super::pipeline::TradingPipeline;
use crate::core::domain::{Fill, IngestEvent, OrderMode, Tier, TokenId};
use crate::core::exchange::paper::PaperVenue;
use crate::core::exchange::polymarket::{
    ClobClient, ClobCredentials, DataClient, MarketStream, StreamConfig, UniverseFetcher,
};
use crate::core::exchange::Venue;
use crate::core::execution::{
    BalanceConfig, BalanceManager, ExitConfig, ExitManager, MarketState, OrderConfig,
    OrderManager, PositionTracker,
};
use crate::core::service::{
    EventProcessor, FilterConfig, HoldPolicy, PositionSyncService, SyncService, SyncSettings,
    TierLimits, TierManager, TierThresholds, TriggerTracker, WatchlistConfig, WatchlistService,
};
use crate::core::store::{
    streams, ApprovalStore, Database, MarketStore, Stores, TradeStore, UniverseStore,
    WatermarkStore,
};
use crate::core::strategy::{HighProbabilityConfig, HighProbabilityStrategy};
use crate::error::Result;

/// How long shutdown waits for in-flight iterations before giving up.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Owns every component and background task.
pub struct Orchestrator {
    config: Config,
    db: Database,
    stores: Stores,
    pipeline: Arc<TradingPipeline>,
    order_manager: Arc<OrderManager>,
    position_tracker: Arc<PositionTracker>,
    balance: Arc<BalanceManager>,
    watchlist: Arc<WatchlistService>,
    tier_manager: Arc<TierManager>,
    sync_service: Arc<SyncService>,
    position_sync: Arc<PositionSyncService>,
    exit_manager: Arc<ExitManager>,
    data_client: Arc<DataClient>,
    events_tx: broadcast::Sender<IngestEvent>,
    subscriptions_tx: watch::Sender<Vec<TokenId>>,
    fills_rx: Option<mpsc::UnboundedReceiver<Fill>>,
    dropped_events: Arc<AtomicU64>,
}

impl Orchestrator {
    /// Build the full component graph. Fatal configuration problems (bad
    /// database, missing credentials in live mode) surface here.
    pub async fn build(config: Config) -> Result<Self> {
        config.validate()?;

        let db = Database::connect(config.database.clone()).await?;
        db.migrate().await?;
        let stores = Stores::postgres(&db);

        let timeout = Duration::from_secs(config.venue.request_timeout_secs);
        let venue: Arc<dyn Venue> = match config.venue.mode {
            TradeMode::Live => {
                let creds = ClobCredentials::load(&config.venue.credentials_file)?;
                Arc::new(ClobClient::new(
                    config.venue.clob_url.clone(),
                    config.venue.data_url.clone(),
                    creds,
                    timeout,
                )?)
            }
            TradeMode::Paper => Arc::new(PaperVenue::new(config.venue.paper_balance)),
        };

        let balance = Arc::new(BalanceManager::new(
            Some(venue.clone()),
            BalanceConfig {
                min_reserve: config.trading.min_reserve,
                staleness: Duration::from_secs(config.trading.balance_staleness_secs),
            },
        ));

        let (fills_tx, fills_rx) = mpsc::unbounded_channel();
        let order_manager = Arc::new(OrderManager::new(
            venue.clone(),
            stores.orders.clone(),
            balance.clone(),
            OrderConfig {
                max_price: config.trading.max_buy_price,
                mode: match config.venue.mode {
                    TradeMode::Paper => OrderMode::Paper,
                    TradeMode::Live => OrderMode::Live,
                },
            },
            fills_tx,
        ));

        let position_tracker = Arc::new(PositionTracker::new(stores.positions.clone()));
        let position_sync = Arc::new(PositionSyncService::new(
            venue.clone(),
            position_tracker.clone(),
        ));

        let watchlist = Arc::new(WatchlistService::new(
            stores.watchlist.clone(),
            WatchlistConfig {
                execution_threshold: config.watchlist.execution_threshold,
                min_score: config.watchlist.min_score,
            },
        ));

        let tier_manager = Arc::new(TierManager::new(
            stores.universe.clone(),
            stores.positions.clone(),
            stores.orders.clone(),
            TierLimits {
                tier_2_max: config.tiers.tier_2_max,
                tier_3_max: config.tiers.tier_3_max,
            },
            TierThresholds {
                promote_to_tier_2_score: config.tiers.promote_to_tier_2_score,
                promote_to_tier_3_score: config.tiers.promote_to_tier_3_score,
                demote_from_tier_3_score: config.tiers.demote_from_tier_3_score,
                demote_from_tier_2_score: config.tiers.demote_from_tier_2_score,
                tier_3_inactivity_hours: config.tiers.tier_3_inactivity_hours,
                tier_2_low_score_days: config.tiers.tier_2_low_score_days,
            },
        ));

        let fetcher = UniverseFetcher::new(
            config.venue.gamma_url.clone(),
            timeout,
            500,
            Duration::from_millis(config.sync.universe_page_delay_ms),
        )?;
        let sync_service = Arc::new(SyncService::new(
            db.clone(),
            Arc::new(fetcher),
            stores.universe.clone(),
            stores.markets.clone(),
            stores.sync_runs.clone(),
            SyncSettings {
                price_top_n: config.sync.price_top_n,
                low_score_threshold: config.tiers.demote_from_tier_2_score,
            },
        ));

        let exit_manager = Arc::new(ExitManager::new(ExitConfig {
            profit_target: config.exits.profit_target,
            stop_loss: config.exits.stop_loss,
            time_exit_hours: config.exits.time_exit_hours,
        }));

        let data_client = Arc::new(DataClient::new(
            config.venue.clob_url.clone(),
            config.venue.data_url.clone(),
            timeout,
            Duration::from_secs(config.venue.max_trade_age_seconds),
        )?);

        let processor = EventProcessor::new(
            config.trading.threshold,
            FilterConfig {
                min_time_to_end_hours: config.trading.min_time_to_end_hours,
            },
        );
        let trigger_tracker =
            TriggerTracker::new(stores.triggers.clone(), stores.watermarks.clone());
        let strategy = Box::new(HighProbabilityStrategy::new(HighProbabilityConfig {
            execution_score: config.watchlist.execution_threshold,
            watch_score: config.watchlist.min_score,
            stake: config.trading.stake,
        }));

        let pipeline = Arc::new(TradingPipeline::new(
            processor,
            trigger_tracker,
            strategy,
            watchlist.clone(),
            order_manager.clone(),
            position_tracker.clone(),
            stores.candidates.clone(),
            stores.approvals.clone(),
            stores.markets.clone(),
            stores.universe.clone(),
            stores.market_data.clone(),
            stores.watermarks.clone(),
            config.venue.max_trade_age_seconds as f64,
            config.trading.approval_required,
            config.trading.stake,
        ));

        let (events_tx, _) = broadcast::channel(config.stream.event_queue_capacity);
        let (subscriptions_tx, _) = watch::channel(Vec::new());

        Ok(Self {
            config,
            db,
            stores,
            pipeline,
            order_manager,
            position_tracker,
            balance,
            watchlist,
            tier_manager,
            sync_service,
            position_sync,
            exit_manager,
            data_client,
            events_tx,
            subscriptions_tx,
            fills_rx: Some(fills_rx),
            dropped_events: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Run until a shutdown signal arrives.
    pub async fn run(mut self) -> Result<()> {
        // Rehydrate state before any flow starts: storage wins.
        let orders = self.order_manager.load_orders().await?;
        let positions = self.position_tracker.load_positions().await?;
        info!(orders, positions, "State rehydrated");

        if let Err(e) = self
            .position_sync
            .sync_positions(false, HoldPolicy::New)
            .await
        {
            warn!(error = %e, "Initial position sync failed; continuing degraded");
        }

        self.refresh_subscriptions().await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

        tasks.push(("stream", self.spawn_stream(shutdown_rx.clone())));
        tasks.push(("events", self.spawn_event_loop(shutdown_rx.clone())));
        tasks.push(("fills", self.spawn_fill_loop(shutdown_rx.clone())));
        tasks.push(("reconcile", self.spawn_reconcile_loop(shutdown_rx.clone())));
        tasks.push(("trades", self.spawn_trade_ingest_loop(shutdown_rx.clone())));
        tasks.push(("watchlist", self.spawn_watchlist_loop(shutdown_rx.clone())));
        tasks.push(("tiers", self.spawn_tier_loop(shutdown_rx.clone())));
        tasks.push(("full-sync", self.spawn_full_sync_loop(shutdown_rx.clone())));
        tasks.push(("price-sync", self.spawn_price_sync_loop(shutdown_rx.clone())));
        tasks.push((
            "position-sync",
            self.spawn_position_sync_loop(shutdown_rx.clone()),
        ));
        tasks.push(("exits", self.spawn_exit_loop(shutdown_rx.clone())));
        tasks.push((
            "maintenance",
            self.spawn_maintenance_loop(shutdown_rx.clone()),
        ));

        info!(tasks = tasks.len(), "All background tasks running");

        wait_for_shutdown_signal().await;
        info!("Shutdown signal received, draining tasks");
        let _ = shutdown_tx.send(true);

        let drain = async {
            for (name, handle) in tasks {
                if let Err(e) = handle.await {
                    error!(task = name, error = %e, "Task panicked");
                }
            }
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            warn!("Shutdown grace period elapsed; force-closing resources");
        }

        self.db.close().await;
        info!(
            dropped_events = self.dropped_events.load(Ordering::Relaxed),
            "Shutdown complete"
        );
        Ok(())
    }

    /// Point the stream at the current tier-3 token set.
    async fn refresh_subscriptions(&self) {
        let tier_3 = match self.stores.universe.by_tier(Tier::Three).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Could not load tier-3 markets for subscription");
                return;
            }
        };
        let mut tokens = Vec::new();
        for market in tier_3 {
            match self.stores.markets.market(&market.condition_id).await {
                Ok(Some(market)) => tokens.extend(market.token_ids()),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Token lookup failed"),
            }
        }
        info!(tokens = tokens.len(), "Subscription set refreshed");
        // send_replace stores the set even before the stream task subscribes.
        self.subscriptions_tx.send_replace(tokens);
    }

    fn spawn_stream(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let stream = MarketStream::new(
            StreamConfig {
                url: self.config.venue.ws_url.clone(),
                heartbeat_timeout: Duration::from_secs(self.config.stream.heartbeat_timeout_secs),
                initial_reconnect_delay: Duration::from_millis(
                    self.config.stream.initial_reconnect_delay_ms,
                ),
                max_reconnect_delay: Duration::from_secs(
                    self.config.stream.max_reconnect_delay_secs,
                ),
            },
            self.subscriptions_tx.subscribe(),
            self.events_tx.clone(),
        );
        tokio::spawn(stream.run(shutdown))
    }

    fn spawn_event_loop(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let mut events = self.events_tx.subscribe();
        let pipeline = self.pipeline.clone();
        let dropped = self.dropped_events.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    event = events.recv() => match event {
                        Ok(event) => {
                            if let Err(e) = pipeline.handle_event(&event).await {
                                warn!(error = %e, "Event processing failed");
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            // Events are advisory; storage holds the truth.
                            dropped.fetch_add(n, Ordering::Relaxed);
                            warn!(dropped = n, "Event queue overflow, oldest events dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        })
    }

    fn spawn_fill_loop(&mut self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let mut fills = self
            .fills_rx
            .take()
            .expect("fill loop spawned exactly once");
        let tracker = self.position_tracker.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    fill = fills.recv() => match fill {
                        Some(fill) => {
                            if let Err(e) = tracker.record_fill(&fill).await {
                                warn!(error = %e, "Fill application failed");
                            }
                        }
                        None => break,
                    }
                }
            }
        })
    }

    fn spawn_reconcile_loop(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let manager = self.order_manager.clone();
        let interval = Duration::from_secs(self.config.trading.reconcile_interval_secs);
        spawn_interval_loop("reconcile", interval, shutdown, move || {
            let manager = manager.clone();
            async move {
                manager.sync_open_orders().await.map(|_| ())
            }
        })
    }

    fn spawn_trade_ingest_loop(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let client = self.data_client.clone();
        let trades = self.stores.trades.clone();
        let watermarks = self.stores.watermarks.clone();
        let interval = Duration::from_secs(self.config.sync.trade_poll_interval_secs);
        spawn_interval_loop("trades", interval, shutdown, move || {
            let client = client.clone();
            let trades = trades.clone();
            let watermarks = watermarks.clone();
            async move {
                let fetched = client.recent_trades(None, 500).await?;
                if fetched.is_empty() {
                    return Ok(());
                }
                let inserted = trades.upsert_trades(&fetched).await?;
                // Advance per-condition trade watermarks to the newest
                // timestamp seen; GREATEST in storage keeps them monotone.
                let mut latest: std::collections::HashMap<String, i64> =
                    std::collections::HashMap::new();
                for trade in &fetched {
                    let entry = latest
                        .entry(trade.condition_id.as_str().to_string())
                        .or_insert(0);
                    *entry = (*entry).max(trade.timestamp.timestamp_millis());
                }
                for (condition, timestamp) in latest {
                    watermarks.update(streams::TRADES, &condition, timestamp).await?;
                }
                if inserted > 0 {
                    info!(fetched = fetched.len(), inserted, "Trades ingested");
                }
                Ok(())
            }
        })
    }

    fn spawn_watchlist_loop(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let watchlist = self.watchlist.clone();
        let pipeline = self.pipeline.clone();
        let min_hours = self.config.watchlist.min_hours_to_end;
        let interval = Duration::from_secs(self.config.watchlist.rescore_interval_secs);
        spawn_interval_loop("watchlist", interval, shutdown, move || {
            let watchlist = watchlist.clone();
            let pipeline = pipeline.clone();
            async move {
                let promotions = watchlist.rescore_all(Utc::now()).await?;
                for promotion in promotions {
                    if let Err(e) = pipeline.execute_promotion(&promotion).await {
                        warn!(token = %promotion.token_id, error = %e, "Promotion failed");
                    }
                }
                watchlist.remove_expired(min_hours).await?;
                Ok(())
            }
        })
    }

    fn spawn_tier_loop(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let tier_manager = self.tier_manager.clone();
        let universe = self.stores.universe.clone();
        let markets = self.stores.markets.clone();
        let subscriptions = self.subscriptions_tx.clone();
        let interval = Duration::from_secs(self.config.tiers.cycle_interval_secs);
        spawn_interval_loop("tiers", interval, shutdown, move || {
            let tier_manager = tier_manager.clone();
            let universe = universe.clone();
            let markets = markets.clone();
            let subscriptions = subscriptions.clone();
            async move {
                // Refresh interestingness for tracked markets, then cycle.
                let mut tracked = universe.by_tier(Tier::Two).await?;
                tracked.extend(universe.by_tier(Tier::Three).await?);
                tier_manager.update_scores_for_markets(&tracked).await?;
                tier_manager.run_promotion_cycle().await?;
                // Re-point the stream at the new tier-3 set.
                let tier_3 = universe.by_tier(Tier::Three).await?;
                let mut tokens = Vec::new();
                for row in tier_3 {
                    if let Some(market) = markets.market(&row.condition_id).await? {
                        tokens.extend(market.token_ids());
                    }
                }
                subscriptions.send_replace(tokens);
                Ok(())
            }
        })
    }

    fn spawn_full_sync_loop(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let sync = self.sync_service.clone();
        let interval = Duration::from_secs(self.config.sync.full_interval_secs);
        spawn_interval_loop("full-sync", interval, shutdown, move || {
            let sync = sync.clone();
            async move { sync.run_full_sync_once().await }
        })
    }

    fn spawn_price_sync_loop(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let sync = self.sync_service.clone();
        let interval = Duration::from_secs(self.config.sync.price_interval_secs);
        spawn_interval_loop("price-sync", interval, shutdown, move || {
            let sync = sync.clone();
            async move { sync.run_price_sync_once().await }
        })
    }

    fn spawn_position_sync_loop(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let position_sync = self.position_sync.clone();
        let interval = Duration::from_secs(self.config.sync.position_sync_interval_secs);
        spawn_interval_loop("position-sync", interval, shutdown, move || {
            let position_sync = position_sync.clone();
            async move {
                position_sync
                    .sync_positions(false, HoldPolicy::New)
                    .await
                    .map(|_| ())
            }
        })
    }

    fn spawn_exit_loop(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let tracker = self.position_tracker.clone();
        let exit_manager = self.exit_manager.clone();
        let pipeline = self.pipeline.clone();
        let markets = self.stores.markets.clone();
        let interval = Duration::from_secs(self.config.exits.evaluation_interval_secs);
        spawn_interval_loop("exits", interval, shutdown, move || {
            let tracker = tracker.clone();
            let exit_manager = exit_manager.clone();
            let pipeline = pipeline.clone();
            let markets = markets.clone();
            async move {
                let now = Utc::now();
                for position in tracker.open_positions() {
                    let market = markets.market(&position.condition_id).await?;
                    let state = MarketState {
                        current_price: position.current_price,
                        time_to_end_hours: market
                            .as_ref()
                            .and_then(|m| m.time_to_end_hours(now)),
                        resolved: market.as_ref().is_some_and(|m| m.resolved),
                        resolution_value: None,
                    };
                    if let Some(signal) = exit_manager.evaluate(&position, &state, now) {
                        pipeline.execute_exit(&signal).await?;
                    }
                }
                Ok(())
            }
        })
    }

    fn spawn_maintenance_loop(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let balance = self.balance.clone();
        let approvals = self.stores.approvals.clone();
        let max_age = Duration::from_secs(self.config.trading.reservation_max_age_secs);
        spawn_interval_loop(
            "maintenance",
            Duration::from_secs(300),
            shutdown,
            move || {
                let balance = balance.clone();
                let approvals = approvals.clone();
                async move {
                    balance.clear_stale_reservations(max_age);
                    approvals.expire_stale().await?;
                    Ok(())
                }
            },
        )
    }
}

/// Spawn a loop that runs `work` every `interval`, logging failures and
/// continuing, and stopping promptly on shutdown.
fn spawn_interval_loop<F, Fut>(
    name: &'static str,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    work: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                () = tokio::time::sleep(interval) => {
                    if let Err(e) = work().await {
                        // Degraded, not fatal: log and keep looping.
                        warn!(task = name, error = %e, "Background iteration failed");
                    }
                }
            }
        }
        info!(task = name, "Background task stopped");
    })
}

/// Wait for SIGINT or SIGTERM.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!(error = %e, "Cannot install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
