//! Shared test rig: the full pipeline over in-memory stores and a
//! scripted venue.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;

use thresher::app::TradingPipeline;
use thresher::core::domain::{Fill, OrderMode};
use thresher::core::execution::{
    BalanceConfig, BalanceManager, ExitConfig, ExitManager, OrderConfig, OrderManager,
    PositionTracker,
};
use thresher::core::service::{
    EventProcessor, FilterConfig, TriggerTracker, WatchlistConfig, WatchlistService,
};
use thresher::core::strategy::{HighProbabilityConfig, HighProbabilityStrategy};
use thresher::testkit::store::InMemoryStores;
use thresher::testkit::venue::ScriptedVenue;

pub struct Rig {
    pub pipeline: TradingPipeline,
    pub stores: InMemoryStores,
    pub venue: Arc<ScriptedVenue>,
    pub order_manager: Arc<OrderManager>,
    pub position_tracker: Arc<PositionTracker>,
    pub balance: Arc<BalanceManager>,
    pub exit_manager: ExitManager,
    pub fills: mpsc::UnboundedReceiver<Fill>,
}

pub struct RigOptions {
    pub threshold: Decimal,
    pub max_buy_price: Decimal,
    pub approval_required: bool,
    pub venue_balance: Decimal,
}

impl Default for RigOptions {
    fn default() -> Self {
        Self {
            threshold: dec!(0.95),
            max_buy_price: dec!(0.95),
            approval_required: false,
            venue_balance: dec!(1000),
        }
    }
}

#[must_use]
pub fn rig(options: RigOptions) -> Rig {
    let stores = InMemoryStores::new();
    let venue = Arc::new(ScriptedVenue::new(options.venue_balance));

    let balance = Arc::new(BalanceManager::new(
        Some(venue.clone()),
        BalanceConfig::default(),
    ));
    let (fills_tx, fills_rx) = mpsc::unbounded_channel();
    let order_manager = Arc::new(OrderManager::new(
        venue.clone(),
        stores.orders(),
        balance.clone(),
        OrderConfig {
            max_price: options.max_buy_price,
            mode: OrderMode::Live,
        },
        fills_tx,
    ));
    let position_tracker = Arc::new(PositionTracker::new(stores.positions()));
    let watchlist = Arc::new(WatchlistService::new(
        stores.watchlist(),
        WatchlistConfig::default(),
    ));

    let pipeline = TradingPipeline::new(
        EventProcessor::new(options.threshold, FilterConfig::default()),
        TriggerTracker::new(stores.triggers(), stores.watermarks()),
        Box::new(HighProbabilityStrategy::new(HighProbabilityConfig::default())),
        watchlist,
        order_manager.clone(),
        position_tracker.clone(),
        stores.candidates(),
        stores.approvals(),
        stores.markets(),
        stores.universe(),
        stores.market_data(),
        stores.watermarks(),
        300.0,
        options.approval_required,
        dec!(20),
    );

    Rig {
        pipeline,
        stores,
        venue,
        order_manager,
        position_tracker,
        balance,
        exit_manager: ExitManager::new(ExitConfig::default()),
        fills: fills_rx,
    }
}
