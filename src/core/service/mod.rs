//! Cross-cutting services of the trading pipeline.

pub mod event_processor;
pub mod position_sync;
pub mod sync;
pub mod tier_manager;
pub mod trigger_tracker;
pub mod watchlist;

pub use event_processor::{EventProcessor, FilterConfig};
pub use position_sync::{HoldPolicy, PositionSyncReport, PositionSyncService};
pub use sync::{SyncService, SyncSettings, FULL_SYNC_LOCK_ID, PRICE_SYNC_LOCK_ID};
pub use tier_manager::{TierLimits, TierManager, TierStats, TierThresholds};
pub use trigger_tracker::TriggerTracker;
pub use watchlist::{WatchlistConfig, WatchlistService};
