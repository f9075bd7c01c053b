//! Execution layer: capital, orders, positions, exits.

pub mod balance;
pub mod exit_manager;
pub mod order_manager;
pub mod position_tracker;

pub use balance::{BalanceConfig, BalanceManager, Reservation};
pub use exit_manager::{ExitConfig, ExitManager, MarketState};
pub use order_manager::{OrderConfig, OrderManager};
pub use position_tracker::PositionTracker;
