//! Thresher - an always-on threshold-trigger trading bot for prediction
//! market CLOBs.
//!
//! # Architecture
//!
//! ```text
//! src/
//! ├── core/             # Reusable library components
//! │   ├── domain/       # Pure domain types
//! │   ├── exchange/     # Venue clients (REST, CLOB, WebSocket)
//! │   ├── store/        # PostgreSQL repositories
//! │   ├── service/      # Event processing, triggers, watchlist, tiers, sync
//! │   ├── execution/    # Balance, orders, positions, exits
//! │   └── strategy/     # Strategy plugin contract
//! └── app/              # Configuration and orchestration
//! ```

pub mod app;
pub mod cli;
pub mod core;
pub mod error;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
