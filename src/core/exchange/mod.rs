//! Exchange adapters.
//!
//! [`Venue`] is the seam the execution layer talks through; the Polymarket
//! CLOB client implements it for live trading and [`paper::PaperVenue`]
//! simulates it.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::core::domain::{ConditionId, OrderId, Side, TokenId};
use crate::error::Result;

pub mod paper;
pub mod polymarket;

/// Order submission request.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub token_id: TokenId,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
}

/// Venue acknowledgment of a submitted order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    /// Venue-assigned order ID. An empty string means the submission did
    /// not actually go through and must be rolled back.
    pub order_id: String,
    pub status: Option<String>,
}

/// Venue-reported state of an order.
#[derive(Debug, Clone, PartialEq)]
pub struct VenueOrder {
    /// Raw venue status string (e.g. `LIVE`, `MATCHED`, `CANCELED`).
    pub status: String,
    /// Cumulative matched size. Reconciliation recomputes fill state from
    /// this, never from deltas, so out-of-order notifications are harmless.
    pub size_matched: Decimal,
    pub avg_fill_price: Option<Decimal>,
}

/// A position as reported by the venue.
#[derive(Debug, Clone, PartialEq)]
pub struct VenuePosition {
    pub token_id: TokenId,
    pub condition_id: Option<ConditionId>,
    pub size: Decimal,
    pub avg_price: Decimal,
    pub current_price: Option<Decimal>,
}

/// Order execution and account surface of the venue.
#[async_trait]
pub trait Venue: Send + Sync {
    /// Submit an order. An ack with an empty `order_id` is a failure.
    async fn submit_order(&self, order: &NewOrder) -> Result<OrderAck>;

    /// Cancel an order. "Already canceled" counts as success.
    async fn cancel_order(&self, order_id: &OrderId) -> Result<bool>;

    /// Poll current order state.
    async fn order_status(&self, order_id: &OrderId) -> Result<VenueOrder>;

    /// Current collateral balance in dollars.
    async fn balance(&self) -> Result<Decimal>;

    /// Positions held by the configured wallet.
    async fn positions(&self) -> Result<Vec<VenuePosition>>;
}
