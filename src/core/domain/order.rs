//! Orders and fills.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{ConditionId, OrderId, TokenId};
use super::trade::Side;

/// Lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Live,
    Partial,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// Terminal states never transition again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }

    /// Open states are rehydrated and reconciled on startup.
    #[must_use]
    pub const fn is_open(self) -> bool {
        !self.is_terminal()
    }

    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Live => "live",
            Self::Partial => "partial",
            Self::Filled => "filled",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        }
    }

    /// Parse a stored status. Unknown values map to `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "live" => Some(Self::Live),
            "partial" => Some(Self::Partial),
            "filled" => Some(Self::Filled),
            // The venue uses both spellings; storage only ever writes ours.
            "cancelled" | "canceled" => Some(Self::Cancelled),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Whether an order was simulated or sent to the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderMode {
    Paper,
    Live,
}

impl OrderMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Paper => "paper",
            Self::Live => "live",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "paper" => Some(Self::Paper),
            "live" => Some(Self::Live),
            _ => None,
        }
    }
}

/// A submitted order, mutated only by the order manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub token_id: TokenId,
    pub condition_id: ConditionId,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    /// Cumulative filled size as reported by the venue.
    pub filled_size: Decimal,
    pub avg_fill_price: Option<Decimal>,
    pub status: OrderStatus,
    pub mode: OrderMode,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Notional cost of the order at its limit price.
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.price * self.size
    }

    /// Unfilled remainder of the order.
    #[must_use]
    pub fn remaining_size(&self) -> Decimal {
        (self.size - self.filled_size).max(Decimal::ZERO)
    }

    /// Notional of the unfilled remainder at the limit price.
    #[must_use]
    pub fn remaining_notional(&self) -> Decimal {
        self.price * self.remaining_size()
    }
}

/// An incremental fill derived from reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub order_id: OrderId,
    pub token_id: TokenId,
    pub condition_id: ConditionId,
    pub side: Side,
    pub size: Decimal,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Fill {
    /// Dollar value of this fill.
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.price * self.size
    }
}
