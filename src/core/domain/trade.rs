//! Executed trades as reported by the venue.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{ConditionId, TokenId};

/// Which side of the book an order or trade is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Wire representation used by the venue.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }

    /// Parse a venue-reported side string (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" | "YES" => Some(Self::Buy),
            "SELL" | "NO" => Some(Self::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An executed trade ingested from the venue.
///
/// Identity is the `(condition_id, trade_id)` pair; rows are immutable once
/// inserted and replays are idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub condition_id: ConditionId,
    pub trade_id: String,
    pub token_id: TokenId,
    /// Price in [0, 1].
    pub price: Decimal,
    pub size: Decimal,
    pub side: Side,
    /// Execution time, millisecond precision, UTC.
    pub timestamp: DateTime<Utc>,
}

impl Trade {
    /// Age of the trade relative to `now`, in seconds.
    #[must_use]
    pub fn age_seconds(&self, now: DateTime<Utc>) -> f64 {
        (now - self.timestamp).num_milliseconds() as f64 / 1000.0
    }
}
