//! Watchlist entries for borderline-scoring triggers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{ConditionId, TokenId};

/// State of a watched token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchStatus {
    Watching,
    Promoted,
    Expired,
}

impl WatchStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Watching => "watching",
            Self::Promoted => "promoted",
            Self::Expired => "expired",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "watching" => Some(Self::Watching),
            "promoted" => Some(Self::Promoted),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// A token under periodic re-scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub token_id: TokenId,
    pub condition_id: ConditionId,
    pub question: String,
    pub trigger_price: Option<Decimal>,
    pub initial_score: f64,
    pub current_score: f64,
    /// Hours to market close at the time of the last update.
    pub time_to_end_hours: f64,
    pub status: WatchStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Emitted when a watched token crosses the execution threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Promotion {
    pub token_id: TokenId,
    pub condition_id: ConditionId,
    pub score: f64,
    pub trigger_price: Option<Decimal>,
    pub question: String,
}
