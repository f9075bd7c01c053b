//! Markets, outcome tokens, and the tiered market universe.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{ConditionId, TokenId};

/// One tradeable side of a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeToken {
    pub token_id: TokenId,
    pub outcome: String,
    pub outcome_index: i32,
    pub price: Option<Decimal>,
}

/// A market (condition) with its outcome tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub condition_id: ConditionId,
    pub question: String,
    pub category: Option<String>,
    pub end_date: Option<DateTime<Utc>>,
    pub resolved: bool,
    pub resolution_outcome: Option<String>,
    pub tokens: Vec<OutcomeToken>,
    pub volume_24h: Option<f64>,
    pub liquidity: Option<f64>,
}

impl Market {
    /// All token IDs of this market.
    #[must_use]
    pub fn token_ids(&self) -> Vec<TokenId> {
        self.tokens.iter().map(|t| t.token_id.clone()).collect()
    }

    /// Hours until the market closes, if the end date is known.
    #[must_use]
    pub fn time_to_end_hours(&self, now: DateTime<Utc>) -> Option<f64> {
        self.end_date
            .map(|end| (end - now).num_minutes() as f64 / 60.0)
    }

    /// Outcome prices of a condition should sum to ~1. Returns `None` when
    /// any token is missing a price.
    #[must_use]
    pub fn prices_sum_to_one(&self, tolerance: Decimal) -> Option<bool> {
        let mut sum = Decimal::ZERO;
        for token in &self.tokens {
            sum += token.price?;
        }
        Some((sum - Decimal::ONE).abs() <= tolerance)
    }
}

/// Metadata for one outcome token, denormalized for fast context building.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenMeta {
    pub token_id: TokenId,
    pub condition_id: ConditionId,
    pub question: String,
    pub outcome: String,
    pub outcome_index: i32,
    pub category: Option<String>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Data-retention depth for a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Metadata only.
    One,
    /// Price candles retained.
    Two,
    /// Full order book captured.
    Three,
}

impl Tier {
    #[must_use]
    pub const fn as_i16(self) -> i16 {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
        }
    }

    #[must_use]
    pub const fn from_i16(v: i16) -> Option<Self> {
        match v {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            3 => Some(Self::Three),
            _ => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_i16())
    }
}

/// Per-market scoring and tier state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketUniverse {
    pub condition_id: ConditionId,
    pub question: String,
    pub category: Option<String>,
    pub tier: Tier,
    pub interestingness_score: f64,
    /// Manual override: the market cannot be demoted below this tier.
    pub pinned_tier: Option<Tier>,
    pub last_strategy_signal_at: Option<DateTime<Utc>>,
    pub score_below_threshold_since: Option<DateTime<Utc>>,
    pub price: Option<f64>,
    pub volume_24h: f64,
    pub liquidity: f64,
    pub trade_count_24h: i64,
    pub price_change_24h: f64,
    pub price_change_1h: f64,
    pub spread: Option<f64>,
    pub days_to_end: Option<f64>,
    pub market_age_days: Option<f64>,
    pub outcome_count: i32,
    pub updated_at: DateTime<Utc>,
}

/// A strategy's request to promote a market to a target tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierRequest {
    pub strategy_name: String,
    pub condition_id: ConditionId,
    pub requested_tier: Tier,
    pub reason: String,
    pub requested_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Point-in-time price capture used for 1h/24h change aggregates.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSnapshot {
    pub condition_id: ConditionId,
    pub price: f64,
    pub captured_at: DateTime<Utc>,
}
