//! Strategy evaluation context.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::id::{ConditionId, TokenId};

/// Everything a strategy sees when deciding on a trigger.
///
/// Built by the event processor from a trigger candidate plus market
/// metadata. Missing metadata yields safe defaults (empty strings, no
/// expiry) rather than failing the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyContext {
    pub token_id: TokenId,
    pub condition_id: ConditionId,
    pub trigger_price: Decimal,
    pub size: Option<Decimal>,
    pub trade_age_seconds: f64,
    pub question: String,
    pub outcome: String,
    pub outcome_index: Option<i32>,
    pub category: Option<String>,
    pub end_date: Option<DateTime<Utc>>,
    /// Hours until market close, when the end date is known.
    pub time_to_end_hours: Option<f64>,
}

impl StrategyContext {
    /// Trigger price as a probability in [0, 1], for score math.
    #[must_use]
    pub fn probability(&self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        self.trigger_price.to_f64().unwrap_or(0.0)
    }
}
