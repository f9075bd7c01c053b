//! First-trigger records and the intermediate trigger extraction type.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{ConditionId, TokenId};

/// Trigger candidate extracted from a single ingest event.
///
/// Not yet deduplicated; the trigger tracker decides whether this becomes a
/// recorded [`Trigger`].
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerData {
    pub token_id: TokenId,
    pub condition_id: ConditionId,
    pub price: Decimal,
    pub size: Option<Decimal>,
    /// Age of the underlying trade at extraction time, in seconds.
    pub trade_age_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

/// Recorded first crossing of a threshold.
///
/// Primary key is `(token_id, condition_id, threshold)`; at most one row
/// exists per `(condition_id, threshold)` regardless of which token crossed
/// first. Immutable once inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub token_id: TokenId,
    pub condition_id: ConditionId,
    pub threshold: Decimal,
    pub price: Decimal,
    pub size: Option<Decimal>,
    pub score: Option<f64>,
    pub outcome: Option<String>,
    pub outcome_index: Option<i32>,
    pub triggered_at: DateTime<Utc>,
}

impl Trigger {
    /// Build a trigger row from extracted trigger data.
    #[must_use]
    pub fn from_data(data: &TriggerData, threshold: Decimal, score: Option<f64>) -> Self {
        Self {
            token_id: data.token_id.clone(),
            condition_id: data.condition_id.clone(),
            threshold,
            price: data.price,
            size: data.size,
            score,
            outcome: None,
            outcome_index: None,
            triggered_at: data.timestamp,
        }
    }
}
