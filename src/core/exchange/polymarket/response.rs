//! Polymarket REST response types and wire-format helpers.
//!
//! The venue mixes snake_case and camelCase keys across endpoints, returns
//! numbers as strings, and nests arrays as JSON-encoded strings. Everything
//! here exists to absorb those quirks before data reaches the domain.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;

/// Decode a JSON-string array like `"[\"Yes\", \"No\"]"` into its elements.
///
/// Returns an empty vector when the payload is absent or malformed; callers
/// treat that as "no data", not an error.
#[must_use]
pub fn decode_string_array(raw: &str) -> Vec<String> {
    serde_json::from_str::<Vec<Value>>(raw)
        .map(|values| {
            values
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Extract an `f64` from a JSON value that may be a number or a string.
#[must_use]
pub fn f64_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !s.is_empty() => s.parse().ok(),
        _ => None,
    }
}

/// Extract a [`Decimal`] from a JSON value that may be a number or a string.
#[must_use]
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) if !s.is_empty() => Decimal::from_str(s).ok(),
        _ => None,
    }
}

/// Normalize a venue timestamp to UTC.
///
/// Accepts epoch seconds, epoch milliseconds (numeric or string), and
/// RFC 3339 strings. Anything unparseable is `None`; missing timestamps
/// must never default to "now".
#[must_use]
pub fn timestamp_from_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_f64().and_then(epoch_to_utc),
        Value::String(s) if !s.is_empty() => {
            if let Ok(epoch) = s.parse::<f64>() {
                epoch_to_utc(epoch)
            } else {
                DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            }
        }
        _ => None,
    }
}

/// Epoch seconds or milliseconds to UTC; values past ~year 5138 in seconds
/// are interpreted as milliseconds.
fn epoch_to_utc(epoch: f64) -> Option<DateTime<Utc>> {
    if !epoch.is_finite() || epoch <= 0.0 {
        return None;
    }
    let seconds = if epoch >= 1e11 { epoch / 1000.0 } else { epoch };
    let secs = seconds.trunc() as i64;
    let nanos = ((seconds - seconds.trunc()) * 1e9) as u32;
    Utc.timestamp_opt(secs, nanos).single()
}

/// One page of the paginated markets endpoint.
#[derive(Debug, Deserialize)]
pub struct MarketsPage {
    pub data: Option<Vec<ApiMarket>>,
    pub next_cursor: Option<String>,
}

/// Outcome token as returned inline by the CLOB markets endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiToken {
    pub token_id: String,
    pub outcome: String,
    #[serde(default)]
    pub price: Option<Value>,
}

/// A market row from either the CLOB or the metadata API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiMarket {
    #[serde(alias = "conditionId")]
    pub condition_id: String,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, alias = "endDate", alias = "end_date_iso")]
    pub end_date: Option<String>,
    #[serde(default, alias = "startDate", alias = "game_start_time")]
    pub start_date: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub closed: Option<bool>,
    #[serde(default)]
    pub archived: Option<bool>,
    #[serde(default, alias = "volumeNum", alias = "volume24hr")]
    pub volume: Option<Value>,
    #[serde(default, alias = "liquidityNum")]
    pub liquidity: Option<Value>,
    #[serde(default, alias = "bestBid")]
    pub best_bid: Option<Value>,
    #[serde(default, alias = "bestAsk")]
    pub best_ask: Option<Value>,
    /// Inline tokens (CLOB shape).
    #[serde(default)]
    pub tokens: Option<Vec<ApiToken>>,
    /// JSON-string token ID array (metadata API shape).
    #[serde(default, alias = "clobTokenIds")]
    pub clob_token_ids: Option<String>,
    /// JSON-string outcome label array.
    #[serde(default)]
    pub outcomes: Option<String>,
    /// JSON-string outcome price array.
    #[serde(default, alias = "outcomePrices")]
    pub outcome_prices: Option<String>,
}

impl ApiMarket {
    /// Token IDs from whichever representation the endpoint used.
    #[must_use]
    pub fn token_ids(&self) -> Vec<String> {
        if let Some(tokens) = &self.tokens {
            return tokens.iter().map(|t| t.token_id.clone()).collect();
        }
        self.clob_token_ids
            .as_deref()
            .map(decode_string_array)
            .unwrap_or_default()
    }

    /// Outcome labels, index-aligned with [`ApiMarket::token_ids`].
    #[must_use]
    pub fn outcome_labels(&self) -> Vec<String> {
        if let Some(tokens) = &self.tokens {
            return tokens.iter().map(|t| t.outcome.clone()).collect();
        }
        self.outcomes
            .as_deref()
            .map(decode_string_array)
            .unwrap_or_default()
    }

    /// Outcome prices, index-aligned with [`ApiMarket::token_ids`].
    #[must_use]
    pub fn prices(&self) -> Vec<Option<Decimal>> {
        if let Some(tokens) = &self.tokens {
            return tokens
                .iter()
                .map(|t| t.price.as_ref().and_then(decimal_from_value))
                .collect();
        }
        self.outcome_prices
            .as_deref()
            .map(|raw| {
                decode_string_array(raw)
                    .into_iter()
                    .map(|s| Decimal::from_str(&s).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn end_date_utc(&self) -> Option<DateTime<Utc>> {
        self.end_date
            .as_deref()
            .and_then(|s| timestamp_from_value(&Value::String(s.to_string())))
    }

    #[must_use]
    pub fn volume_f64(&self) -> Option<f64> {
        self.volume.as_ref().and_then(f64_from_value)
    }

    #[must_use]
    pub fn liquidity_f64(&self) -> Option<f64> {
        self.liquidity.as_ref().and_then(f64_from_value)
    }

    /// Ask-bid spread when both sides are known.
    #[must_use]
    pub fn spread(&self) -> Option<f64> {
        let bid = self.best_bid.as_ref().and_then(f64_from_value)?;
        let ask = self.best_ask.as_ref().and_then(f64_from_value)?;
        Some((ask - bid).max(0.0))
    }
}

/// An executed trade from the data API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiTrade {
    #[serde(default, alias = "conditionId", alias = "market")]
    pub condition_id: Option<String>,
    #[serde(default, alias = "transactionHash", alias = "trade_id")]
    pub id: Option<String>,
    #[serde(default, alias = "asset_id", alias = "token_id")]
    pub asset: Option<String>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub size: Option<Value>,
    #[serde(default, alias = "outcome")]
    pub side: Option<String>,
    #[serde(default, alias = "match_time")]
    pub timestamp: Option<Value>,
}
