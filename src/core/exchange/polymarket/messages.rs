//! WebSocket wire messages and normalization to canonical events.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::response::{decimal_from_value, timestamp_from_value};
use crate::core::domain::{
    BookLevel, BookSnapshot, ConditionId, IngestEvent, PriceTick, Side, TokenId, TradeTick,
};
use crate::error::Result;

/// Subscription message sent on connect and after every reconnect.
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeMessage {
    pub assets_ids: Vec<String>,
}

impl SubscribeMessage {
    #[must_use]
    pub fn new(assets_ids: Vec<String>) -> Self {
        Self { assets_ids }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawLevel {
    #[serde(default)]
    price: Option<Value>,
    #[serde(default)]
    size: Option<Value>,
}

/// One raw event as the feed sends it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    #[serde(default, alias = "type")]
    event_type: Option<String>,
    #[serde(default)]
    asset_id: Option<String>,
    /// The venue calls the condition "market" here. It is NOT a token ID.
    #[serde(default)]
    market: Option<String>,
    #[serde(default)]
    price: Option<Value>,
    #[serde(default)]
    last_trade_price: Option<Value>,
    #[serde(default)]
    size: Option<Value>,
    #[serde(default)]
    side: Option<String>,
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(default)]
    bids: Vec<RawLevel>,
    #[serde(default)]
    asks: Vec<RawLevel>,
}

impl RawEvent {
    /// Normalize to a canonical event.
    ///
    /// Returns `None` for price-bearing events that carry no `asset_id`:
    /// a frame with only `market` identifies a condition, not a token, and
    /// is skipped.
    #[must_use]
    pub fn normalize(self) -> Option<IngestEvent> {
        let event_type = self.event_type.as_deref().unwrap_or_default();

        if matches!(event_type, "heartbeat" | "ping" | "PING") {
            return Some(IngestEvent::Heartbeat);
        }

        let condition_id = self
            .market
            .as_deref()
            .filter(|m| !m.is_empty())
            .map(ConditionId::from);
        let timestamp = self.timestamp.as_ref().and_then(timestamp_from_value);

        let token_id = match self.asset_id.as_deref() {
            Some(id) if !id.is_empty() => TokenId::from(id),
            _ => {
                return match event_type {
                    "book" | "price_change" | "last_trade_price" | "price_update" | "trade" => {
                        None
                    }
                    _ => Some(IngestEvent::Unknown),
                }
            }
        };

        let price = self.price.as_ref().and_then(decimal_from_value);
        let last_trade_price = self.last_trade_price.as_ref().and_then(decimal_from_value);
        let size = self.size.as_ref().and_then(decimal_from_value);

        match event_type {
            "book" => Some(IngestEvent::Book(BookSnapshot {
                token_id,
                condition_id,
                last_trade_price,
                bids: parse_levels(self.bids),
                asks: parse_levels(self.asks),
                timestamp,
            })),
            "price_change" => Some(IngestEvent::PriceChange(PriceTick {
                token_id,
                condition_id,
                price,
                last_trade_price,
                size,
                timestamp,
            })),
            "last_trade_price" => Some(IngestEvent::LastTradePrice(PriceTick {
                token_id,
                condition_id,
                price,
                last_trade_price,
                size,
                timestamp,
            })),
            "price_update" => Some(IngestEvent::PriceUpdate(PriceTick {
                token_id,
                condition_id,
                price,
                last_trade_price,
                size,
                timestamp,
            })),
            "trade" => Some(IngestEvent::Trade(TradeTick {
                token_id,
                condition_id,
                price,
                size,
                side: self.side.as_deref().and_then(Side::parse),
                timestamp,
            })),
            _ => Some(IngestEvent::Unknown),
        }
    }
}

fn parse_levels(raw: Vec<RawLevel>) -> Vec<BookLevel> {
    raw.into_iter()
        .filter_map(|l| {
            Some(BookLevel {
                price: l.price.as_ref().and_then(decimal_from_value)?,
                size: l.size.as_ref().and_then(decimal_from_value).unwrap_or(Decimal::ZERO),
            })
        })
        .collect()
}

/// Parse one WebSocket text frame into canonical events.
///
/// Frames may be a single object or an array of events; an empty array is
/// a subscription acknowledgment. Events that normalization skips (no
/// token identity) are dropped here.
pub fn parse_frame(text: &str) -> Result<Vec<IngestEvent>> {
    let value: Value = serde_json::from_str(text)?;
    match value {
        Value::Array(items) if items.is_empty() => Ok(vec![IngestEvent::Ack]),
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<RawEvent>(item).ok())
            .filter_map(RawEvent::normalize)
            .collect()),
        Value::Object(_) => {
            let event: RawEvent = serde_json::from_value(value)?;
            Ok(event.normalize().into_iter().collect())
        }
        _ => Ok(Vec::new()),
    }
}
