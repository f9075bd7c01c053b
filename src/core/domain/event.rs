//! Canonical ingest events.
//!
//! Raw WebSocket payloads are normalized into this sum type at the exchange
//! boundary so downstream processing is an exhaustive match instead of
//! attribute probing.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::id::{ConditionId, TokenId};
use super::trade::Side;

/// One level of an order book side.
#[derive(Debug, Clone, PartialEq)]
pub struct BookLevel {
    pub price: Decimal,
    pub size: Decimal,
}

/// Full order book snapshot for one token.
#[derive(Debug, Clone, PartialEq)]
pub struct BookSnapshot {
    pub token_id: TokenId,
    pub condition_id: Option<ConditionId>,
    pub last_trade_price: Option<Decimal>,
    /// Bids sorted best-first.
    pub bids: Vec<BookLevel>,
    /// Asks sorted best-first.
    pub asks: Vec<BookLevel>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl BookSnapshot {
    /// Best (highest) bid price, if any.
    #[must_use]
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.iter().map(|l| l.price).max()
    }

    /// Best (lowest) ask price, if any.
    #[must_use]
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.iter().map(|l| l.price).min()
    }
}

/// A price-bearing tick without book depth.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTick {
    pub token_id: TokenId,
    pub condition_id: Option<ConditionId>,
    pub price: Option<Decimal>,
    /// Fallback price source when the `price` field is absent.
    pub last_trade_price: Option<Decimal>,
    pub size: Option<Decimal>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl PriceTick {
    /// Best available price: the explicit price, then the last trade price.
    #[must_use]
    pub fn effective_price(&self) -> Option<Decimal> {
        self.price.or(self.last_trade_price)
    }
}

/// An executed-trade tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeTick {
    pub token_id: TokenId,
    pub condition_id: Option<ConditionId>,
    pub price: Option<Decimal>,
    pub size: Option<Decimal>,
    pub side: Option<Side>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Canonical event emitted by the ingestion layer.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    Book(BookSnapshot),
    PriceChange(PriceTick),
    LastTradePrice(PriceTick),
    PriceUpdate(PriceTick),
    Trade(TradeTick),
    Heartbeat,
    /// Empty-array frame: a subscription acknowledgment. No-op.
    Ack,
    /// Recognized frame with an event type we do not handle.
    Unknown,
}

impl IngestEvent {
    /// The token this event concerns, when it has one.
    #[must_use]
    pub fn token_id(&self) -> Option<&TokenId> {
        match self {
            Self::Book(b) => Some(&b.token_id),
            Self::PriceChange(t) | Self::LastTradePrice(t) | Self::PriceUpdate(t) => {
                Some(&t.token_id)
            }
            Self::Trade(t) => Some(&t.token_id),
            Self::Heartbeat | Self::Ack | Self::Unknown => None,
        }
    }

    /// Event timestamp, when the payload carried a valid one.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Book(b) => b.timestamp,
            Self::PriceChange(t) | Self::LastTradePrice(t) | Self::PriceUpdate(t) => t.timestamp,
            Self::Trade(t) => t.timestamp,
            Self::Heartbeat | Self::Ack | Self::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn best_bid_and_ask() {
        let book = BookSnapshot {
            token_id: TokenId::from("tok"),
            condition_id: None,
            last_trade_price: None,
            bids: vec![
                BookLevel { price: dec!(0.88), size: dec!(100) },
                BookLevel { price: dec!(0.87), size: dec!(50) },
            ],
            asks: vec![
                BookLevel { price: dec!(0.90), size: dec!(100) },
                BookLevel { price: dec!(0.91), size: dec!(10) },
            ],
            timestamp: None,
        };
        assert_eq!(book.best_bid(), Some(dec!(0.88)));
        assert_eq!(book.best_ask(), Some(dec!(0.90)));
    }

    #[test]
    fn empty_book_has_no_best_prices() {
        let book = BookSnapshot {
            token_id: TokenId::from("tok"),
            condition_id: None,
            last_trade_price: None,
            bids: vec![],
            asks: vec![],
            timestamp: None,
        };
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.best_ask(), None);
    }
}
