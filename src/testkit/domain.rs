//! Domain object builders for tests.

use chrono::Utc;
use rust_decimal::Decimal;

use crate::core::domain::{
    ConditionId, Fill, IngestEvent, Market, Order, OrderId, OrderMode, OrderStatus, OutcomeToken,
    Side, TokenId, TradeTick,
};

/// A live order with no fills.
#[must_use]
pub fn order(
    id: OrderId,
    token: &str,
    condition: &str,
    side: Side,
    price: Decimal,
    size: Decimal,
) -> Order {
    let now = Utc::now();
    Order {
        id,
        token_id: TokenId::from(token),
        condition_id: ConditionId::from(condition),
        side,
        price,
        size,
        filled_size: Decimal::ZERO,
        avg_fill_price: None,
        status: OrderStatus::Live,
        mode: OrderMode::Live,
        created_at: now,
        updated_at: now,
    }
}

/// A buy fill.
#[must_use]
pub fn fill(order_id: &str, token: &str, condition: &str, size: Decimal, price: Decimal) -> Fill {
    Fill {
        order_id: OrderId::new(order_id),
        token_id: TokenId::from(token),
        condition_id: ConditionId::from(condition),
        side: Side::Buy,
        size,
        price,
        timestamp: Utc::now(),
    }
}

/// A fresh trade event at the given price.
#[must_use]
pub fn trade_event(token: &str, condition: &str, price: Decimal) -> IngestEvent {
    IngestEvent::Trade(TradeTick {
        token_id: TokenId::from(token),
        condition_id: Some(ConditionId::from(condition)),
        price: Some(price),
        size: Some(Decimal::from(50)),
        side: Some(Side::Buy),
        timestamp: Some(Utc::now()),
    })
}

/// A binary market with Yes/No tokens and a far-out end date.
#[must_use]
pub fn market(condition: &str, question: &str, yes_token: &str, no_token: &str) -> Market {
    Market {
        condition_id: ConditionId::from(condition),
        question: question.to_string(),
        category: None,
        end_date: Some(Utc::now() + chrono::Duration::days(30)),
        resolved: false,
        resolution_outcome: None,
        tokens: vec![
            OutcomeToken {
                token_id: TokenId::from(yes_token),
                outcome: "Yes".to_string(),
                outcome_index: 0,
                price: None,
            },
            OutcomeToken {
                token_id: TokenId::from(no_token),
                outcome: "No".to_string(),
                outcome_index: 1,
                price: None,
            },
        ],
        volume_24h: Some(100_000.0),
        liquidity: Some(50_000.0),
    }
}
