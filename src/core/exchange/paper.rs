//! Paper-trading venue.
//!
//! Simulates the venue surface without touching the network: orders are
//! acknowledged immediately and report as fully matched at their limit
//! price on the next status poll.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use super::{NewOrder, OrderAck, Venue, VenueOrder, VenuePosition};
use crate::core::domain::OrderId;
use crate::error::{ExecutionError, Result};

/// In-memory venue for paper mode and tests.
pub struct PaperVenue {
    balance: Decimal,
    orders: Mutex<HashMap<String, NewOrder>>,
    cancelled: Mutex<HashMap<String, bool>>,
    counter: AtomicU64,
}

impl PaperVenue {
    #[must_use]
    pub fn new(starting_balance: Decimal) -> Self {
        Self {
            balance: starting_balance,
            orders: Mutex::new(HashMap::new()),
            cancelled: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl Venue for PaperVenue {
    async fn submit_order(&self, order: &NewOrder) -> Result<OrderAck> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let order_id = format!("paper-{n}");
        self.orders.lock().insert(order_id.clone(), order.clone());
        Ok(OrderAck {
            order_id,
            status: Some("LIVE".to_string()),
        })
    }

    async fn cancel_order(&self, order_id: &OrderId) -> Result<bool> {
        self.cancelled
            .lock()
            .insert(order_id.as_str().to_string(), true);
        Ok(true)
    }

    async fn order_status(&self, order_id: &OrderId) -> Result<VenueOrder> {
        if self.cancelled.lock().contains_key(order_id.as_str()) {
            return Ok(VenueOrder {
                status: "CANCELED".to_string(),
                size_matched: Decimal::ZERO,
                avg_fill_price: None,
            });
        }
        let orders = self.orders.lock();
        let order = orders
            .get(order_id.as_str())
            .ok_or_else(|| ExecutionError::UnknownOrder(order_id.to_string()))?;
        Ok(VenueOrder {
            status: "MATCHED".to_string(),
            size_matched: order.size,
            avg_fill_price: Some(order.price),
        })
    }

    async fn balance(&self) -> Result<Decimal> {
        Ok(self.balance)
    }

    async fn positions(&self) -> Result<Vec<VenuePosition>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{Side, TokenId};
    use rust_decimal_macros::dec;

    fn order() -> NewOrder {
        NewOrder {
            token_id: TokenId::from("tok"),
            side: Side::Buy,
            price: dec!(0.95),
            size: dec!(20),
        }
    }

    #[tokio::test]
    async fn submitted_orders_fill_at_limit_price() {
        let venue = PaperVenue::new(dec!(1000));
        let ack = venue.submit_order(&order()).await.unwrap();
        assert!(ack.order_id.starts_with("paper-"));

        let status = venue.order_status(&OrderId::from(ack.order_id)).await.unwrap();
        assert_eq!(status.status, "MATCHED");
        assert_eq!(status.size_matched, dec!(20));
        assert_eq!(status.avg_fill_price, Some(dec!(0.95)));
    }

    #[tokio::test]
    async fn cancelled_orders_report_canceled() {
        let venue = PaperVenue::new(dec!(1000));
        let ack = venue.submit_order(&order()).await.unwrap();
        let id = OrderId::from(ack.order_id);
        assert!(venue.cancel_order(&id).await.unwrap());
        let status = venue.order_status(&id).await.unwrap();
        assert_eq!(status.status, "CANCELED");
    }

    #[tokio::test]
    async fn unknown_order_errors() {
        let venue = PaperVenue::new(dec!(1000));
        assert!(venue.order_status(&OrderId::from("nope")).await.is_err());
    }
}
