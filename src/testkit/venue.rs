//! Scripted venue fake.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::core::domain::OrderId;
use crate::core::exchange::{NewOrder, OrderAck, Venue, VenueOrder, VenuePosition};
use crate::error::{ExecutionError, Result};

enum ScriptedAck {
    Ok(String),
    Err(String),
}

/// A venue whose responses are scripted by the test.
pub struct ScriptedVenue {
    balance: Mutex<Decimal>,
    positions: Mutex<Vec<VenuePosition>>,
    acks: Mutex<VecDeque<ScriptedAck>>,
    statuses: Mutex<HashMap<String, VenueOrder>>,
    balance_calls: AtomicUsize,
    submit_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
    ack_counter: AtomicUsize,
}

impl ScriptedVenue {
    #[must_use]
    pub fn new(balance: Decimal) -> Self {
        Self {
            balance: Mutex::new(balance),
            positions: Mutex::new(Vec::new()),
            acks: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(HashMap::new()),
            balance_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            ack_counter: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_positions(self, positions: Vec<VenuePosition>) -> Self {
        *self.positions.lock() = positions;
        self
    }

    pub fn set_balance(&self, balance: Decimal) {
        *self.balance.lock() = balance;
    }

    /// Queue an ack with the given order ID for the next submission.
    pub fn script_ack(&self, order_id: &str) {
        self.acks
            .lock()
            .push_back(ScriptedAck::Ok(order_id.to_string()));
    }

    /// Queue a rejection for the next submission.
    pub fn script_submit_error(&self, reason: &str) {
        self.acks
            .lock()
            .push_back(ScriptedAck::Err(reason.to_string()));
    }

    /// Script the venue-reported state for an order.
    pub fn script_status(
        &self,
        order_id: &str,
        status: &str,
        size_matched: Decimal,
        avg_fill_price: Option<Decimal>,
    ) {
        self.statuses.lock().insert(
            order_id.to_string(),
            VenueOrder {
                status: status.to_string(),
                size_matched,
                avg_fill_price,
            },
        );
    }

    #[must_use]
    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Venue for ScriptedVenue {
    async fn submit_order(&self, _order: &NewOrder) -> Result<OrderAck> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        match self.acks.lock().pop_front() {
            Some(ScriptedAck::Ok(order_id)) => Ok(OrderAck {
                order_id,
                status: Some("LIVE".to_string()),
            }),
            Some(ScriptedAck::Err(reason)) => {
                Err(ExecutionError::VenueRejected { reason }.into())
            }
            None => {
                let n = self.ack_counter.fetch_add(1, Ordering::SeqCst);
                Ok(OrderAck {
                    order_id: format!("scripted-{n}"),
                    status: Some("LIVE".to_string()),
                })
            }
        }
    }

    async fn cancel_order(&self, _order_id: &OrderId) -> Result<bool> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn order_status(&self, order_id: &OrderId) -> Result<VenueOrder> {
        self.statuses
            .lock()
            .get(order_id.as_str())
            .cloned()
            .ok_or_else(|| ExecutionError::UnknownOrder(order_id.to_string()).into())
    }

    async fn balance(&self) -> Result<Decimal> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.balance.lock())
    }

    async fn positions(&self) -> Result<Vec<VenuePosition>> {
        Ok(self.positions.lock().clone())
    }
}
