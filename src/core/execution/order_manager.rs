//! Order submission, reconciliation, and cancellation.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::domain::{
    ConditionId, Fill, Order, OrderId, OrderMode, OrderStatus, Side, TokenId,
};
use crate::core::exchange::{NewOrder, Venue};
use crate::core::execution::BalanceManager;
use crate::core::store::OrderStore;
use crate::error::{Error, ExecutionError, Result};

/// Order manager settings.
#[derive(Debug, Clone)]
pub struct OrderConfig {
    /// BUY orders above this price are rejected before any venue call.
    pub max_price: Decimal,
    pub mode: OrderMode,
}

/// Submits, tracks, reconciles, and cancels orders.
///
/// The in-memory order map is owned here; every mutation is persisted.
pub struct OrderManager {
    venue: Arc<dyn Venue>,
    store: Arc<dyn OrderStore>,
    balance: Arc<BalanceManager>,
    config: OrderConfig,
    orders: DashMap<OrderId, Order>,
    fills: mpsc::UnboundedSender<Fill>,
}

impl OrderManager {
    #[must_use]
    pub fn new(
        venue: Arc<dyn Venue>,
        store: Arc<dyn OrderStore>,
        balance: Arc<BalanceManager>,
        config: OrderConfig,
        fills: mpsc::UnboundedSender<Fill>,
    ) -> Self {
        Self {
            venue,
            store,
            balance,
            config,
            orders: DashMap::new(),
            fills,
        }
    }

    /// Submit an order.
    ///
    /// BUYs are capped at the configured max price (SELLs bypass the cap)
    /// and reserve `price * size` before the venue call; the reservation is
    /// released on any failure. The row is persisted as PENDING before the
    /// venue is contacted and rolled back if the venue does not return a
    /// usable order ID.
    pub async fn submit_order(
        &self,
        token_id: TokenId,
        condition_id: ConditionId,
        side: Side,
        price: Decimal,
        size: Decimal,
    ) -> Result<OrderId> {
        if price <= Decimal::ZERO || price > Decimal::ONE {
            return Err(Error::invalid("price", format!("{price} is outside (0, 1]")));
        }
        if size <= Decimal::ZERO {
            return Err(Error::invalid("size", format!("{size} is not positive")));
        }
        if side == Side::Buy && price > self.config.max_price {
            return Err(ExecutionError::PriceCap {
                price,
                max: self.config.max_price,
            }
            .into());
        }

        let now = Utc::now();
        let client_id = OrderId::provisional();
        let order = Order {
            id: client_id.clone(),
            token_id: token_id.clone(),
            condition_id,
            side,
            price,
            size,
            filled_size: Decimal::ZERO,
            avg_fill_price: None,
            status: OrderStatus::Pending,
            mode: self.config.mode,
            created_at: now,
            updated_at: now,
        };

        // Persist PENDING before touching the venue so a crash between the
        // two leaves a row reconciliation can pick up.
        self.store.upsert(&order).await?;

        if side == Side::Buy {
            if let Err(e) = self.balance.reserve(&client_id, price * size).await {
                self.store.delete(&client_id).await?;
                return Err(e.into());
            }
        }

        let request = NewOrder {
            token_id,
            side,
            price,
            size,
        };
        let ack = match self.venue.submit_order(&request).await {
            Ok(ack) => ack,
            Err(e) => {
                // Keep the row as an audit record of the rejection.
                self.balance.release_reservation(&client_id);
                let mut rejected = order;
                rejected.status = OrderStatus::Rejected;
                rejected.updated_at = Utc::now();
                self.store.upsert(&rejected).await?;
                return Err(e);
            }
        };

        if ack.order_id.is_empty() {
            // An empty ID would corrupt the order map and can never be
            // reconciled; treat the submission as failed.
            warn!("Venue returned empty order ID, rolling back");
            self.balance.release_reservation(&client_id);
            self.store.delete(&client_id).await?;
            return Err(ExecutionError::VenueRejected {
                reason: "venue returned empty order id".to_string(),
            }
            .into());
        }

        let venue_id = OrderId::new(ack.order_id);
        self.balance.rename_reservation(&client_id, &venue_id);
        self.store.replace_id(&client_id, &venue_id).await?;

        let mut live = order;
        live.id = venue_id.clone();
        live.status = OrderStatus::Live;
        live.updated_at = Utc::now();
        self.store.upsert(&live).await?;
        info!(
            order_id = %venue_id,
            token = %live.token_id,
            side = %side,
            price = %price,
            size = %size,
            "Order live"
        );
        self.orders.insert(venue_id.clone(), live);
        Ok(venue_id)
    }

    /// Poll the venue and reconcile one order's state.
    ///
    /// Fill state is recomputed from the venue's cumulative matched size,
    /// so out-of-order notifications cannot corrupt it. Terminal and
    /// partial transitions refresh the venue balance so no caller sees a
    /// stale cached total.
    pub async fn sync_order_status(&self, order_id: &OrderId) -> Result<Order> {
        let mut order = self
            .orders
            .get(order_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| ExecutionError::UnknownOrder(order_id.to_string()))?;

        if order.status.is_terminal() {
            return Ok(order);
        }

        let venue_state = self.venue.order_status(order_id).await?;
        let new_status = map_status(&venue_state.status, order.size, venue_state.size_matched);
        let incremental = (venue_state.size_matched - order.filled_size).max(Decimal::ZERO);
        let fill_price = venue_state.avg_fill_price.unwrap_or(order.price);

        order.filled_size = venue_state.size_matched.min(order.size);
        if order.filled_size > Decimal::ZERO {
            order.avg_fill_price = Some(fill_price);
        }
        order.status = new_status;
        order.updated_at = Utc::now();

        if incremental > Decimal::ZERO {
            let fill = Fill {
                order_id: order.id.clone(),
                token_id: order.token_id.clone(),
                condition_id: order.condition_id.clone(),
                side: order.side,
                size: incremental,
                price: fill_price,
                timestamp: order.updated_at,
            };
            if order.side == Side::Buy {
                self.balance
                    .adjust_reservation_for_partial_fill(order_id, fill.notional());
            }
            let _ = self.fills.send(fill);
        }

        match new_status {
            OrderStatus::Partial => {
                // Stale cached totals after a fill are how double-spends
                // happen; force a refresh.
                self.balance.refresh_balance().await;
            }
            status if status.is_terminal() => {
                self.balance.release_reservation(order_id);
                self.balance.refresh_balance().await;
            }
            _ => {}
        }

        self.store.upsert(&order).await?;
        self.orders.insert(order_id.clone(), order.clone());
        debug!(order_id = %order_id, status = order.status.as_str(), filled = %order.filled_size, "Order reconciled");
        Ok(order)
    }

    /// Reconcile every open order.
    pub async fn sync_open_orders(&self) -> Result<usize> {
        let open: Vec<OrderId> = self
            .orders
            .iter()
            .filter(|entry| entry.status.is_open())
            .map(|entry| entry.key().clone())
            .collect();
        let count = open.len();
        for order_id in open {
            if let Err(e) = self.sync_order_status(&order_id).await {
                warn!(order_id = %order_id, error = %e, "Order reconciliation failed");
            }
        }
        Ok(count)
    }

    /// Cancel an order. Idempotent: an already-terminal order reports
    /// success, and a venue "already canceled" response counts as success.
    pub async fn cancel_order(&self, order_id: &OrderId) -> Result<bool> {
        let Some(order) = self.orders.get(order_id).map(|e| e.clone()) else {
            return Err(ExecutionError::UnknownOrder(order_id.to_string()).into());
        };
        if order.status.is_terminal() {
            return Ok(true);
        }

        let cancelled = self.venue.cancel_order(order_id).await?;
        if cancelled {
            let mut updated = order;
            updated.status = OrderStatus::Cancelled;
            updated.updated_at = Utc::now();
            self.store.upsert(&updated).await?;
            self.orders.insert(order_id.clone(), updated);

            self.balance.release_reservation(order_id);
            self.balance.refresh_balance().await;
            info!(order_id = %order_id, "Order cancelled");
        }
        Ok(cancelled)
    }

    /// Re-hydrate non-terminal orders from storage, recreating reservations
    /// for the unfilled remainder of BUYs. Orders whose reservations no
    /// longer fit the balance are still tracked, just not re-reserved.
    pub async fn load_orders(&self) -> Result<usize> {
        let open = self.store.open_orders().await?;
        let count = open.len();

        for order in open {
            if order.side == Side::Buy {
                let remaining = order.remaining_notional();
                if remaining > Decimal::ZERO {
                    if let Err(e) = self.balance.reserve(&order.id, remaining).await {
                        warn!(
                            order_id = %order.id,
                            remaining = %remaining,
                            error = %e,
                            "Order over-committed from prior run; tracking without reservation"
                        );
                    }
                }
            }
            self.orders.insert(order.id.clone(), order);
        }

        info!(count, "Orders loaded from storage");
        Ok(count)
    }

    #[must_use]
    pub fn get_order(&self, order_id: &OrderId) -> Option<Order> {
        self.orders.get(order_id).map(|entry| entry.clone())
    }

    #[must_use]
    pub fn get_open_orders(&self) -> Vec<Order> {
        self.orders
            .iter()
            .filter(|entry| entry.status.is_open())
            .map(|entry| entry.clone())
            .collect()
    }

    pub async fn get_available_balance(&self) -> Decimal {
        self.balance.get_available_balance().await
    }
}

/// Map a venue status string plus cumulative fill into our state machine.
/// Both "CANCELED" and "CANCELLED" spellings appear in the wild.
fn map_status(venue_status: &str, size: Decimal, size_matched: Decimal) -> OrderStatus {
    let status = venue_status.to_ascii_uppercase();
    if status.contains("CANCEL") {
        OrderStatus::Cancelled
    } else if status.contains("REJECT") {
        OrderStatus::Rejected
    } else if size_matched >= size {
        OrderStatus::Filled
    } else if size_matched > Decimal::ZERO {
        OrderStatus::Partial
    } else {
        OrderStatus::Live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::execution::BalanceConfig;
    use crate::testkit::store::InMemoryStores;
    use crate::testkit::venue::ScriptedVenue;
    use rust_decimal_macros::dec;

    struct Rig {
        manager: OrderManager,
        venue: Arc<ScriptedVenue>,
        stores: InMemoryStores,
        fills: mpsc::UnboundedReceiver<Fill>,
    }

    fn rig() -> Rig {
        let stores = InMemoryStores::new();
        let venue = Arc::new(ScriptedVenue::new(dec!(1000.00)));
        let balance = Arc::new(BalanceManager::new(
            Some(venue.clone()),
            BalanceConfig::default(),
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = OrderManager::new(
            venue.clone(),
            stores.orders(),
            balance,
            OrderConfig {
                max_price: dec!(0.95),
                mode: OrderMode::Live,
            },
            tx,
        );
        Rig {
            manager,
            venue,
            stores,
            fills: rx,
        }
    }

    async fn submit(rig: &Rig) -> OrderId {
        rig.manager
            .submit_order(
                TokenId::from("tok_yes_abc"),
                ConditionId::from("0xtest123"),
                Side::Buy,
                dec!(0.95),
                dec!(20),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn submits_buy_order() {
        let rig = rig();
        rig.venue.script_ack("order_123");
        let order_id = submit(&rig).await;
        assert_eq!(order_id.as_str(), "order_123");

        let order = rig.manager.get_order(&order_id).unwrap();
        assert_eq!(order.status, OrderStatus::Live);
        assert_eq!(order.token_id.as_str(), "tok_yes_abc");

        // Persisted under the venue-assigned ID.
        let stored = rig.stores.orders().get(&order_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Live);
    }

    #[tokio::test]
    async fn rejects_buy_above_max_price() {
        let rig = rig();
        let err = rig
            .manager
            .submit_order(
                TokenId::from("tok"),
                ConditionId::from("0xC"),
                Side::Buy,
                dec!(0.97),
                dec!(20),
            )
            .await
            .unwrap_err();

        match err {
            Error::Execution(ExecutionError::PriceCap { price, max }) => {
                assert_eq!(price, dec!(0.97));
                assert_eq!(max, dec!(0.95));
            }
            other => panic!("unexpected error {other:?}"),
        }
        // No venue call, no row, no reservation.
        assert_eq!(rig.venue.submit_calls(), 0);
        assert!(rig.stores.orders().open_orders().await.unwrap().is_empty());
        assert_eq!(rig.manager.get_available_balance().await, dec!(1000.00));
    }

    #[tokio::test]
    async fn sell_orders_bypass_price_cap() {
        let rig = rig();
        rig.venue.script_ack("sell_order");
        let order_id = rig
            .manager
            .submit_order(
                TokenId::from("tok"),
                ConditionId::from("0xC"),
                Side::Sell,
                dec!(0.99),
                dec!(20),
            )
            .await
            .unwrap();
        assert_eq!(order_id.as_str(), "sell_order");
    }

    #[tokio::test]
    async fn rejects_invalid_price_and_size() {
        let rig = rig();
        assert!(matches!(
            rig.manager
                .submit_order(
                    TokenId::from("t"),
                    ConditionId::from("c"),
                    Side::Buy,
                    dec!(0),
                    dec!(10)
                )
                .await,
            Err(Error::Invalid { field: "price", .. })
        ));
        assert!(matches!(
            rig.manager
                .submit_order(
                    TokenId::from("t"),
                    ConditionId::from("c"),
                    Side::Sell,
                    dec!(0.5),
                    dec!(0)
                )
                .await,
            Err(Error::Invalid { field: "size", .. })
        ));
    }

    #[tokio::test]
    async fn reserves_balance_on_buy() {
        let rig = rig();
        rig.venue.script_ack("order_123");
        let before = rig.manager.get_available_balance().await;
        submit(&rig).await;
        let after = rig.manager.get_available_balance().await;
        // 20 * 0.95 = $19 reserved
        assert_eq!(after, before - dec!(19.00));
    }

    #[tokio::test]
    async fn empty_order_id_rolls_back() {
        let rig = rig();
        rig.venue.script_ack("");
        let err = rig
            .manager
            .submit_order(
                TokenId::from("tok"),
                ConditionId::from("0xC"),
                Side::Buy,
                dec!(0.95),
                dec!(20),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Execution(ExecutionError::VenueRejected { .. })
        ));
        assert!(rig.stores.orders().open_orders().await.unwrap().is_empty());
        assert_eq!(rig.manager.get_available_balance().await, dec!(1000.00));
    }

    #[tokio::test]
    async fn venue_failure_releases_reservation() {
        let rig = rig();
        rig.venue.script_submit_error("market closed");
        let err = submit_expect_err(&rig).await;
        assert!(matches!(
            err,
            Error::Execution(ExecutionError::VenueRejected { .. })
        ));
        assert_eq!(rig.manager.get_available_balance().await, dec!(1000.00));
    }

    async fn submit_expect_err(rig: &Rig) -> Error {
        rig.manager
            .submit_order(
                TokenId::from("tok"),
                ConditionId::from("0xC"),
                Side::Buy,
                dec!(0.95),
                dec!(20),
            )
            .await
            .unwrap_err()
    }

    #[tokio::test]
    async fn syncs_full_fill() {
        let mut rig = rig();
        rig.venue.script_ack("order_123");
        let order_id = submit(&rig).await;

        rig.venue
            .script_status("order_123", "MATCHED", dec!(20), Some(dec!(0.95)));
        let order = rig.manager.sync_order_status(&order_id).await.unwrap();

        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.filled_size, dec!(20));

        // Fill emitted with the full size.
        let fill = rig.fills.recv().await.unwrap();
        assert_eq!(fill.size, dec!(20));
        assert_eq!(fill.price, dec!(0.95));

        // Reservation released.
        assert_eq!(rig.manager.get_available_balance().await, dec!(1000.00));
    }

    #[tokio::test]
    async fn detects_partial_fill_and_adjusts_reservation() {
        let mut rig = rig();
        rig.venue.script_ack("order_123");
        let order_id = submit(&rig).await;

        rig.venue
            .script_status("order_123", "LIVE", dec!(10), Some(dec!(0.95)));
        let order = rig.manager.sync_order_status(&order_id).await.unwrap();

        assert_eq!(order.status, OrderStatus::Partial);
        assert_eq!(order.filled_size, dec!(10));

        let fill = rig.fills.recv().await.unwrap();
        assert_eq!(fill.size, dec!(10));

        // $19 reserved - $9.50 filled = $9.50 still reserved.
        assert_eq!(rig.manager.get_available_balance().await, dec!(990.50));
    }

    #[tokio::test]
    async fn cumulative_fills_emit_increments() {
        let mut rig = rig();
        rig.venue.script_ack("order_123");
        let order_id = submit(&rig).await;

        rig.venue
            .script_status("order_123", "LIVE", dec!(10), Some(dec!(0.95)));
        rig.manager.sync_order_status(&order_id).await.unwrap();

        rig.venue
            .script_status("order_123", "MATCHED", dec!(20), Some(dec!(0.95)));
        rig.manager.sync_order_status(&order_id).await.unwrap();

        let first = rig.fills.recv().await.unwrap();
        let second = rig.fills.recv().await.unwrap();
        assert_eq!(first.size, dec!(10));
        assert_eq!(second.size, dec!(10));
    }

    #[tokio::test]
    async fn accepts_both_cancel_spellings() {
        assert_eq!(
            map_status("CANCELED", dec!(20), dec!(0)),
            OrderStatus::Cancelled
        );
        assert_eq!(
            map_status("CANCELLED", dec!(20), dec!(0)),
            OrderStatus::Cancelled
        );
        assert_eq!(
            map_status("REJECTED", dec!(20), dec!(0)),
            OrderStatus::Rejected
        );
        assert_eq!(map_status("LIVE", dec!(20), dec!(20)), OrderStatus::Filled);
        assert_eq!(map_status("LIVE", dec!(20), dec!(5)), OrderStatus::Partial);
        assert_eq!(map_status("LIVE", dec!(20), dec!(0)), OrderStatus::Live);
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let rig = rig();
        rig.venue.script_ack("order_123");
        let order_id = submit(&rig).await;

        assert!(rig.manager.cancel_order(&order_id).await.unwrap());
        assert!(rig.manager.cancel_order(&order_id).await.unwrap());

        let order = rig.manager.get_order(&order_id).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        // Only one venue round-trip; the second cancel short-circuits.
        assert_eq!(rig.venue.cancel_calls(), 1);
    }

    #[tokio::test]
    async fn cancel_releases_reservation() {
        let rig = rig();
        rig.venue.script_ack("order_123");
        let order_id = submit(&rig).await;

        let reserved = rig.manager.get_available_balance().await;
        rig.manager.cancel_order(&order_id).await.unwrap();
        let released = rig.manager.get_available_balance().await;
        assert_eq!(released, reserved + dec!(19.00));
    }

    #[tokio::test]
    async fn loads_orders_and_restores_reservations() {
        let rig = rig();
        let order = crate::testkit::domain::order(
            OrderId::new("order_db_1"),
            "tok_yes_abc",
            "0xtest123",
            Side::Buy,
            dec!(0.95),
            dec!(20),
        );
        rig.stores.orders().upsert(&order).await.unwrap();

        let count = rig.manager.load_orders().await.unwrap();
        assert_eq!(count, 1);
        assert!(rig.manager.get_order(&OrderId::new("order_db_1")).is_some());
        // Full unfilled reservation: 20 * 0.95 = $19.
        assert_eq!(rig.manager.get_available_balance().await, dec!(981.00));
    }

    #[tokio::test]
    async fn loads_partial_orders_reserving_remainder_only() {
        let rig = rig();
        let mut order = crate::testkit::domain::order(
            OrderId::new("order_partial"),
            "tok_yes_abc",
            "0xtest123",
            Side::Buy,
            dec!(0.95),
            dec!(20),
        );
        order.filled_size = dec!(10);
        order.status = OrderStatus::Partial;
        rig.stores.orders().upsert(&order).await.unwrap();

        rig.manager.load_orders().await.unwrap();
        // Only the unfilled half: 10 * 0.95 = $9.50.
        assert_eq!(rig.manager.get_available_balance().await, dec!(990.50));
    }

    #[tokio::test]
    async fn over_committed_orders_are_tracked_without_reservation() {
        let rig = rig();
        for (id, size) in [("order_1", dec!(500)), ("order_2", dec!(1000))] {
            let order = crate::testkit::domain::order(
                OrderId::new(id),
                "tok",
                "0xC",
                Side::Buy,
                dec!(0.95),
                size,
            );
            rig.stores.orders().upsert(&order).await.unwrap();
        }

        let count = rig.manager.load_orders().await.unwrap();
        assert_eq!(count, 2);
        assert!(rig.manager.get_order(&OrderId::new("order_1")).is_some());
        assert!(rig.manager.get_order(&OrderId::new("order_2")).is_some());
        // Only the first order fit: $475 reserved of $1000.
        assert_eq!(rig.manager.get_available_balance().await, dec!(525.00));
    }

    #[tokio::test]
    async fn sell_orders_load_without_reservation() {
        let rig = rig();
        let order = crate::testkit::domain::order(
            OrderId::new("sell_order"),
            "tok",
            "0xC",
            Side::Sell,
            dec!(0.99),
            dec!(20),
        );
        rig.stores.orders().upsert(&order).await.unwrap();

        rig.manager.load_orders().await.unwrap();
        assert_eq!(rig.manager.get_available_balance().await, dec!(1000.00));
    }

    #[tokio::test]
    async fn lists_open_orders() {
        let rig = rig();
        rig.venue.script_ack("order_1");
        submit(&rig).await;
        rig.venue.script_ack("order_2");
        rig.manager
            .submit_order(
                TokenId::from("tok_2"),
                ConditionId::from("0xC2"),
                Side::Buy,
                dec!(0.94),
                dec!(10),
            )
            .await
            .unwrap();

        assert_eq!(rig.manager.get_open_orders().len(), 2);
    }
}
