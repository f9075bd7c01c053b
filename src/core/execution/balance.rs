//! Capital tracking: venue balance, reservations, and the minimum reserve.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::core::domain::OrderId;
use crate::core::exchange::Venue;
use crate::error::ExecutionError;

/// Balance manager settings.
#[derive(Debug, Clone)]
pub struct BalanceConfig {
    /// Capital never made available for trading.
    pub min_reserve: Decimal,
    /// Cached venue balance older than this is re-fetched.
    pub staleness: Duration,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            min_reserve: Decimal::ZERO,
            staleness: Duration::from_secs(30),
        }
    }
}

/// Capital earmarked for a pending BUY order.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub order_id: OrderId,
    pub amount: Decimal,
    created_at: Instant,
}

#[derive(Default)]
struct State {
    venue_balance: Option<Decimal>,
    fetched_at: Option<Instant>,
    reservations: HashMap<OrderId, Reservation>,
}

impl State {
    fn reserved_total(&self) -> Decimal {
        self.reservations.values().map(|r| r.amount).sum()
    }
}

/// Tracks available capital against reserved funds and the venue balance.
///
/// The reservation map is owned here; all mutation goes through this API.
pub struct BalanceManager {
    venue: Option<Arc<dyn Venue>>,
    config: BalanceConfig,
    state: Mutex<State>,
}

impl BalanceManager {
    #[must_use]
    pub fn new(venue: Option<Arc<dyn Venue>>, config: BalanceConfig) -> Self {
        Self {
            venue,
            config,
            state: Mutex::new(State::default()),
        }
    }

    /// Venue balance, from cache when fresh. Zero without a venue.
    async fn venue_balance(&self) -> Decimal {
        {
            let state = self.state.lock();
            if let (Some(balance), Some(at)) = (state.venue_balance, state.fetched_at) {
                if at.elapsed() < self.config.staleness {
                    return balance;
                }
            }
        }
        self.fetch_balance().await
    }

    async fn fetch_balance(&self) -> Decimal {
        let Some(venue) = &self.venue else {
            return Decimal::ZERO;
        };
        match venue.balance().await {
            Ok(balance) => {
                let mut state = self.state.lock();
                state.venue_balance = Some(balance);
                state.fetched_at = Some(Instant::now());
                balance
            }
            Err(e) => {
                warn!(error = %e, "Balance fetch failed, using last known value");
                self.state.lock().venue_balance.unwrap_or(Decimal::ZERO)
            }
        }
    }

    /// Balance minus active reservations.
    pub async fn get_available_balance(&self) -> Decimal {
        let balance = self.venue_balance().await;
        balance - self.state.lock().reserved_total()
    }

    /// Balance minus the minimum reserve and active reservations.
    pub async fn get_tradeable_balance(&self) -> Decimal {
        let balance = self.venue_balance().await;
        balance - self.config.min_reserve - self.state.lock().reserved_total()
    }

    /// Earmark `amount` for an order.
    ///
    /// Fails when the amount would eat into the minimum reserve: the venue
    /// balance must always cover every reservation plus the reserve.
    /// Idempotent per order ID: re-reserving an already reserved order is
    /// a no-op.
    pub async fn reserve(
        &self,
        order_id: &OrderId,
        amount: Decimal,
    ) -> Result<(), ExecutionError> {
        let balance = self.venue_balance().await;
        let mut state = self.state.lock();

        if state.reservations.contains_key(order_id) {
            return Ok(());
        }

        let available = balance - self.config.min_reserve - state.reserved_total();
        if amount > available {
            return Err(ExecutionError::InsufficientBalance {
                required: amount,
                available,
            });
        }

        debug!(order_id = %order_id, amount = %amount, "Reserving balance");
        state.reservations.insert(
            order_id.clone(),
            Reservation {
                order_id: order_id.clone(),
                amount,
                created_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Rename a reservation after the venue assigns the real order ID.
    pub fn rename_reservation(&self, old: &OrderId, new: &OrderId) {
        let mut state = self.state.lock();
        if let Some(mut reservation) = state.reservations.remove(old) {
            reservation.order_id = new.clone();
            state.reservations.insert(new.clone(), reservation);
        }
    }

    /// Drop a reservation. No-op when absent.
    pub fn release_reservation(&self, order_id: &OrderId) {
        if self.state.lock().reservations.remove(order_id).is_some() {
            debug!(order_id = %order_id, "Reservation released");
        }
    }

    /// Shrink a reservation by the filled dollar amount; release entirely
    /// when the fill covers it. The filled portion is a position now, not a
    /// pending order.
    pub fn adjust_reservation_for_partial_fill(&self, order_id: &OrderId, filled_amount: Decimal) {
        let mut state = self.state.lock();
        let Some(reservation) = state.reservations.get_mut(order_id) else {
            // The order may have been released already.
            return;
        };
        if filled_amount >= reservation.amount {
            state.reservations.remove(order_id);
            debug!(order_id = %order_id, "Reservation fully consumed by fill");
        } else {
            reservation.amount -= filled_amount;
            debug!(
                order_id = %order_id,
                remaining = %reservation.amount,
                "Reservation reduced for partial fill"
            );
        }
    }

    /// Force a re-read of the venue balance, clearing the cache.
    pub async fn refresh_balance(&self) -> Decimal {
        {
            let mut state = self.state.lock();
            state.venue_balance = None;
            state.fetched_at = None;
        }
        self.fetch_balance().await
    }

    /// Drop reservations older than `max_age`; returns how many were
    /// cleared. Guards against leaks from orders that never resolved.
    pub fn clear_stale_reservations(&self, max_age: Duration) -> usize {
        let mut state = self.state.lock();
        let before = state.reservations.len();
        state
            .reservations
            .retain(|_, r| r.created_at.elapsed() <= max_age);
        let cleared = before - state.reservations.len();
        if cleared > 0 {
            info!(cleared, "Cleared stale reservations");
        }
        cleared
    }

    #[must_use]
    pub fn has_reservation(&self, order_id: &OrderId) -> bool {
        self.state.lock().reservations.contains_key(order_id)
    }

    #[must_use]
    pub fn get_reservation(&self, order_id: &OrderId) -> Option<Reservation> {
        self.state.lock().reservations.get(order_id).cloned()
    }

    #[must_use]
    pub fn reserved_total(&self) -> Decimal {
        self.state.lock().reserved_total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::venue::ScriptedVenue;
    use rust_decimal_macros::dec;

    fn manager(balance: Decimal) -> (BalanceManager, Arc<ScriptedVenue>) {
        let venue = Arc::new(ScriptedVenue::new(balance));
        let manager = BalanceManager::new(Some(venue.clone()), BalanceConfig::default());
        (manager, venue)
    }

    #[tokio::test]
    async fn fetches_and_caches_balance() {
        let (manager, venue) = manager(dec!(1000.00));
        assert_eq!(manager.get_available_balance().await, dec!(1000.00));
        assert_eq!(manager.get_available_balance().await, dec!(1000.00));
        assert_eq!(venue.balance_calls(), 1);
    }

    #[tokio::test]
    async fn returns_zero_without_venue() {
        let manager = BalanceManager::new(None, BalanceConfig::default());
        assert_eq!(manager.get_available_balance().await, dec!(0));
    }

    #[tokio::test]
    async fn reservations_reduce_available() {
        let (manager, _) = manager(dec!(1000.00));
        manager
            .reserve(&OrderId::new("order_pending"), dec!(19.00))
            .await
            .unwrap();
        assert_eq!(manager.get_available_balance().await, dec!(981.00));
    }

    #[tokio::test]
    async fn release_restores_available() {
        let (manager, _) = manager(dec!(1000.00));
        let id = OrderId::new("order_123");
        manager.reserve(&id, dec!(19.00)).await.unwrap();
        manager.release_reservation(&id);
        assert_eq!(manager.get_available_balance().await, dec!(1000.00));
    }

    #[tokio::test]
    async fn tracks_multiple_reservations() {
        let (manager, _) = manager(dec!(1000.00));
        manager.reserve(&OrderId::new("order_1"), dec!(100)).await.unwrap();
        manager.reserve(&OrderId::new("order_2"), dec!(200)).await.unwrap();
        manager.reserve(&OrderId::new("order_3"), dec!(50)).await.unwrap();
        assert_eq!(manager.get_available_balance().await, dec!(650.00));
    }

    #[tokio::test]
    async fn reservation_lookup() {
        let (manager, _) = manager(dec!(1000.00));
        let id = OrderId::new("order_123");
        manager.reserve(&id, dec!(19.00)).await.unwrap();

        assert!(manager.has_reservation(&id));
        assert!(!manager.has_reservation(&OrderId::new("order_nonexistent")));
        let reservation = manager.get_reservation(&id).unwrap();
        assert_eq!(reservation.amount, dec!(19.00));
    }

    #[tokio::test]
    async fn prevents_over_allocation() {
        let (manager, _) = manager(dec!(1000.00));
        let err = manager
            .reserve(&OrderId::new("big_order"), dec!(2000.00))
            .await
            .unwrap_err();
        match err {
            ExecutionError::InsufficientBalance { required, available } => {
                assert_eq!(required, dec!(2000.00));
                assert_eq!(available, dec!(1000.00));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn reserving_exact_available_succeeds_one_more_fails() {
        let (manager, _) = manager(dec!(1000.00));
        manager
            .reserve(&OrderId::new("order_all"), dec!(1000.00))
            .await
            .unwrap();
        let err = manager
            .reserve(&OrderId::new("order_more"), dec!(0.01))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::InsufficientBalance { .. }));
    }

    #[tokio::test]
    async fn reserve_is_idempotent_per_order() {
        let (manager, _) = manager(dec!(1000.00));
        let id = OrderId::new("order_1");
        manager.reserve(&id, dec!(100)).await.unwrap();
        manager.reserve(&id, dec!(100)).await.unwrap();
        assert_eq!(manager.reserved_total(), dec!(100));
    }

    #[tokio::test]
    async fn respects_minimum_reserve() {
        let venue = Arc::new(ScriptedVenue::new(dec!(1000.00)));
        let manager = BalanceManager::new(
            Some(venue),
            BalanceConfig {
                min_reserve: dec!(100.00),
                staleness: Duration::from_secs(30),
            },
        );
        assert_eq!(manager.get_tradeable_balance().await, dec!(900.00));

        manager.reserve(&OrderId::new("order_1"), dec!(200)).await.unwrap();
        assert_eq!(manager.get_tradeable_balance().await, dec!(700.00));
    }

    #[tokio::test]
    async fn refresh_fetches_new_balance() {
        let (manager, venue) = manager(dec!(1000.00));
        manager.get_available_balance().await;

        venue.set_balance(dec!(500.00));
        // Regular call uses the cache.
        assert_eq!(manager.get_available_balance().await, dec!(1000.00));
        // Forced refresh clears it.
        assert_eq!(manager.refresh_balance().await, dec!(500.00));
        assert_eq!(manager.get_available_balance().await, dec!(500.00));
    }

    #[tokio::test]
    async fn clears_stale_reservations() {
        let (manager, _) = manager(dec!(1000.00));
        manager.reserve(&OrderId::new("old_order"), dec!(100)).await.unwrap();

        let cleared = manager.clear_stale_reservations(Duration::ZERO);
        assert_eq!(cleared, 1);
        assert!(!manager.has_reservation(&OrderId::new("old_order")));

        manager.reserve(&OrderId::new("recent"), dec!(100)).await.unwrap();
        let cleared = manager.clear_stale_reservations(Duration::from_secs(3600));
        assert_eq!(cleared, 0);
        assert!(manager.has_reservation(&OrderId::new("recent")));
    }

    #[tokio::test]
    async fn partial_fill_reduces_reservation() {
        let (manager, _) = manager(dec!(1000.00));
        let id = OrderId::new("order_partial");
        manager.reserve(&id, dec!(100.00)).await.unwrap();

        manager.adjust_reservation_for_partial_fill(&id, dec!(40.00));
        assert_eq!(manager.get_reservation(&id).unwrap().amount, dec!(60.00));
    }

    #[tokio::test]
    async fn full_fill_releases_reservation() {
        let (manager, _) = manager(dec!(1000.00));
        let id = OrderId::new("order_full");
        manager.reserve(&id, dec!(100.00)).await.unwrap();

        manager.adjust_reservation_for_partial_fill(&id, dec!(100.00));
        assert!(!manager.has_reservation(&id));
    }

    #[tokio::test]
    async fn adjust_unknown_order_is_harmless() {
        let (manager, _) = manager(dec!(1000.00));
        manager.adjust_reservation_for_partial_fill(&OrderId::new("nonexistent"), dec!(50.00));
    }

    #[tokio::test]
    async fn multiple_partial_fills_consume_reservation() {
        let (manager, _) = manager(dec!(1000.00));
        let id = OrderId::new("order_multi");
        manager.reserve(&id, dec!(100.00)).await.unwrap();

        manager.adjust_reservation_for_partial_fill(&id, dec!(30.00));
        assert_eq!(manager.get_reservation(&id).unwrap().amount, dec!(70.00));

        manager.adjust_reservation_for_partial_fill(&id, dec!(40.00));
        assert_eq!(manager.get_reservation(&id).unwrap().amount, dec!(30.00));

        manager.adjust_reservation_for_partial_fill(&id, dec!(30.00));
        assert!(!manager.has_reservation(&id));
    }

    #[tokio::test]
    async fn partial_fill_increases_available_balance() {
        let (manager, _) = manager(dec!(1000.00));
        let id = OrderId::new("order_pf");
        manager.reserve(&id, dec!(100.00)).await.unwrap();

        let before = manager.get_available_balance().await;
        manager.adjust_reservation_for_partial_fill(&id, dec!(40.00));
        let after = manager.get_available_balance().await;
        assert_eq!(after, before + dec!(40.00));
    }
}
