//! Market tier promotion and demotion.
//!
//! Tier 1 holds every known market (metadata only), tier 2 adds price
//! candles, tier 3 adds full order book capture. Promotions are
//! deterministic (by score), capacity-bounded, and hysteretic: promotion
//! thresholds sit above demotion thresholds so markets do not churn.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info};

use crate::core::domain::{
    compute_interestingness, ConditionId, MarketMetrics, MarketUniverse, Tier, TierRequest,
};
use crate::core::store::{OrderStore, PositionStore, UniverseQuery, UniverseStore};
use crate::error::Result;

/// Capacity limits per tier.
#[derive(Debug, Clone)]
pub struct TierLimits {
    pub tier_2_max: usize,
    pub tier_3_max: usize,
}

impl Default for TierLimits {
    fn default() -> Self {
        Self {
            tier_2_max: 2_000,
            tier_3_max: 300,
        }
    }
}

/// Score thresholds for tier transitions.
#[derive(Debug, Clone)]
pub struct TierThresholds {
    pub promote_to_tier_2_score: f64,
    pub promote_to_tier_3_score: f64,
    pub demote_from_tier_3_score: f64,
    pub demote_from_tier_2_score: f64,
    pub tier_3_inactivity_hours: i64,
    pub tier_2_low_score_days: i64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            promote_to_tier_2_score: 40.0,
            promote_to_tier_3_score: 80.0,
            demote_from_tier_3_score: 60.0,
            demote_from_tier_2_score: 20.0,
            tier_3_inactivity_hours: 24,
            tier_2_low_score_days: 7,
        }
    }
}

/// Statistics from one promotion cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierStats {
    pub promoted_to_tier_2: usize,
    pub promoted_to_tier_3: usize,
    pub demoted_to_tier_2: usize,
    pub demoted_to_tier_1: usize,
    pub requests_processed: usize,
}

/// Runs the tier promotion/demotion cycle.
pub struct TierManager {
    universe: Arc<dyn UniverseStore>,
    positions: Arc<dyn PositionStore>,
    orders: Arc<dyn OrderStore>,
    limits: TierLimits,
    thresholds: TierThresholds,
}

impl TierManager {
    #[must_use]
    pub fn new(
        universe: Arc<dyn UniverseStore>,
        positions: Arc<dyn PositionStore>,
        orders: Arc<dyn OrderStore>,
        limits: TierLimits,
        thresholds: TierThresholds,
    ) -> Self {
        Self {
            universe,
            positions,
            orders,
            limits,
            thresholds,
        }
    }

    /// Run a full promotion/demotion cycle.
    pub async fn run_promotion_cycle(&self) -> Result<TierStats> {
        let mut stats = TierStats::default();

        stats.requests_processed = self.process_tier_requests().await?;
        stats.promoted_to_tier_2 = self.promote_to_tier_2().await?;
        stats.promoted_to_tier_3 = self.promote_to_tier_3().await?;
        stats.demoted_to_tier_2 = self.demote_from_tier_3().await?;
        stats.demoted_to_tier_1 = self.demote_from_tier_2().await?;
        self.universe.cleanup_expired_requests().await?;

        info!(
            to_tier_2 = stats.promoted_to_tier_2,
            to_tier_3 = stats.promoted_to_tier_3,
            from_tier_3 = stats.demoted_to_tier_2,
            from_tier_2 = stats.demoted_to_tier_1,
            requests = stats.requests_processed,
            "Tier cycle complete"
        );
        Ok(stats)
    }

    /// File a strategy request to promote a market, with a TTL so stale
    /// requests cannot promote later.
    pub async fn request_tier(
        &self,
        strategy_name: &str,
        condition_id: ConditionId,
        tier: Tier,
        reason: &str,
        ttl_hours: i64,
    ) -> Result<()> {
        let now = Utc::now();
        let request = TierRequest {
            strategy_name: strategy_name.to_string(),
            condition_id,
            requested_tier: tier,
            reason: reason.to_string(),
            requested_at: now,
            expires_at: now + Duration::hours(ttl_hours),
        };
        debug!(
            strategy = strategy_name,
            condition = %request.condition_id,
            tier = %tier,
            "Tier request filed"
        );
        self.universe.create_tier_request(&request).await
    }

    /// Recompute interestingness for a batch of markets.
    pub async fn update_scores_for_markets(&self, markets: &[MarketUniverse]) -> Result<u64> {
        let scores: Vec<(ConditionId, f64)> = markets
            .iter()
            .map(|m| {
                let metrics = MarketMetrics::from(m);
                (m.condition_id.clone(), compute_interestingness(&metrics))
            })
            .collect();
        self.universe
            .update_scores(&scores, self.thresholds.demote_from_tier_2_score)
            .await
    }

    /// Process outstanding requests, highest tier first, within capacity.
    async fn process_tier_requests(&self) -> Result<usize> {
        let mut requests = self.universe.active_tier_requests().await?;
        let counts = self.universe.tier_counts().await?;

        let mut tier_2_available = self
            .limits
            .tier_2_max
            .saturating_sub(*counts.get(&2).unwrap_or(&0) as usize);
        let mut tier_3_available = self
            .limits
            .tier_3_max
            .saturating_sub(*counts.get(&3).unwrap_or(&0) as usize);

        requests.sort_by_key(|r| std::cmp::Reverse(r.requested_tier));

        let mut processed = 0;
        for request in requests {
            match request.requested_tier {
                Tier::Three if tier_3_available == 0 => continue,
                Tier::Two if tier_2_available == 0 => continue,
                _ => {}
            }

            let reason = format!("Strategy request: {}", request.reason);
            let promoted = self
                .universe
                .promote(&request.condition_id, request.requested_tier, &reason)
                .await?;
            if promoted {
                processed += 1;
                match request.requested_tier {
                    Tier::Three => tier_3_available -= 1,
                    Tier::Two => tier_2_available -= 1,
                    Tier::One => {}
                }
            }
        }
        Ok(processed)
    }

    async fn promote_to_tier_2(&self) -> Result<usize> {
        let counts = self.universe.tier_counts().await?;
        let available = self
            .limits
            .tier_2_max
            .saturating_sub(*counts.get(&2).unwrap_or(&0) as usize);
        if available == 0 {
            return Ok(0);
        }

        let candidates = self
            .universe
            .query(&UniverseQuery {
                tier: Some(Tier::One),
                min_interestingness: Some(self.thresholds.promote_to_tier_2_score),
                limit: Some(available as i64),
            })
            .await?;

        let mut promoted = 0;
        for market in candidates {
            let reason = format!(
                "Score {:.1} >= {}",
                market.interestingness_score, self.thresholds.promote_to_tier_2_score
            );
            if self
                .universe
                .promote(&market.condition_id, Tier::Two, &reason)
                .await?
            {
                promoted += 1;
            }
        }
        Ok(promoted)
    }

    async fn promote_to_tier_3(&self) -> Result<usize> {
        let counts = self.universe.tier_counts().await?;
        let mut available = self
            .limits
            .tier_3_max
            .saturating_sub(*counts.get(&3).unwrap_or(&0) as usize);
        if available == 0 {
            return Ok(0);
        }

        // Markets with an open position or order must be tier 3.
        let must_promote = self.engaged_conditions().await?;
        let mut promoted = 0;

        for condition_id in &must_promote {
            if available == 0 {
                break;
            }
            if self
                .universe
                .promote(condition_id, Tier::Three, "Has open position or order")
                .await?
            {
                promoted += 1;
                available -= 1;
            }
        }

        if available == 0 {
            return Ok(promoted);
        }

        let candidates = self
            .universe
            .query(&UniverseQuery {
                tier: Some(Tier::Two),
                min_interestingness: Some(self.thresholds.promote_to_tier_3_score),
                limit: Some(available as i64),
            })
            .await?;

        for market in candidates {
            if must_promote.contains(&market.condition_id) {
                continue;
            }
            let reason = format!(
                "Score {:.1} >= {}",
                market.interestingness_score, self.thresholds.promote_to_tier_3_score
            );
            if self
                .universe
                .promote(&market.condition_id, Tier::Three, &reason)
                .await?
            {
                promoted += 1;
            }
        }
        Ok(promoted)
    }

    async fn demote_from_tier_3(&self) -> Result<usize> {
        let protected = self.engaged_conditions().await?;
        let markets = self.universe.by_tier(Tier::Three).await?;
        let inactivity_cutoff =
            Utc::now() - Duration::hours(self.thresholds.tier_3_inactivity_hours);

        let mut demoted = 0;
        for market in markets {
            if protected.contains(&market.condition_id) {
                continue;
            }
            if market.pinned_tier.is_some_and(|p| p >= Tier::Three) {
                continue;
            }
            if market
                .last_strategy_signal_at
                .is_some_and(|at| at >= inactivity_cutoff)
            {
                continue;
            }
            if market.interestingness_score >= self.thresholds.demote_from_tier_3_score {
                continue;
            }
            if self.universe.demote(&market.condition_id, Tier::Two).await? {
                demoted += 1;
            }
        }
        Ok(demoted)
    }

    async fn demote_from_tier_2(&self) -> Result<usize> {
        let markets = self.universe.by_tier(Tier::Two).await?;
        let low_score_cutoff = Utc::now() - Duration::days(self.thresholds.tier_2_low_score_days);

        let mut demoted = 0;
        for market in markets {
            if market.pinned_tier.is_some_and(|p| p >= Tier::Two) {
                continue;
            }
            if market.interestingness_score >= self.thresholds.demote_from_tier_2_score {
                continue;
            }
            // The low score must have been sustained for the full window.
            let Some(since) = market.score_below_threshold_since else {
                continue;
            };
            if since > low_score_cutoff {
                continue;
            }
            if self.universe.demote(&market.condition_id, Tier::One).await? {
                demoted += 1;
            }
        }
        Ok(demoted)
    }

    /// Conditions with an open position or a non-terminal order.
    async fn engaged_conditions(&self) -> Result<HashSet<ConditionId>> {
        let mut engaged = HashSet::new();
        for position in self.positions.open_positions().await? {
            engaged.insert(position.condition_id);
        }
        for order in self.orders.open_orders().await? {
            engaged.insert(order.condition_id);
        }
        Ok(engaged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{OrderId, Position, Side, TokenId};
    use crate::core::store::Stores;
    use crate::testkit::store::InMemoryStores;
    use rust_decimal_macros::dec;

    fn manager(stores: &Stores, limits: TierLimits) -> TierManager {
        TierManager::new(
            stores.universe.clone(),
            stores.positions.clone(),
            stores.orders.clone(),
            limits,
            TierThresholds::default(),
        )
    }

    fn universe_row(condition: &str, tier: Tier, score: f64) -> MarketUniverse {
        MarketUniverse {
            condition_id: ConditionId::from(condition),
            question: format!("{condition}?"),
            category: None,
            tier,
            interestingness_score: score,
            pinned_tier: None,
            last_strategy_signal_at: None,
            score_below_threshold_since: None,
            price: Some(0.5),
            volume_24h: 1_000.0,
            liquidity: 500.0,
            trade_count_24h: 10,
            price_change_24h: 0.0,
            price_change_1h: 0.0,
            spread: Some(0.01),
            days_to_end: Some(30.0),
            market_age_days: Some(30.0),
            outcome_count: 2,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn promotes_high_scores_to_tier_2() {
        let mem = InMemoryStores::new();
        let stores = mem.stores();
        stores
            .universe
            .upsert_many(&[
                universe_row("0xhigh", Tier::One, 55.0),
                universe_row("0xlow", Tier::One, 10.0),
            ])
            .await
            .unwrap();

        let stats = manager(&stores, TierLimits::default())
            .run_promotion_cycle()
            .await
            .unwrap();
        assert_eq!(stats.promoted_to_tier_2, 1);

        let tier_2 = stores.universe.by_tier(Tier::Two).await.unwrap();
        assert_eq!(tier_2.len(), 1);
        assert_eq!(tier_2[0].condition_id.as_str(), "0xhigh");
    }

    #[tokio::test]
    async fn respects_tier_2_capacity() {
        let mem = InMemoryStores::new();
        let stores = mem.stores();
        stores
            .universe
            .upsert_many(&[
                universe_row("0xa", Tier::One, 90.0),
                universe_row("0xb", Tier::One, 85.0),
                universe_row("0xc", Tier::One, 80.0),
            ])
            .await
            .unwrap();

        let limits = TierLimits {
            tier_2_max: 2,
            tier_3_max: 300,
        };
        let stats = manager(&stores, limits).run_promotion_cycle().await.unwrap();
        assert_eq!(stats.promoted_to_tier_2, 2);
    }

    #[tokio::test]
    async fn markets_with_positions_are_forced_to_tier_3() {
        let mem = InMemoryStores::new();
        let stores = mem.stores();
        stores
            .universe
            .upsert_many(&[universe_row("0xheld", Tier::Two, 5.0)])
            .await
            .unwrap();
        stores
            .positions
            .upsert(&Position::open(
                TokenId::from("tok"),
                ConditionId::from("0xheld"),
                dec!(10),
                dec!(0.95),
                Utc::now(),
            ))
            .await
            .unwrap();

        let stats = manager(&stores, TierLimits::default())
            .run_promotion_cycle()
            .await
            .unwrap();
        assert_eq!(stats.promoted_to_tier_3, 1);

        let tier_3 = stores.universe.by_tier(Tier::Three).await.unwrap();
        assert_eq!(tier_3[0].condition_id.as_str(), "0xheld");
    }

    #[tokio::test]
    async fn demotes_inactive_low_score_tier_3() {
        let mem = InMemoryStores::new();
        let stores = mem.stores();
        let mut row = universe_row("0xstale", Tier::Three, 10.0);
        row.last_strategy_signal_at = Some(Utc::now() - Duration::hours(48));
        stores.universe.upsert_many(&[row]).await.unwrap();

        let stats = manager(&stores, TierLimits::default())
            .run_promotion_cycle()
            .await
            .unwrap();
        assert_eq!(stats.demoted_to_tier_2, 1);
    }

    #[tokio::test]
    async fn recent_signal_protects_tier_3() {
        let mem = InMemoryStores::new();
        let stores = mem.stores();
        let mut row = universe_row("0xactive", Tier::Three, 10.0);
        row.last_strategy_signal_at = Some(Utc::now() - Duration::hours(1));
        stores.universe.upsert_many(&[row]).await.unwrap();

        let stats = manager(&stores, TierLimits::default())
            .run_promotion_cycle()
            .await
            .unwrap();
        assert_eq!(stats.demoted_to_tier_2, 0);
    }

    #[tokio::test]
    async fn hysteresis_keeps_mid_score_tier_3() {
        // Score 70 is below promotion (80) but above demotion (60):
        // the market stays where it is.
        let mem = InMemoryStores::new();
        let stores = mem.stores();
        let mut row = universe_row("0xmid", Tier::Three, 70.0);
        row.last_strategy_signal_at = Some(Utc::now() - Duration::hours(48));
        stores.universe.upsert_many(&[row]).await.unwrap();

        let stats = manager(&stores, TierLimits::default())
            .run_promotion_cycle()
            .await
            .unwrap();
        assert_eq!(stats.demoted_to_tier_2, 0);
    }

    #[tokio::test]
    async fn pinned_markets_cannot_be_demoted() {
        let mem = InMemoryStores::new();
        let stores = mem.stores();
        let mut row = universe_row("0xpinned", Tier::Three, 1.0);
        row.pinned_tier = Some(Tier::Three);
        row.last_strategy_signal_at = Some(Utc::now() - Duration::hours(100));
        stores.universe.upsert_many(&[row]).await.unwrap();

        let stats = manager(&stores, TierLimits::default())
            .run_promotion_cycle()
            .await
            .unwrap();
        assert_eq!(stats.demoted_to_tier_2, 0);
    }

    #[tokio::test]
    async fn demotes_sustained_low_score_tier_2() {
        let mem = InMemoryStores::new();
        let stores = mem.stores();
        let mut row = universe_row("0xfading", Tier::Two, 5.0);
        row.score_below_threshold_since = Some(Utc::now() - Duration::days(10));
        stores.universe.upsert_many(&[row]).await.unwrap();

        let stats = manager(&stores, TierLimits::default())
            .run_promotion_cycle()
            .await
            .unwrap();
        assert_eq!(stats.demoted_to_tier_1, 1);
    }

    #[tokio::test]
    async fn recent_low_score_is_not_demoted_from_tier_2() {
        let mem = InMemoryStores::new();
        let stores = mem.stores();
        let mut row = universe_row("0xdip", Tier::Two, 5.0);
        row.score_below_threshold_since = Some(Utc::now() - Duration::days(2));
        stores.universe.upsert_many(&[row]).await.unwrap();

        let stats = manager(&stores, TierLimits::default())
            .run_promotion_cycle()
            .await
            .unwrap();
        assert_eq!(stats.demoted_to_tier_1, 0);
    }

    #[tokio::test]
    async fn tier_requests_processed_highest_first_with_capacity() {
        let mem = InMemoryStores::new();
        let stores = mem.stores();
        // Mid scores: high enough to survive the demotion passes that run
        // later in the same cycle, low enough not to self-promote.
        stores
            .universe
            .upsert_many(&[
                universe_row("0xreq2", Tier::One, 0.0),
                universe_row("0xreq3", Tier::One, 70.0),
            ])
            .await
            .unwrap();

        let mgr = manager(&stores, TierLimits::default());
        mgr.request_tier("highprob", ConditionId::from("0xreq2"), Tier::Two, "test", 1)
            .await
            .unwrap();
        mgr.request_tier("highprob", ConditionId::from("0xreq3"), Tier::Three, "test", 1)
            .await
            .unwrap();

        let stats = mgr.run_promotion_cycle().await.unwrap();
        assert_eq!(stats.requests_processed, 2);

        assert_eq!(stores.universe.by_tier(Tier::Three).await.unwrap().len(), 1);
        assert_eq!(stores.universe.by_tier(Tier::Two).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn score_updates_track_below_threshold_window() {
        let mem = InMemoryStores::new();
        let stores = mem.stores();
        let mut row = universe_row("0xscored", Tier::Two, 50.0);
        row.volume_24h = 500_000.0;
        row.price_change_24h = 0.2;
        stores.universe.upsert_many(&[row.clone()]).await.unwrap();

        let mgr = manager(&stores, TierLimits::default());
        let updated = mgr.update_scores_for_markets(&[row]).await.unwrap();
        assert_eq!(updated, 1);

        let stored = &stores.universe.by_tier(Tier::Two).await.unwrap()[0];
        // Heavy volume and movement score well above the low-score floor.
        assert!(stored.interestingness_score > 20.0);
        assert!(stored.score_below_threshold_since.is_none());
    }

    #[tokio::test]
    async fn open_orders_protect_from_demotion() {
        let mem = InMemoryStores::new();
        let stores = mem.stores();
        let mut row = universe_row("0xordered", Tier::Three, 1.0);
        row.last_strategy_signal_at = Some(Utc::now() - Duration::hours(100));
        stores.universe.upsert_many(&[row]).await.unwrap();

        let order = crate::testkit::domain::order(
            OrderId::new("order_1"),
            "tok",
            "0xordered",
            Side::Buy,
            dec!(0.95),
            dec!(10),
        );
        stores.orders.upsert(&order).await.unwrap();

        let stats = manager(&stores, TierLimits::default())
            .run_promotion_cycle()
            .await
            .unwrap();
        assert_eq!(stats.demoted_to_tier_2, 0);
    }
}
