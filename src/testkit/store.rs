//! In-memory store fakes.
//!
//! Behaviorally equivalent to the PostgreSQL repositories for everything
//! the services depend on, including single-winner semantics for atomic
//! trigger recording and GREATEST-style watermark monotonicity.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::core::domain::{
    Approval, ApprovalStatus, BookSnapshot, Candidate, CandidateStatus, ConditionId, ExitEvent,
    Market, MarketUniverse, Order, OrderId, Position, PositionId, PriceSnapshot, Tier,
    TierRequest, TokenId, TokenMeta, Trade, Trigger, WatchStatus, WatchlistEntry,
};
use crate::core::store::{
    ApprovalStore, CandidateStore, MarketDataStore, MarketStore, OrderStore, PositionStore,
    Stores, SyncRunStore, SyncRunSummary, TradeStore, TriggerStore, UniverseQuery, UniverseStore,
    WatchlistStore, WatermarkStore,
};
use crate::error::{Error, Result};

const SORT_FIELDS: &[&str] = &[
    "created_at",
    "updated_at",
    "price",
    "size",
    "filled_size",
    "status",
];

#[derive(Debug, Clone)]
struct SyncRunRecord {
    id: i64,
    #[allow(dead_code)]
    job: String,
    status: String,
}

#[derive(Default)]
struct Inner {
    trades: HashMap<(String, String), Trade>,
    watermarks: HashMap<(String, String), i64>,
    triggers: Vec<Trigger>,
    candidates: HashMap<(String, String, Decimal), Candidate>,
    orders: HashMap<String, Order>,
    positions: HashMap<String, Position>,
    exits: Vec<ExitEvent>,
    watchlist: HashMap<String, WatchlistEntry>,
    score_history: Vec<(String, f64)>,
    approvals: Vec<Approval>,
    markets: HashMap<String, Market>,
    universe: HashMap<String, MarketUniverse>,
    tier_requests: Vec<TierRequest>,
    snapshots: Vec<PriceSnapshot>,
    book_snapshots: Vec<BookSnapshot>,
    candle_points: Vec<(TokenId, Decimal)>,
    sync_runs: Vec<SyncRunRecord>,
    next_run_id: i64,
}

/// One in-memory backing store implementing every store trait.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

/// Handle that vends trait objects over one shared [`InMemoryStore`].
#[derive(Clone, Default)]
pub struct InMemoryStores {
    store: Arc<InMemoryStore>,
}

impl InMemoryStores {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn trades(&self) -> Arc<dyn TradeStore> {
        self.store.clone()
    }
    #[must_use]
    pub fn watermarks(&self) -> Arc<dyn WatermarkStore> {
        self.store.clone()
    }
    #[must_use]
    pub fn triggers(&self) -> Arc<dyn TriggerStore> {
        self.store.clone()
    }
    #[must_use]
    pub fn candidates(&self) -> Arc<dyn CandidateStore> {
        self.store.clone()
    }
    #[must_use]
    pub fn orders(&self) -> Arc<dyn OrderStore> {
        self.store.clone()
    }
    #[must_use]
    pub fn positions(&self) -> Arc<dyn PositionStore> {
        self.store.clone()
    }
    #[must_use]
    pub fn watchlist(&self) -> Arc<dyn WatchlistStore> {
        self.store.clone()
    }
    #[must_use]
    pub fn approvals(&self) -> Arc<dyn ApprovalStore> {
        self.store.clone()
    }
    #[must_use]
    pub fn markets(&self) -> Arc<dyn MarketStore> {
        self.store.clone()
    }
    #[must_use]
    pub fn universe(&self) -> Arc<dyn UniverseStore> {
        self.store.clone()
    }
    #[must_use]
    pub fn market_data(&self) -> Arc<dyn MarketDataStore> {
        self.store.clone()
    }
    #[must_use]
    pub fn sync_runs(&self) -> Arc<dyn SyncRunStore> {
        self.store.clone()
    }

    /// The full bundle, for wiring services the way production does.
    #[must_use]
    pub fn stores(&self) -> Stores {
        Stores {
            trades: self.trades(),
            watermarks: self.watermarks(),
            triggers: self.triggers(),
            candidates: self.candidates(),
            orders: self.orders(),
            positions: self.positions(),
            watchlist: self.watchlist(),
            approvals: self.approvals(),
            markets: self.markets(),
            universe: self.universe(),
            market_data: self.market_data(),
            sync_runs: self.sync_runs(),
        }
    }

    /// Number of stored first-trigger rows.
    #[must_use]
    pub fn trigger_count(&self) -> usize {
        self.store.inner.lock().triggers.len()
    }

    /// Number of stored trades.
    #[must_use]
    pub fn trade_count(&self) -> usize {
        self.store.inner.lock().trades.len()
    }

    /// Recorded sync-run statuses, in order.
    #[must_use]
    pub fn sync_run_statuses(&self) -> Vec<String> {
        self.store
            .inner
            .lock()
            .sync_runs
            .iter()
            .map(|r| r.status.clone())
            .collect()
    }

    /// Number of recorded book snapshots.
    #[must_use]
    pub fn book_snapshot_count(&self) -> usize {
        self.store.inner.lock().book_snapshots.len()
    }

    /// Number of candle datapoints recorded.
    #[must_use]
    pub fn candle_point_count(&self) -> usize {
        self.store.inner.lock().candle_points.len()
    }

    /// Score history rows for a token.
    #[must_use]
    pub fn score_history(&self, token_id: &TokenId) -> Vec<f64> {
        self.store
            .inner
            .lock()
            .score_history
            .iter()
            .filter(|(t, _)| t == token_id.as_str())
            .map(|(_, s)| *s)
            .collect()
    }
}

#[async_trait]
impl TradeStore for InMemoryStore {
    async fn upsert_trades(&self, trades: &[Trade]) -> Result<u64> {
        let mut inner = self.inner.lock();
        let mut inserted = 0;
        for trade in trades {
            let key = (
                trade.condition_id.as_str().to_string(),
                trade.trade_id.clone(),
            );
            if !inner.trades.contains_key(&key) {
                inner.trades.insert(key, trade.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn recent_by_condition(
        &self,
        condition_id: &ConditionId,
        limit: i64,
    ) -> Result<Vec<Trade>> {
        let inner = self.inner.lock();
        let mut trades: Vec<Trade> = inner
            .trades
            .values()
            .filter(|t| &t.condition_id == condition_id)
            .cloned()
            .collect();
        trades.sort_by_key(|t| std::cmp::Reverse(t.timestamp));
        trades.truncate(limit as usize);
        Ok(trades)
    }
}

#[async_trait]
impl WatermarkStore for InMemoryStore {
    async fn get(&self, stream: &str, key: &str) -> Result<i64> {
        Ok(*self
            .inner
            .lock()
            .watermarks
            .get(&(stream.to_string(), key.to_string()))
            .unwrap_or(&0))
    }

    async fn update(&self, stream: &str, key: &str, value: i64) -> Result<i64> {
        let mut inner = self.inner.lock();
        let entry = inner
            .watermarks
            .entry((stream.to_string(), key.to_string()))
            .or_insert(0);
        *entry = (*entry).max(value);
        Ok(*entry)
    }
}

#[async_trait]
impl TriggerStore for InMemoryStore {
    async fn try_record_atomic(&self, trigger: &Trigger) -> Result<bool> {
        // One mutex linearizes all contenders, mirroring the advisory lock.
        let mut inner = self.inner.lock();
        let exists = inner.triggers.iter().any(|t| {
            t.condition_id == trigger.condition_id
                && t.threshold.normalize() == trigger.threshold.normalize()
        });
        if exists {
            return Ok(false);
        }
        inner.triggers.push(trigger.clone());
        Ok(true)
    }

    async fn is_first_trigger(
        &self,
        token_id: &TokenId,
        condition_id: &ConditionId,
        threshold: Decimal,
    ) -> Result<bool> {
        let inner = self.inner.lock();
        Ok(!inner.triggers.iter().any(|t| {
            &t.token_id == token_id
                && &t.condition_id == condition_id
                && t.threshold.normalize() == threshold.normalize()
        }))
    }

    async fn has_condition_triggered(
        &self,
        condition_id: &ConditionId,
        threshold: Decimal,
    ) -> Result<bool> {
        let inner = self.inner.lock();
        Ok(inner.triggers.iter().any(|t| {
            &t.condition_id == condition_id && t.threshold.normalize() == threshold.normalize()
        }))
    }

    async fn get(
        &self,
        token_id: &TokenId,
        condition_id: &ConditionId,
        threshold: Decimal,
    ) -> Result<Option<Trigger>> {
        let inner = self.inner.lock();
        Ok(inner
            .triggers
            .iter()
            .find(|t| {
                &t.token_id == token_id
                    && &t.condition_id == condition_id
                    && t.threshold.normalize() == threshold.normalize()
            })
            .cloned())
    }

    async fn recent(
        &self,
        since: DateTime<Utc>,
        threshold: Option<Decimal>,
    ) -> Result<Vec<Trigger>> {
        let inner = self.inner.lock();
        Ok(inner
            .triggers
            .iter()
            .filter(|t| t.triggered_at >= since)
            .filter(|t| {
                threshold.map_or(true, |th| t.threshold.normalize() == th.normalize())
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CandidateStore for InMemoryStore {
    async fn upsert(&self, candidate: &Candidate) -> Result<()> {
        let key = (
            candidate.token_id.as_str().to_string(),
            candidate.condition_id.as_str().to_string(),
            candidate.threshold.normalize(),
        );
        self.inner.lock().candidates.insert(key, candidate.clone());
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<Candidate>> {
        Ok(self
            .inner
            .lock()
            .candidates
            .values()
            .filter(|c| c.status == CandidateStatus::Pending)
            .cloned()
            .collect())
    }

    async fn set_status(
        &self,
        token_id: &TokenId,
        condition_id: &ConditionId,
        threshold: Decimal,
        status: CandidateStatus,
        order_id: Option<&OrderId>,
    ) -> Result<()> {
        let key = (
            token_id.as_str().to_string(),
            condition_id.as_str().to_string(),
            threshold.normalize(),
        );
        if let Some(candidate) = self.inner.lock().candidates.get_mut(&key) {
            candidate.status = status;
            if let Some(order_id) = order_id {
                candidate.order_id = Some(order_id.clone());
            }
            candidate.decided_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn upsert(&self, order: &Order) -> Result<()> {
        self.inner
            .lock()
            .orders
            .insert(order.id.as_str().to_string(), order.clone());
        Ok(())
    }

    async fn replace_id(&self, old: &OrderId, new: &OrderId) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(mut order) = inner.orders.remove(old.as_str()) {
            order.id = new.clone();
            inner.orders.insert(new.as_str().to_string(), order);
        }
        Ok(())
    }

    async fn delete(&self, id: &OrderId) -> Result<()> {
        self.inner.lock().orders.remove(id.as_str());
        Ok(())
    }

    async fn get(&self, id: &OrderId) -> Result<Option<Order>> {
        Ok(self.inner.lock().orders.get(id.as_str()).cloned())
    }

    async fn open_orders(&self) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .inner
            .lock()
            .orders
            .values()
            .filter(|o| o.status.is_open())
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn list(&self, sort_by: &str, limit: i64) -> Result<Vec<Order>> {
        if !SORT_FIELDS.contains(&sort_by) {
            return Err(Error::invalid(
                "sort_by",
                format!("{sort_by:?} is not a sortable field"),
            ));
        }
        let mut orders: Vec<Order> = self.inner.lock().orders.values().cloned().collect();
        orders.sort_by_key(|o| std::cmp::Reverse(o.created_at));
        orders.truncate(limit as usize);
        Ok(orders)
    }
}

#[async_trait]
impl PositionStore for InMemoryStore {
    async fn upsert(&self, position: &Position) -> Result<()> {
        self.inner
            .lock()
            .positions
            .insert(position.id.as_str().to_string(), position.clone());
        Ok(())
    }

    async fn get(&self, id: &PositionId) -> Result<Option<Position>> {
        Ok(self.inner.lock().positions.get(id.as_str()).cloned())
    }

    async fn open_positions(&self) -> Result<Vec<Position>> {
        Ok(self
            .inner
            .lock()
            .positions
            .values()
            .filter(|p| p.is_open())
            .cloned()
            .collect())
    }

    async fn record_exit(&self, event: &ExitEvent) -> Result<()> {
        self.inner.lock().exits.push(event.clone());
        Ok(())
    }

    async fn exits_for(&self, position_id: &PositionId) -> Result<Vec<ExitEvent>> {
        Ok(self
            .inner
            .lock()
            .exits
            .iter()
            .filter(|e| &e.position_id == position_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl WatchlistStore for InMemoryStore {
    async fn upsert(&self, entry: &WatchlistEntry) -> Result<()> {
        self.inner
            .lock()
            .watchlist
            .insert(entry.token_id.as_str().to_string(), entry.clone());
        Ok(())
    }

    async fn get(&self, token_id: &TokenId) -> Result<Option<WatchlistEntry>> {
        Ok(self.inner.lock().watchlist.get(token_id.as_str()).cloned())
    }

    async fn active(&self) -> Result<Vec<WatchlistEntry>> {
        let mut entries: Vec<WatchlistEntry> = self
            .inner
            .lock()
            .watchlist
            .values()
            .filter(|e| e.status == WatchStatus::Watching)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    async fn update_score(
        &self,
        token_id: &TokenId,
        score: f64,
        time_to_end_hours: Option<f64>,
    ) -> Result<()> {
        if let Some(entry) = self.inner.lock().watchlist.get_mut(token_id.as_str()) {
            entry.current_score = score;
            if let Some(hours) = time_to_end_hours {
                entry.time_to_end_hours = hours;
            }
            entry.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_status(&self, token_id: &TokenId, status: WatchStatus) -> Result<()> {
        if let Some(entry) = self.inner.lock().watchlist.get_mut(token_id.as_str()) {
            entry.status = status;
            entry.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn append_score_history(&self, token_id: &TokenId, score: f64) -> Result<()> {
        self.inner
            .lock()
            .score_history
            .push((token_id.as_str().to_string(), score));
        Ok(())
    }

    async fn expire_ending(&self, min_hours: f64) -> Result<u64> {
        let mut inner = self.inner.lock();
        let mut expired = 0;
        for entry in inner.watchlist.values_mut() {
            if entry.status == WatchStatus::Watching && entry.time_to_end_hours <= min_hours {
                entry.status = WatchStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }
}

#[async_trait]
impl ApprovalStore for InMemoryStore {
    async fn create(&self, approval: &Approval) -> Result<()> {
        self.inner.lock().approvals.push(approval.clone());
        Ok(())
    }

    async fn pending_for(&self, token_id: &TokenId) -> Result<Option<Approval>> {
        let now = Utc::now();
        Ok(self
            .inner
            .lock()
            .approvals
            .iter()
            .filter(|a| {
                &a.token_id == token_id
                    && a.status == ApprovalStatus::Pending
                    && a.expires_at > now
            })
            .max_by_key(|a| a.created_at)
            .cloned())
    }

    async fn mark_executed(&self, token_id: &TokenId) -> Result<()> {
        for approval in self.inner.lock().approvals.iter_mut() {
            if &approval.token_id == token_id && approval.status == ApprovalStatus::Pending {
                approval.status = ApprovalStatus::Executed;
            }
        }
        Ok(())
    }

    async fn expire_stale(&self) -> Result<u64> {
        let now = Utc::now();
        let mut expired = 0;
        for approval in self.inner.lock().approvals.iter_mut() {
            if approval.status == ApprovalStatus::Pending && approval.expires_at <= now {
                approval.status = ApprovalStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }
}

#[async_trait]
impl MarketStore for InMemoryStore {
    async fn upsert_market(&self, market: &Market) -> Result<()> {
        self.inner
            .lock()
            .markets
            .insert(market.condition_id.as_str().to_string(), market.clone());
        Ok(())
    }

    async fn market(&self, condition_id: &ConditionId) -> Result<Option<Market>> {
        Ok(self.inner.lock().markets.get(condition_id.as_str()).cloned())
    }

    async fn token_meta(&self, token_id: &TokenId) -> Result<Option<TokenMeta>> {
        let inner = self.inner.lock();
        for market in inner.markets.values() {
            if let Some(token) = market.tokens.iter().find(|t| &t.token_id == token_id) {
                return Ok(Some(TokenMeta {
                    token_id: token.token_id.clone(),
                    condition_id: market.condition_id.clone(),
                    question: market.question.clone(),
                    outcome: token.outcome.clone(),
                    outcome_index: token.outcome_index,
                    category: market.category.clone(),
                    end_date: market.end_date,
                }));
            }
        }
        Ok(None)
    }

    async fn mark_resolved(
        &self,
        condition_id: &ConditionId,
        outcome: Option<&str>,
    ) -> Result<()> {
        if let Some(market) = self.inner.lock().markets.get_mut(condition_id.as_str()) {
            market.resolved = true;
            market.resolution_outcome = outcome.map(str::to_string);
        }
        Ok(())
    }
}

#[async_trait]
impl UniverseStore for InMemoryStore {
    async fn upsert_many(&self, rows: &[MarketUniverse]) -> Result<u64> {
        let mut inner = self.inner.lock();
        for row in rows {
            // Mirror the SQL upsert: tier state survives metric refreshes.
            let entry = inner
                .universe
                .entry(row.condition_id.as_str().to_string());
            match entry {
                std::collections::hash_map::Entry::Occupied(mut existing) => {
                    let current = existing.get_mut();
                    current.question = row.question.clone();
                    current.category = row.category.clone();
                    current.price = row.price;
                    current.volume_24h = row.volume_24h;
                    current.liquidity = row.liquidity;
                    current.trade_count_24h = row.trade_count_24h;
                    current.price_change_24h = row.price_change_24h;
                    current.price_change_1h = row.price_change_1h;
                    current.spread = row.spread;
                    current.days_to_end = row.days_to_end;
                    current.market_age_days = row.market_age_days;
                    current.outcome_count = row.outcome_count;
                    current.updated_at = Utc::now();
                }
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert(row.clone());
                }
            }
        }
        Ok(rows.len() as u64)
    }

    async fn by_tier(&self, tier: Tier) -> Result<Vec<MarketUniverse>> {
        let mut rows: Vec<MarketUniverse> = self
            .inner
            .lock()
            .universe
            .values()
            .filter(|m| m.tier == tier)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.interestingness_score
                .partial_cmp(&a.interestingness_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(rows)
    }

    async fn tier_counts(&self) -> Result<HashMap<i16, i64>> {
        let mut counts = HashMap::new();
        for m in self.inner.lock().universe.values() {
            *counts.entry(m.tier.as_i16()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn query(&self, query: &UniverseQuery) -> Result<Vec<MarketUniverse>> {
        let mut rows: Vec<MarketUniverse> = self
            .inner
            .lock()
            .universe
            .values()
            .filter(|m| query.tier.map_or(true, |t| m.tier == t))
            .filter(|m| {
                query
                    .min_interestingness
                    .map_or(true, |min| m.interestingness_score >= min)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.interestingness_score
                .partial_cmp(&a.interestingness_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if let Some(limit) = query.limit {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }

    async fn promote(
        &self,
        condition_id: &ConditionId,
        target: Tier,
        _reason: &str,
    ) -> Result<bool> {
        let mut inner = self.inner.lock();
        let Some(market) = inner.universe.get_mut(condition_id.as_str()) else {
            return Ok(false);
        };
        if market.tier >= target {
            return Ok(false);
        }
        market.tier = target;
        Ok(true)
    }

    async fn demote(&self, condition_id: &ConditionId, target: Tier) -> Result<bool> {
        let mut inner = self.inner.lock();
        let Some(market) = inner.universe.get_mut(condition_id.as_str()) else {
            return Ok(false);
        };
        if market.tier <= target {
            return Ok(false);
        }
        if market.pinned_tier.is_some_and(|p| p > target) {
            return Ok(false);
        }
        market.tier = target;
        Ok(true)
    }

    async fn update_scores(
        &self,
        scores: &[(ConditionId, f64)],
        low_score_threshold: f64,
    ) -> Result<u64> {
        let mut inner = self.inner.lock();
        let mut updated = 0;
        for (condition_id, score) in scores {
            if let Some(market) = inner.universe.get_mut(condition_id.as_str()) {
                market.interestingness_score = *score;
                if *score < low_score_threshold {
                    market
                        .score_below_threshold_since
                        .get_or_insert_with(Utc::now);
                } else {
                    market.score_below_threshold_since = None;
                }
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn record_strategy_signal(&self, condition_id: &ConditionId) -> Result<()> {
        if let Some(market) = self.inner.lock().universe.get_mut(condition_id.as_str()) {
            market.last_strategy_signal_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn active_tier_requests(&self) -> Result<Vec<TierRequest>> {
        let now = Utc::now();
        Ok(self
            .inner
            .lock()
            .tier_requests
            .iter()
            .filter(|r| r.expires_at > now)
            .cloned()
            .collect())
    }

    async fn create_tier_request(&self, request: &TierRequest) -> Result<()> {
        self.inner.lock().tier_requests.push(request.clone());
        Ok(())
    }

    async fn cleanup_expired_requests(&self) -> Result<u64> {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        let before = inner.tier_requests.len();
        inner.tier_requests.retain(|r| r.expires_at > now);
        Ok((before - inner.tier_requests.len()) as u64)
    }

    async fn insert_price_snapshots(&self, snapshots: &[PriceSnapshot]) -> Result<u64> {
        self.inner.lock().snapshots.extend_from_slice(snapshots);
        Ok(snapshots.len() as u64)
    }

    async fn snapshot_price_before(
        &self,
        condition_id: &ConditionId,
        seconds_ago: f64,
    ) -> Result<Option<f64>> {
        let cutoff = Utc::now() - Duration::milliseconds((seconds_ago * 1000.0) as i64);
        Ok(self
            .inner
            .lock()
            .snapshots
            .iter()
            .filter(|s| &s.condition_id == condition_id && s.captured_at <= cutoff)
            .max_by_key(|s| s.captured_at)
            .map(|s| s.price))
    }

    async fn top_by_volume(&self, limit: i64) -> Result<Vec<MarketUniverse>> {
        let mut rows: Vec<MarketUniverse> =
            self.inner.lock().universe.values().cloned().collect();
        rows.sort_by(|a, b| {
            b.volume_24h
                .partial_cmp(&a.volume_24h)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

#[async_trait]
impl MarketDataStore for InMemoryStore {
    async fn record_book_snapshot(&self, snapshot: &BookSnapshot) -> Result<()> {
        self.inner.lock().book_snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn upsert_candle(
        &self,
        token_id: &TokenId,
        price: Decimal,
        _size: Option<Decimal>,
        _at: DateTime<Utc>,
    ) -> Result<()> {
        self.inner
            .lock()
            .candle_points
            .push((token_id.clone(), price));
        Ok(())
    }
}

#[async_trait]
impl SyncRunStore for InMemoryStore {
    async fn record_start(&self, job: &str, _locked_by: &str) -> Result<i64> {
        let mut inner = self.inner.lock();
        inner.next_run_id += 1;
        let id = inner.next_run_id;
        inner.sync_runs.push(SyncRunRecord {
            id,
            job: job.to_string(),
            status: "running".to_string(),
        });
        Ok(id)
    }

    async fn record_success(&self, run_id: i64, _summary: &SyncRunSummary) -> Result<()> {
        if let Some(run) = self
            .inner
            .lock()
            .sync_runs
            .iter_mut()
            .find(|r| r.id == run_id)
        {
            run.status = "success".to_string();
        }
        Ok(())
    }

    async fn record_failure(&self, run_id: i64, _error: &str) -> Result<()> {
        if let Some(run) = self
            .inner
            .lock()
            .sync_runs
            .iter_mut()
            .find(|r| r.id == run_id)
        {
            run.status = "failed".to_string();
        }
        Ok(())
    }

    async fn record_skipped(&self, job: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.next_run_id += 1;
        let id = inner.next_run_id;
        inner.sync_runs.push(SyncRunRecord {
            id,
            job: job.to_string(),
            status: "skipped".to_string(),
        });
        Ok(())
    }
}
