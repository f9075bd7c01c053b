//! Watchlist: borderline triggers under periodic re-scoring.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::core::domain::{
    ConditionId, Promotion, TokenId, WatchStatus, WatchlistEntry,
};
use crate::core::store::WatchlistStore;
use crate::error::Result;

/// Watchlist thresholds.
#[derive(Debug, Clone)]
pub struct WatchlistConfig {
    /// Score at or above which an entry is promoted for execution.
    pub execution_threshold: f64,
    /// Entries falling below this score expire.
    pub min_score: f64,
}

impl Default for WatchlistConfig {
    fn default() -> Self {
        Self {
            execution_threshold: 0.97,
            min_score: 0.90,
        }
    }
}

/// Queues borderline-scoring triggers and re-scores them periodically.
pub struct WatchlistService {
    store: Arc<dyn WatchlistStore>,
    config: WatchlistConfig,
}

impl WatchlistService {
    #[must_use]
    pub fn new(store: Arc<dyn WatchlistStore>, config: WatchlistConfig) -> Self {
        Self { store, config }
    }

    /// Add (or refresh) a token on the watchlist.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_to_watchlist(
        &self,
        token_id: TokenId,
        condition_id: ConditionId,
        initial_score: f64,
        time_to_end_hours: f64,
        trigger_price: Option<Decimal>,
        question: impl Into<String>,
    ) -> Result<()> {
        let now = Utc::now();
        let entry = WatchlistEntry {
            token_id,
            condition_id,
            question: question.into(),
            trigger_price,
            initial_score,
            current_score: initial_score,
            time_to_end_hours,
            status: WatchStatus::Watching,
            created_at: now,
            updated_at: now,
        };
        debug!(token = %entry.token_id, score = initial_score, "Adding to watchlist");
        self.store.upsert(&entry).await
    }

    /// Project an entry's score at `now`.
    ///
    /// Grows monotonically as the market approaches its end (shrinking
    /// time-to-end means more certainty in a price that has held), capped
    /// at 1.0.
    #[must_use]
    pub fn project_score(entry: &WatchlistEntry, now: DateTime<Utc>) -> f64 {
        let elapsed_hours = (now - entry.updated_at).num_minutes() as f64 / 60.0;
        let remaining = (entry.time_to_end_hours - elapsed_hours).max(0.0);
        // Approaches 1 as remaining approaches 0; ~0 for far-out markets.
        let proximity = 1.0 / (1.0 + remaining / 24.0);
        (entry.initial_score + (1.0 - entry.initial_score) * proximity).min(1.0)
    }

    /// Re-score all watching entries; returns promotions for the caller to
    /// act on.
    pub async fn rescore_all(&self, now: DateTime<Utc>) -> Result<Vec<Promotion>> {
        let entries = self.store.active().await?;
        let mut promotions = Vec::new();

        for entry in entries {
            let elapsed_hours = (now - entry.updated_at).num_minutes() as f64 / 60.0;
            let remaining = (entry.time_to_end_hours - elapsed_hours).max(0.0);
            let score = Self::project_score(&entry, now);

            self.store
                .update_score(&entry.token_id, score, Some(remaining))
                .await?;
            self.store.append_score_history(&entry.token_id, score).await?;

            if score >= self.config.execution_threshold {
                info!(
                    token = %entry.token_id,
                    score,
                    "Watchlist entry promoted for execution"
                );
                self.store
                    .set_status(&entry.token_id, WatchStatus::Promoted)
                    .await?;
                promotions.push(Promotion {
                    token_id: entry.token_id.clone(),
                    condition_id: entry.condition_id.clone(),
                    score,
                    trigger_price: entry.trigger_price,
                    question: entry.question.clone(),
                });
            } else if score < self.config.min_score {
                debug!(token = %entry.token_id, score, "Watchlist entry expired on low score");
                self.store
                    .set_status(&entry.token_id, WatchStatus::Expired)
                    .await?;
            }
        }

        Ok(promotions)
    }

    /// Expire entries whose market closes within `min_hours`.
    pub async fn remove_expired(&self, min_hours: f64) -> Result<u64> {
        let expired = self.store.expire_ending(min_hours).await?;
        if expired > 0 {
            info!(expired, "Expired watchlist entries near market close");
        }
        Ok(expired)
    }

    pub async fn get_entry(&self, token_id: &TokenId) -> Result<Option<WatchlistEntry>> {
        self.store.get(token_id).await
    }

    pub async fn active_entries(&self) -> Result<Vec<WatchlistEntry>> {
        self.store.active().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::store::InMemoryStores;
    use rust_decimal_macros::dec;

    fn service(stores: &InMemoryStores) -> WatchlistService {
        WatchlistService::new(stores.watchlist(), WatchlistConfig::default())
    }

    async fn add(service: &WatchlistService, token: &str, score: f64, hours: f64) {
        service
            .add_to_watchlist(
                TokenId::from(token),
                ConditionId::from("0x123"),
                score,
                hours,
                Some(dec!(0.95)),
                "Will BTC hit $100k?",
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn adds_and_retrieves_entry() {
        let stores = InMemoryStores::new();
        let service = service(&stores);
        add(&service, "tok_abc", 0.92, 720.0).await;

        let entry = service.get_entry(&TokenId::from("tok_abc")).await.unwrap().unwrap();
        assert_eq!(entry.status, WatchStatus::Watching);
        assert_eq!(entry.initial_score, 0.92);
        assert_eq!(entry.trigger_price, Some(dec!(0.95)));
        assert_eq!(entry.question, "Will BTC hit $100k?");
    }

    #[tokio::test]
    async fn upserts_on_repeat_add() {
        let stores = InMemoryStores::new();
        let service = service(&stores);
        add(&service, "tok_abc", 0.92, 720.0).await;
        add(&service, "tok_abc", 0.94, 700.0).await;

        let entry = service.get_entry(&TokenId::from("tok_abc")).await.unwrap().unwrap();
        assert_eq!(entry.initial_score, 0.94);
        assert_eq!(service.active_entries().await.unwrap().len(), 1);
    }

    #[test]
    fn score_grows_as_market_approaches_end() {
        let now = Utc::now();
        let entry = WatchlistEntry {
            token_id: TokenId::from("tok"),
            condition_id: ConditionId::from("0xC"),
            question: String::new(),
            trigger_price: None,
            initial_score: 0.92,
            current_score: 0.92,
            time_to_end_hours: 720.0,
            status: WatchStatus::Watching,
            created_at: now,
            updated_at: now,
        };

        let far = WatchlistService::project_score(&entry, now);

        let mut near = entry.clone();
        near.time_to_end_hours = 2.0;
        let close = WatchlistService::project_score(&near, now);

        assert!(close > far);
        assert!(close <= 1.0);

        let mut at_end = entry;
        at_end.time_to_end_hours = 0.0;
        assert_eq!(WatchlistService::project_score(&at_end, now), 1.0);
    }

    #[tokio::test]
    async fn promotes_entries_crossing_execution_threshold() {
        let stores = InMemoryStores::new();
        let service = service(&stores);
        // Near the market end, a 0.92 initial score projects above 0.97.
        add(&service, "tok_hot", 0.92, 1.0).await;

        let promotions = service.rescore_all(Utc::now()).await.unwrap();
        assert_eq!(promotions.len(), 1);
        assert_eq!(promotions[0].token_id.as_str(), "tok_hot");

        let entry = service.get_entry(&TokenId::from("tok_hot")).await.unwrap().unwrap();
        assert_eq!(entry.status, WatchStatus::Promoted);
    }

    #[tokio::test]
    async fn expires_entries_below_min_score() {
        let stores = InMemoryStores::new();
        let service = service(&stores);
        // Far-out market with a score already below the floor stays below it.
        add(&service, "tok_cold", 0.85, 720.0).await;

        let promotions = service.rescore_all(Utc::now()).await.unwrap();
        assert!(promotions.is_empty());

        let entry = service.get_entry(&TokenId::from("tok_cold")).await.unwrap().unwrap();
        assert_eq!(entry.status, WatchStatus::Expired);
    }

    #[tokio::test]
    async fn borderline_entry_keeps_watching() {
        let stores = InMemoryStores::new();
        let service = service(&stores);
        add(&service, "tok_mid", 0.93, 240.0).await;

        service.rescore_all(Utc::now()).await.unwrap();

        let entry = service.get_entry(&TokenId::from("tok_mid")).await.unwrap().unwrap();
        assert_eq!(entry.status, WatchStatus::Watching);
        assert!(entry.current_score >= 0.93);
        assert!(entry.current_score < 0.97);
    }

    #[tokio::test]
    async fn remove_expired_marks_near_close_entries() {
        let stores = InMemoryStores::new();
        let service = service(&stores);
        add(&service, "tok_ending", 0.93, 3.0).await;
        add(&service, "tok_far", 0.93, 720.0).await;

        let expired = service.remove_expired(6.0).await.unwrap();
        assert_eq!(expired, 1);

        let entry = service.get_entry(&TokenId::from("tok_ending")).await.unwrap().unwrap();
        assert_eq!(entry.status, WatchStatus::Expired);
        let entry = service.get_entry(&TokenId::from("tok_far")).await.unwrap().unwrap();
        assert_eq!(entry.status, WatchStatus::Watching);
    }
}
