//! Universe fetcher: paginates the full set of known markets.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use tracing::{debug, info, warn};

use super::response::ApiMarket;
use crate::core::domain::{
    ConditionId, Market, MarketUniverse, OutcomeToken, Tier, TokenId,
};
use crate::error::Result;

/// A market plus its universe scoring record, as fetched.
#[derive(Debug, Clone)]
pub struct FetchedMarket {
    pub market: Market,
    pub universe: MarketUniverse,
}

/// Source of the complete market catalog.
#[async_trait]
pub trait MarketCatalog: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<FetchedMarket>>;
}

/// Paginated metadata-API fetcher with a minimum inter-page delay to
/// respect venue rate limits.
pub struct UniverseFetcher {
    http: Client,
    gamma_url: String,
    page_limit: u32,
    page_delay: Duration,
}

impl UniverseFetcher {
    pub fn new(
        gamma_url: impl Into<String>,
        timeout: Duration,
        page_limit: u32,
        page_delay: Duration,
    ) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            gamma_url: gamma_url.into(),
            page_limit,
            page_delay,
        })
    }

    fn to_fetched(&self, api: ApiMarket) -> Option<FetchedMarket> {
        if api.condition_id.is_empty() {
            return None;
        }
        let now = Utc::now();
        let condition_id = ConditionId::from(api.condition_id.clone());
        let question = api.question.clone().unwrap_or_default();
        let end_date = api.end_date_utc();

        let token_ids = api.token_ids();
        let outcomes = api.outcome_labels();
        let prices = api.prices();
        let tokens: Vec<OutcomeToken> = token_ids
            .iter()
            .enumerate()
            .map(|(i, id)| OutcomeToken {
                token_id: TokenId::from(id.as_str()),
                outcome: outcomes.get(i).cloned().unwrap_or_default(),
                outcome_index: i as i32,
                price: prices.get(i).copied().flatten(),
            })
            .collect();

        let market = Market {
            condition_id: condition_id.clone(),
            question: question.clone(),
            category: api.category.clone(),
            end_date,
            resolved: api.closed.unwrap_or(false),
            resolution_outcome: None,
            tokens,
            volume_24h: api.volume_f64(),
            liquidity: api.liquidity_f64(),
        };

        let primary_price = market
            .tokens
            .first()
            .and_then(|t| t.price)
            .and_then(|p| p.to_f64());
        let days_to_end = end_date.map(|end| (end - now).num_minutes() as f64 / (60.0 * 24.0));
        let market_age_days = api
            .start_date
            .as_deref()
            .and_then(|s| {
                super::response::timestamp_from_value(&serde_json::Value::String(s.to_string()))
            })
            .map(|start| (now - start).num_minutes() as f64 / (60.0 * 24.0));

        let universe = MarketUniverse {
            condition_id,
            question,
            category: api.category.clone(),
            tier: Tier::One,
            interestingness_score: 0.0,
            pinned_tier: None,
            last_strategy_signal_at: None,
            score_below_threshold_since: None,
            price: primary_price,
            volume_24h: api.volume_f64().unwrap_or(0.0),
            liquidity: api.liquidity_f64().unwrap_or(0.0),
            trade_count_24h: 0,
            price_change_24h: 0.0,
            price_change_1h: 0.0,
            spread: api.spread(),
            days_to_end,
            market_age_days,
            outcome_count: market.tokens.len().max(2) as i32,
            updated_at: now,
        };

        Some(FetchedMarket { market, universe })
    }
}

#[async_trait]
impl MarketCatalog for UniverseFetcher {
    async fn fetch_all(&self) -> Result<Vec<FetchedMarket>> {
        let mut all = Vec::new();
        let mut offset = 0u32;

        loop {
            let url = format!("{}/markets", self.gamma_url);
            let response = self
                .http
                .get(&url)
                .query(&[
                    ("limit", self.page_limit.to_string()),
                    ("offset", offset.to_string()),
                    ("closed", "false".to_string()),
                ])
                .send()
                .await?
                .error_for_status()?;

            // The metadata API returns a bare array of markets.
            let page: Vec<ApiMarket> = match response.json().await {
                Ok(page) => page,
                Err(e) => {
                    warn!(offset, error = %e, "Failed to parse markets page");
                    break;
                }
            };

            let fetched = page.len();
            debug!(offset, fetched, "Fetched universe page");
            all.extend(page.into_iter().filter_map(|m| self.to_fetched(m)));

            if fetched < self.page_limit as usize {
                break;
            }
            offset += self.page_limit;
            tokio::time::sleep(self.page_delay).await;
        }

        info!(markets = all.len(), "Universe fetch complete");
        Ok(all)
    }
}
