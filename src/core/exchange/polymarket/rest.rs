//! Polymarket data/CLOB REST client (unauthenticated read surface).

use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, info, warn};

use super::response::{decimal_from_value, timestamp_from_value, ApiTrade, MarketsPage};
use crate::core::domain::{ConditionId, Side, TokenId, Trade};
use crate::error::{Error, Result};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 250;

/// Read-only REST client for markets and executed trades.
pub struct DataClient {
    http: Client,
    clob_url: String,
    data_url: String,
    /// Trades older than this are dropped before they reach ingestion.
    /// The venue sometimes returns rows months old.
    max_trade_age: Duration,
}

impl DataClient {
    pub fn new(
        clob_url: impl Into<String>,
        data_url: impl Into<String>,
        timeout: Duration,
        max_trade_age: Duration,
    ) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            clob_url: clob_url.into(),
            data_url: data_url.into(),
            max_trade_age,
        })
    }

    /// GET with bounded retries. Rate-limit responses honor the advertised
    /// `Retry-After` and do not count as errors.
    async fn get_with_retry(&self, url: &str, query: &[(&str, String)]) -> Result<Response> {
        let mut backoff = Duration::from_millis(INITIAL_BACKOFF_MS);
        let mut last_error: Option<Error> = None;

        for attempt in 1..=MAX_RETRIES {
            let result = self.http.get(url).query(query).send().await;
            match result {
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let wait = retry_after(&response).unwrap_or(backoff);
                    info!(url, wait_secs = wait.as_secs(), "Rate limited, honoring Retry-After");
                    tokio::time::sleep(wait).await;
                }
                Ok(response) => match response.error_for_status() {
                    Ok(response) => return Ok(response),
                    Err(e) => {
                        warn!(url, attempt, error = %e, "Request failed");
                        last_error = Some(e.into());
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                },
                Err(e) => {
                    warn!(url, attempt, error = %e, "Request error");
                    last_error = Some(e.into());
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::Degraded(format!("{url}: retries exhausted"))))
    }

    /// Fetch one page of markets from the CLOB API.
    pub async fn markets_page(&self, cursor: Option<&str>) -> Result<MarketsPage> {
        let url = format!("{}/markets", self.clob_url);
        let mut query = Vec::new();
        if let Some(cursor) = cursor {
            query.push(("next_cursor", cursor.to_string()));
        }
        let response = self.get_with_retry(&url, &query).await?;
        Ok(response.json().await?)
    }

    /// Fetch recent executed trades, dropping anything older than the
    /// configured maximum age.
    pub async fn recent_trades(
        &self,
        condition_id: Option<&ConditionId>,
        limit: u32,
    ) -> Result<Vec<Trade>> {
        let url = format!("{}/trades", self.data_url);
        let mut query = vec![("limit", limit.to_string())];
        if let Some(condition) = condition_id {
            query.push(("market", condition.as_str().to_string()));
        }
        let response = self.get_with_retry(&url, &query).await?;
        let raw: Vec<ApiTrade> = response.json().await?;

        let now = Utc::now();
        let max_age = self.max_trade_age.as_secs_f64();
        let total = raw.len();

        let trades: Vec<Trade> = raw
            .into_iter()
            .filter_map(|t| self.parse_trade(t))
            .filter(|t| {
                let age = t.age_seconds(now);
                age <= max_age
            })
            .collect();

        debug!(
            total,
            fresh = trades.len(),
            max_age_secs = max_age,
            "Fetched trades"
        );
        Ok(trades)
    }

    /// Map a raw API trade to the domain, skipping rows with missing
    /// identity, price, or timestamp.
    fn parse_trade(&self, raw: ApiTrade) -> Option<Trade> {
        let condition_id = ConditionId::from(raw.condition_id?);
        let trade_id = raw.id?;
        let token_id = TokenId::from(raw.asset?);
        let price = raw.price.as_ref().and_then(decimal_from_value)?;
        let size = raw.size.as_ref().and_then(decimal_from_value)?;
        // No valid timestamp means the row cannot be aged; drop it rather
        // than let a stale trade masquerade as fresh.
        let timestamp = raw.timestamp.as_ref().and_then(timestamp_from_value)?;
        let side = raw.side.as_deref().and_then(Side::parse).unwrap_or(Side::Buy);
        Some(Trade {
            condition_id,
            trade_id,
            token_id,
            price,
            size,
            side,
            timestamp,
        })
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;

    fn client() -> DataClient {
        DataClient::new(
            "https://clob.example",
            "https://data.example",
            Duration::from_secs(10),
            Duration::from_secs(300),
        )
        .unwrap()
    }

    fn raw_trade(age: ChronoDuration) -> ApiTrade {
        let ts = (Utc::now() - age).timestamp();
        serde_json::from_value(serde_json::json!({
            "conditionId": "0xC",
            "id": "t1",
            "asset": "tok_A",
            "price": "0.95",
            "size": "10",
            "side": "BUY",
            "timestamp": ts,
        }))
        .unwrap()
    }

    #[test]
    fn parses_complete_trade() {
        let trade = client().parse_trade(raw_trade(ChronoDuration::seconds(10))).unwrap();
        assert_eq!(trade.condition_id.as_str(), "0xC");
        assert_eq!(trade.price, dec!(0.95));
        assert_eq!(trade.side, Side::Buy);
    }

    #[test]
    fn drops_trade_without_timestamp() {
        let raw: ApiTrade = serde_json::from_value(serde_json::json!({
            "conditionId": "0xC",
            "id": "t1",
            "asset": "tok_A",
            "price": "0.95",
            "size": "10",
        }))
        .unwrap();
        assert!(client().parse_trade(raw).is_none());
    }

    #[test]
    fn freshness_boundary() {
        let now = Utc::now();
        let max_age = 300.0;
        let fresh = client()
            .parse_trade(raw_trade(ChronoDuration::seconds(300)))
            .unwrap();
        let stale = client()
            .parse_trade(raw_trade(ChronoDuration::days(60)))
            .unwrap();
        // Exactly at max age passes; beyond it does not.
        assert!(fresh.age_seconds(now) <= max_age + 1.0);
        assert!(stale.age_seconds(now) > max_age);
    }
}
