//! Event processing: raw ingest events to strategy contexts.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use crate::core::domain::{IngestEvent, StrategyContext, TriggerData};
use crate::core::store::MarketStore;
use crate::error::Result;

/// Words that mark a weather market. Matched against whole words only:
/// substring matching would block "Rainbow Six" or "snowboarding".
const WEATHER_WORDS: &[&str] = &[
    "rain", "rains", "rainy", "rainfall", "snow", "snows", "snowy", "snowfall", "storm",
    "storms", "stormy", "hurricane", "tornado", "blizzard", "weather", "temperature",
    "heatwave", "flood", "drought",
];

/// Hard-filter configuration.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Markets closing sooner than this are rejected.
    pub min_time_to_end_hours: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_time_to_end_hours: 6.0,
        }
    }
}

/// Converts incoming events into [`StrategyContext`]s.
pub struct EventProcessor {
    threshold: Decimal,
    filters: FilterConfig,
}

impl EventProcessor {
    #[must_use]
    pub fn new(threshold: Decimal, filters: FilterConfig) -> Self {
        Self { threshold, filters }
    }

    #[must_use]
    pub const fn threshold(&self) -> Decimal {
        self.threshold
    }

    /// Whether an event type is worth processing at all.
    #[must_use]
    pub fn should_process(event: &IngestEvent) -> bool {
        match event {
            IngestEvent::Book(_)
            | IngestEvent::PriceChange(_)
            | IngestEvent::LastTradePrice(_)
            | IngestEvent::PriceUpdate(_)
            | IngestEvent::Trade(_) => true,
            IngestEvent::Heartbeat | IngestEvent::Ack | IngestEvent::Unknown => false,
        }
    }

    /// Extract a trigger candidate from an event.
    ///
    /// Returns `None` when the event has no valid timestamp (a stale trade
    /// must never pass as fresh by defaulting to now), no usable price, or
    /// no condition identity to dedup on.
    ///
    /// Price source priority: explicit price, then last trade price, then
    /// best bid from the embedded book.
    #[must_use]
    pub fn extract_trigger(&self, event: &IngestEvent, now: DateTime<Utc>) -> Option<TriggerData> {
        let timestamp = event.timestamp()?;

        let (token_id, condition_id, price, size) = match event {
            IngestEvent::Book(book) => {
                let price = book
                    .last_trade_price
                    .or_else(|| book.best_bid())?;
                (
                    book.token_id.clone(),
                    book.condition_id.clone(),
                    price,
                    None,
                )
            }
            IngestEvent::PriceChange(tick)
            | IngestEvent::LastTradePrice(tick)
            | IngestEvent::PriceUpdate(tick) => (
                tick.token_id.clone(),
                tick.condition_id.clone(),
                tick.effective_price()?,
                tick.size,
            ),
            IngestEvent::Trade(tick) => (
                tick.token_id.clone(),
                tick.condition_id.clone(),
                tick.price?,
                tick.size,
            ),
            IngestEvent::Heartbeat | IngestEvent::Ack | IngestEvent::Unknown => return None,
        };

        // Without a condition there is no dedup key; skip rather than risk
        // double-trading a market.
        let condition_id = condition_id?;

        let trade_age_seconds = (now - timestamp).num_milliseconds() as f64 / 1000.0;
        Some(TriggerData {
            token_id,
            condition_id,
            price,
            size,
            trade_age_seconds,
            timestamp,
        })
    }

    /// Inclusive threshold check: a price exactly at the threshold crosses.
    #[must_use]
    pub fn meets_threshold(&self, price: Decimal) -> bool {
        price >= self.threshold
    }

    /// Enrich a trigger with market metadata.
    ///
    /// Absent metadata yields safe defaults: empty strings and no expiry.
    pub async fn build_context(
        &self,
        markets: &dyn MarketStore,
        trigger: &TriggerData,
        now: DateTime<Utc>,
    ) -> Result<StrategyContext> {
        let meta = markets.token_meta(&trigger.token_id).await?;

        let (question, outcome, outcome_index, category, end_date) = match meta {
            Some(meta) => (
                meta.question,
                meta.outcome,
                Some(meta.outcome_index),
                meta.category,
                meta.end_date,
            ),
            None => {
                debug!(token = %trigger.token_id, "No metadata for token, using defaults");
                (String::new(), String::new(), None, None, None)
            }
        };

        let time_to_end_hours = end_date.map(|end| (end - now).num_minutes() as f64 / 60.0);

        Ok(StrategyContext {
            token_id: trigger.token_id.clone(),
            condition_id: trigger.condition_id.clone(),
            trigger_price: trigger.price,
            size: trigger.size,
            trade_age_seconds: trigger.trade_age_seconds,
            question,
            outcome,
            outcome_index,
            category,
            end_date,
            time_to_end_hours,
        })
    }

    /// Apply hard filters. Returns the rejection reason, or `None` to pass.
    #[must_use]
    pub fn apply_filters(&self, ctx: &StrategyContext) -> Option<String> {
        if is_weather_question(&ctx.question) {
            return Some("weather market".to_string());
        }
        if let Some(hours) = ctx.time_to_end_hours {
            if hours < self.filters.min_time_to_end_hours {
                return Some(format!(
                    "market expires in {hours:.1}h (minimum {:.1}h)",
                    self.filters.min_time_to_end_hours
                ));
            }
        }
        None
    }
}

/// Whole-word weather match over the question text.
fn is_weather_question(question: &str) -> bool {
    question
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .any(|word| {
            let lower = word.to_lowercase();
            WEATHER_WORDS.contains(&lower.as_str())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{
        BookLevel, BookSnapshot, ConditionId, PriceTick, TokenId, TradeTick,
    };
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn processor() -> EventProcessor {
        EventProcessor::new(dec!(0.95), FilterConfig::default())
    }

    fn trade_event(timestamp: Option<DateTime<Utc>>) -> IngestEvent {
        IngestEvent::Trade(TradeTick {
            token_id: TokenId::from("tok_yes_abc"),
            condition_id: Some(ConditionId::from("0xtest123")),
            price: Some(dec!(0.95)),
            size: Some(dec!(75)),
            side: None,
            timestamp,
        })
    }

    fn context(question: &str, category: Option<&str>, hours: Option<f64>) -> StrategyContext {
        StrategyContext {
            token_id: TokenId::from("tok"),
            condition_id: ConditionId::from("0xC"),
            trigger_price: dec!(0.95),
            size: None,
            trade_age_seconds: 1.0,
            question: question.to_string(),
            outcome: "Yes".to_string(),
            outcome_index: Some(0),
            category: category.map(str::to_string),
            end_date: None,
            time_to_end_hours: hours,
        }
    }

    #[test]
    fn processes_price_bearing_events_only() {
        let now = Utc::now();
        assert!(EventProcessor::should_process(&trade_event(Some(now))));
        assert!(EventProcessor::should_process(&IngestEvent::PriceChange(
            PriceTick {
                token_id: TokenId::from("t"),
                condition_id: None,
                price: Some(dec!(0.5)),
                last_trade_price: None,
                size: None,
                timestamp: Some(now),
            }
        )));
        assert!(!EventProcessor::should_process(&IngestEvent::Heartbeat));
        assert!(!EventProcessor::should_process(&IngestEvent::Ack));
        assert!(!EventProcessor::should_process(&IngestEvent::Unknown));
    }

    #[test]
    fn extracts_basic_trigger_info() {
        let now = Utc::now();
        let trigger = processor().extract_trigger(&trade_event(Some(now)), now).unwrap();
        assert_eq!(trigger.token_id.as_str(), "tok_yes_abc");
        assert_eq!(trigger.condition_id.as_str(), "0xtest123");
        assert_eq!(trigger.price, dec!(0.95));
        assert_eq!(trigger.size, Some(dec!(75)));
    }

    #[test]
    fn calculates_trade_age() {
        let now = Utc::now();
        let trigger = processor()
            .extract_trigger(&trade_event(Some(now - Duration::seconds(120))), now)
            .unwrap();
        assert!((115.0..=125.0).contains(&trigger.trade_age_seconds));
    }

    #[test]
    fn rejects_event_without_timestamp() {
        // A missing timestamp must not default to now.
        let now = Utc::now();
        assert!(processor().extract_trigger(&trade_event(None), now).is_none());
    }

    #[test]
    fn rejects_event_without_condition() {
        let now = Utc::now();
        let event = IngestEvent::Trade(TradeTick {
            token_id: TokenId::from("tok"),
            condition_id: None,
            price: Some(dec!(0.95)),
            size: None,
            side: None,
            timestamp: Some(now),
        });
        assert!(processor().extract_trigger(&event, now).is_none());
    }

    #[test]
    fn book_price_priority_last_trade_then_best_bid() {
        let now = Utc::now();
        let mut book = BookSnapshot {
            token_id: TokenId::from("tok"),
            condition_id: Some(ConditionId::from("0xC")),
            last_trade_price: Some(dec!(0.92)),
            bids: vec![BookLevel { price: dec!(0.88), size: dec!(100) }],
            asks: vec![],
            timestamp: Some(now),
        };

        let trigger = processor()
            .extract_trigger(&IngestEvent::Book(book.clone()), now)
            .unwrap();
        assert_eq!(trigger.price, dec!(0.92));

        book.last_trade_price = None;
        let trigger = processor()
            .extract_trigger(&IngestEvent::Book(book.clone()), now)
            .unwrap();
        assert_eq!(trigger.price, dec!(0.88));

        book.bids.clear();
        assert!(processor()
            .extract_trigger(&IngestEvent::Book(book), now)
            .is_none());
    }

    #[test]
    fn tick_price_falls_back_to_last_trade_price() {
        let now = Utc::now();
        let mut tick = PriceTick {
            token_id: TokenId::from("tok"),
            condition_id: Some(ConditionId::from("0xC")),
            price: None,
            last_trade_price: Some(dec!(0.90)),
            size: None,
            timestamp: Some(now),
        };

        let trigger = processor()
            .extract_trigger(&IngestEvent::PriceChange(tick.clone()), now)
            .unwrap();
        assert_eq!(trigger.price, dec!(0.90));

        // No price source at all: skipped silently.
        tick.last_trade_price = None;
        assert!(processor()
            .extract_trigger(&IngestEvent::PriceChange(tick), now)
            .is_none());
    }

    #[test]
    fn threshold_is_inclusive() {
        let p = processor();
        assert!(p.meets_threshold(dec!(0.95)));
        assert!(p.meets_threshold(dec!(0.9500)));
        assert!(p.meets_threshold(dec!(0.9501)));
        assert!(p.meets_threshold(dec!(0.99)));
        assert!(!p.meets_threshold(dec!(0.9499)));
        assert!(!p.meets_threshold(dec!(0.50)));
    }

    #[test]
    fn rejects_weather_markets() {
        let reason = processor()
            .apply_filters(&context("Will it rain in NYC tomorrow?", None, Some(240.0)))
            .unwrap();
        assert!(reason.contains("weather"));
    }

    #[test]
    fn allows_rainbow_six() {
        // Whole-word matching: "Rainbow" must not match "rain".
        let ctx = context(
            "Will Team A win Rainbow Six Siege tournament?",
            Some("Esports"),
            Some(240.0),
        );
        assert!(processor().apply_filters(&ctx).is_none());
    }

    #[test]
    fn allows_snowboard_and_storming() {
        assert!(processor()
            .apply_filters(&context("Best snowboarder of 2025?", None, Some(240.0)))
            .is_none());
        assert!(processor()
            .apply_filters(&context("Team storming through playoffs?", None, Some(240.0)))
            .is_none());
    }

    #[test]
    fn rejects_expiring_markets() {
        let reason = processor()
            .apply_filters(&context("Will X happen?", None, Some(5.0)))
            .unwrap();
        assert!(reason.contains("expires"));
    }

    #[test]
    fn allows_markets_with_time() {
        assert!(processor()
            .apply_filters(&context("Will X happen?", None, Some(720.0)))
            .is_none());
    }
}
