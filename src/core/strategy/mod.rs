//! Strategy plugin contract.
//!
//! Strategies see a [`StrategyContext`] and decide whether the pipeline
//! executes immediately, watches the token, or drops it.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::core::domain::StrategyContext;

/// A strategy's verdict on a trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Submit a BUY now.
    Execute { score: f64, stake: Decimal },
    /// Queue on the watchlist for periodic re-scoring.
    Watch { score: f64 },
    Reject { reason: String },
}

/// A trading strategy evaluating threshold triggers.
pub trait Strategy: Send + Sync {
    /// Unique identifier, used in configuration and logging.
    fn name(&self) -> &'static str;

    /// Decide what to do with a trigger.
    fn evaluate(&self, ctx: &StrategyContext) -> Decision;
}

/// Configuration for the high-probability strategy.
#[derive(Debug, Clone)]
pub struct HighProbabilityConfig {
    /// Score at or above which the trigger executes immediately.
    pub execution_score: f64,
    /// Score band [watch_score, execution_score) goes to the watchlist.
    pub watch_score: f64,
    /// Shares to buy on execution.
    pub stake: Decimal,
}

impl Default for HighProbabilityConfig {
    fn default() -> Self {
        Self {
            execution_score: 0.97,
            watch_score: 0.90,
            stake: dec!(20),
        }
    }
}

/// Buys outcomes that are very likely to resolve YES.
///
/// The score is the trigger price itself: for a binary outcome token the
/// price is the market's probability estimate.
pub struct HighProbabilityStrategy {
    config: HighProbabilityConfig,
}

impl HighProbabilityStrategy {
    #[must_use]
    pub fn new(config: HighProbabilityConfig) -> Self {
        Self { config }
    }
}

impl Strategy for HighProbabilityStrategy {
    fn name(&self) -> &'static str {
        "high_probability"
    }

    fn evaluate(&self, ctx: &StrategyContext) -> Decision {
        let score = ctx.probability();
        if score >= self.config.execution_score {
            Decision::Execute {
                score,
                stake: self.config.stake,
            }
        } else if score >= self.config.watch_score {
            Decision::Watch { score }
        } else {
            Decision::Reject {
                reason: format!("score {score:.3} below watch floor"),
            }
        }
    }
}

/// Registry of available strategies, keyed by name.
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: Vec<Box<dyn Strategy>>,
}

impl StrategyRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, strategy: Box<dyn Strategy>) {
        self.strategies.push(strategy);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn Strategy> {
        self.strategies
            .iter()
            .find(|s| s.name() == name)
            .map(Box::as_ref)
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn all(&self) -> impl Iterator<Item = &dyn Strategy> {
        self.strategies.iter().map(Box::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{ConditionId, TokenId};

    fn context(price: Decimal) -> StrategyContext {
        StrategyContext {
            token_id: TokenId::from("tok"),
            condition_id: ConditionId::from("0xC"),
            trigger_price: price,
            size: None,
            trade_age_seconds: 1.0,
            question: "Test?".into(),
            outcome: "Yes".into(),
            outcome_index: Some(0),
            category: None,
            end_date: None,
            time_to_end_hours: Some(240.0),
        }
    }

    #[test]
    fn high_scores_execute() {
        let strategy = HighProbabilityStrategy::new(HighProbabilityConfig::default());
        assert!(matches!(
            strategy.evaluate(&context(dec!(0.98))),
            Decision::Execute { .. }
        ));
        assert!(matches!(
            strategy.evaluate(&context(dec!(0.97))),
            Decision::Execute { .. }
        ));
    }

    #[test]
    fn borderline_scores_watch() {
        let strategy = HighProbabilityStrategy::new(HighProbabilityConfig::default());
        assert!(matches!(
            strategy.evaluate(&context(dec!(0.95))),
            Decision::Watch { .. }
        ));
        assert!(matches!(
            strategy.evaluate(&context(dec!(0.90))),
            Decision::Watch { .. }
        ));
    }

    #[test]
    fn low_scores_reject() {
        let strategy = HighProbabilityStrategy::new(HighProbabilityConfig::default());
        assert!(matches!(
            strategy.evaluate(&context(dec!(0.85))),
            Decision::Reject { .. }
        ));
    }

    #[test]
    fn registry_finds_by_name() {
        let mut registry = StrategyRegistry::new();
        registry.register(Box::new(HighProbabilityStrategy::new(
            HighProbabilityConfig::default(),
        )));

        assert!(registry.get("high_probability").is_some());
        assert!(registry.get("unknown").is_none());
        assert_eq!(registry.names(), vec!["high_probability"]);
    }
}
