//! Exit rule evaluation for open positions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::core::domain::{ExitSignal, ExitType, Position};

/// Exit rule thresholds.
#[derive(Debug, Clone)]
pub struct ExitConfig {
    /// Close winners at or above this price once the holding window passed.
    pub profit_target: Decimal,
    /// Close losers at or below this price once the holding window passed.
    pub stop_loss: Decimal,
    /// Close anything this close to market end, hold window or not.
    pub time_exit_hours: f64,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            profit_target: dec!(0.99),
            stop_loss: dec!(0.90),
            time_exit_hours: 6.0,
        }
    }
}

/// Everything known about a position's market at evaluation time.
#[derive(Debug, Clone, Default)]
pub struct MarketState {
    pub current_price: Option<Decimal>,
    pub time_to_end_hours: Option<f64>,
    pub resolved: bool,
    /// Value of the position's token at resolution, when resolved.
    pub resolution_value: Option<Decimal>,
}

/// Evaluates exit rules per open position per tick.
pub struct ExitManager {
    config: ExitConfig,
}

impl ExitManager {
    #[must_use]
    pub fn new(config: ExitConfig) -> Self {
        Self { config }
    }

    /// Evaluate exit rules in priority order: profit target, stop loss,
    /// time exit, resolution. Profit and stop respect the holding window;
    /// time exit and resolution do not.
    #[must_use]
    pub fn evaluate(
        &self,
        position: &Position,
        market: &MarketState,
        now: DateTime<Utc>,
    ) -> Option<ExitSignal> {
        if !position.is_open() || position.size <= Decimal::ZERO {
            return None;
        }

        let window_elapsed = position.holding_window_elapsed(now);

        if let Some(price) = market.current_price {
            if window_elapsed && price >= self.config.profit_target {
                return Some(self.signal(position, ExitType::ProfitTarget, Some(price)));
            }
            if window_elapsed && price <= self.config.stop_loss {
                return Some(self.signal(position, ExitType::StopLoss, Some(price)));
            }
        }

        if let Some(hours) = market.time_to_end_hours {
            if hours <= self.config.time_exit_hours {
                return Some(self.signal(position, ExitType::TimeExit, market.current_price));
            }
        }

        if market.resolved {
            return Some(self.signal(
                position,
                ExitType::Resolution,
                market.resolution_value.or(market.current_price),
            ));
        }

        None
    }

    fn signal(
        &self,
        position: &Position,
        exit_type: ExitType,
        target_price: Option<Decimal>,
    ) -> ExitSignal {
        debug!(
            position = %position.id,
            exit_type = exit_type.as_str(),
            "Exit signal"
        );
        ExitSignal {
            position_id: position.id.clone(),
            token_id: position.token_id.clone(),
            condition_id: position.condition_id.clone(),
            exit_type,
            size: position.size,
            target_price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{ConditionId, TokenId};
    use chrono::Duration;

    fn position(hold_hours: f64, held_for_hours: i64) -> Position {
        let now = Utc::now();
        let mut p = Position::open(
            TokenId::from("tok"),
            ConditionId::from("0xC"),
            dec!(20),
            dec!(0.95),
            now - Duration::hours(held_for_hours),
        );
        p.hold_hours = hold_hours;
        p
    }

    fn market(price: Decimal, hours_to_end: f64) -> MarketState {
        MarketState {
            current_price: Some(price),
            time_to_end_hours: Some(hours_to_end),
            resolved: false,
            resolution_value: None,
        }
    }

    fn manager() -> ExitManager {
        ExitManager::new(ExitConfig::default())
    }

    #[test]
    fn profit_target_fires_after_hold_window() {
        let signal = manager()
            .evaluate(&position(0.0, 1), &market(dec!(0.99), 240.0), Utc::now())
            .unwrap();
        assert_eq!(signal.exit_type, ExitType::ProfitTarget);
        assert_eq!(signal.target_price, Some(dec!(0.99)));
    }

    #[test]
    fn profit_target_waits_for_hold_window() {
        // 7-day window, held 1 hour: no exit yet.
        let signal = manager().evaluate(&position(168.0, 1), &market(dec!(0.99), 240.0), Utc::now());
        assert!(signal.is_none());
    }

    #[test]
    fn stop_loss_fires_after_hold_window() {
        let signal = manager()
            .evaluate(&position(0.0, 1), &market(dec!(0.88), 240.0), Utc::now())
            .unwrap();
        assert_eq!(signal.exit_type, ExitType::StopLoss);
    }

    #[test]
    fn stop_loss_boundary_is_inclusive() {
        let signal = manager()
            .evaluate(&position(0.0, 1), &market(dec!(0.90), 240.0), Utc::now())
            .unwrap();
        assert_eq!(signal.exit_type, ExitType::StopLoss);

        let none = manager().evaluate(&position(0.0, 1), &market(dec!(0.905), 240.0), Utc::now());
        assert!(none.is_none());
    }

    #[test]
    fn time_exit_ignores_hold_window() {
        // Still inside the hold window, but the market is about to close.
        let signal = manager()
            .evaluate(&position(168.0, 1), &market(dec!(0.95), 3.0), Utc::now())
            .unwrap();
        assert_eq!(signal.exit_type, ExitType::TimeExit);
    }

    #[test]
    fn resolution_fires_with_resolution_value() {
        let state = MarketState {
            current_price: Some(dec!(0.99)),
            time_to_end_hours: None,
            resolved: true,
            resolution_value: Some(dec!(1.00)),
        };
        // Hold window still active: resolution does not wait.
        let signal = manager()
            .evaluate(&position(168.0, 1), &state, Utc::now())
            .unwrap();
        assert_eq!(signal.exit_type, ExitType::Resolution);
        assert_eq!(signal.target_price, Some(dec!(1.00)));
    }

    #[test]
    fn priority_profit_over_resolution() {
        // When both apply, the listed order wins.
        let state = MarketState {
            current_price: Some(dec!(0.99)),
            time_to_end_hours: Some(240.0),
            resolved: true,
            resolution_value: Some(dec!(1.00)),
        };
        let signal = manager()
            .evaluate(&position(0.0, 1), &state, Utc::now())
            .unwrap();
        assert_eq!(signal.exit_type, ExitType::ProfitTarget);
    }

    #[test]
    fn healthy_position_stays_open() {
        let signal = manager().evaluate(&position(0.0, 1), &market(dec!(0.95), 240.0), Utc::now());
        assert!(signal.is_none());
    }

    #[test]
    fn closed_position_yields_nothing() {
        let mut p = position(0.0, 1);
        p.status = crate::core::domain::PositionStatus::Closed;
        let signal = manager().evaluate(&p, &market(dec!(0.99), 240.0), Utc::now());
        assert!(signal.is_none());
    }

    #[test]
    fn missing_price_skips_price_rules_but_not_time() {
        let state = MarketState {
            current_price: None,
            time_to_end_hours: Some(2.0),
            resolved: false,
            resolution_value: None,
        };
        let signal = manager().evaluate(&position(0.0, 1), &state, Utc::now()).unwrap();
        assert_eq!(signal.exit_type, ExitType::TimeExit);
    }
}
