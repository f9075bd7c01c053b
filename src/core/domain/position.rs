//! Positions and exit records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{ConditionId, OrderId, PositionId, TokenId};

/// Lifecycle state of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
    Resolved,
}

impl PositionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Resolved => "resolved",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "closed" => Some(Self::Closed),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitType {
    ProfitTarget,
    StopLoss,
    TimeExit,
    Resolution,
    Manual,
}

impl ExitType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProfitTarget => "profit_target",
            Self::StopLoss => "stop_loss",
            Self::TimeExit => "time_exit",
            Self::Resolution => "resolution",
            Self::Manual => "manual",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "profit_target" => Some(Self::ProfitTarget),
            "stop_loss" => Some(Self::StopLoss),
            "time_exit" => Some(Self::TimeExit),
            "resolution" => Some(Self::Resolution),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// Whether the exit's close order has been placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitStatus {
    Pending,
    Executed,
}

impl ExitStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executed => "executed",
        }
    }
}

/// An aggregated holding in one outcome token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub token_id: TokenId,
    pub condition_id: ConditionId,
    pub size: Decimal,
    /// Size-weighted average entry price.
    pub entry_price: Decimal,
    pub entry_cost: Decimal,
    pub entry_time: DateTime<Utc>,
    /// Start of the holding window; exit rules other than resolution wait
    /// until `hold_hours` have elapsed from here.
    pub hold_start_at: DateTime<Utc>,
    /// Minimum holding window in hours. Zero for bot-opened positions;
    /// import policy decides for synced ones.
    pub hold_hours: f64,
    pub realized_pnl: Decimal,
    pub current_price: Option<Decimal>,
    pub unrealized_pnl: Option<Decimal>,
    pub status: PositionStatus,
    pub exit_order_id: Option<OrderId>,
    pub exit_timestamp: Option<DateTime<Utc>>,
}

impl Position {
    /// Open a fresh position from a first buy fill.
    #[must_use]
    pub fn open(
        token_id: TokenId,
        condition_id: ConditionId,
        size: Decimal,
        entry_price: Decimal,
        entry_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PositionId::new(),
            token_id,
            condition_id,
            size,
            entry_price,
            entry_cost: size * entry_price,
            entry_time,
            hold_start_at: entry_time,
            hold_hours: 0.0,
            realized_pnl: Decimal::ZERO,
            current_price: None,
            unrealized_pnl: None,
            status: PositionStatus::Open,
            exit_order_id: None,
            exit_timestamp: None,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Hours the position has been held, relative to the holding window start.
    #[must_use]
    pub fn hours_held(&self, now: DateTime<Utc>) -> f64 {
        (now - self.hold_start_at).num_minutes() as f64 / 60.0
    }

    /// True once the holding window has elapsed.
    #[must_use]
    pub fn holding_window_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.hours_held(now) >= self.hold_hours
    }

    /// Unrealized P&L at `current_price`.
    #[must_use]
    pub fn pnl_at(&self, current_price: Decimal) -> Decimal {
        self.size * (current_price - self.entry_price)
    }
}

/// Audit record of a position close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitEvent {
    pub position_id: PositionId,
    pub exit_type: ExitType,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub size: Decimal,
    pub gross_pnl: Decimal,
    pub net_pnl: Decimal,
    pub hours_held: f64,
    pub status: ExitStatus,
    pub created_at: DateTime<Utc>,
}

/// Instruction for the execution service to close a position.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitSignal {
    pub position_id: PositionId,
    pub token_id: TokenId,
    pub condition_id: ConditionId,
    pub exit_type: ExitType,
    pub size: Decimal,
    /// Price to sell at; resolution exits use the resolution value.
    pub target_price: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn open_position_has_zero_hold_window() {
        let now = Utc::now();
        let p = Position::open(
            TokenId::from("tok"),
            ConditionId::from("0xC"),
            dec!(20),
            dec!(0.95),
            now,
        );
        assert_eq!(p.entry_cost, dec!(19.00));
        assert!(p.holding_window_elapsed(now));
        assert!(p.is_open());
    }

    #[test]
    fn holding_window_gates_until_elapsed() {
        let now = Utc::now();
        let mut p = Position::open(
            TokenId::from("tok"),
            ConditionId::from("0xC"),
            dec!(10),
            dec!(0.95),
            now - Duration::hours(24),
        );
        p.hold_hours = 168.0;
        assert!(!p.holding_window_elapsed(now));
        p.hold_start_at = now - Duration::hours(169);
        assert!(p.holding_window_elapsed(now));
    }

    #[test]
    fn pnl_at_current_price() {
        let p = Position::open(
            TokenId::from("tok"),
            ConditionId::from("0xC"),
            dec!(20),
            dec!(0.95),
            Utc::now(),
        );
        assert_eq!(p.pnl_at(dec!(0.99)), dec!(0.80));
        assert_eq!(p.pnl_at(dec!(0.90)), dec!(-1.00));
    }
}
