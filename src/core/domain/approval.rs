//! Human-in-the-loop trade approvals.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::TokenId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Executed,
    Expired,
}

impl ApprovalStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executed => "executed",
            Self::Expired => "expired",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "executed" => Some(Self::Executed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// Authorization to buy a token, granted out-of-band.
///
/// When approval mode is on, the order manager only submits BUYs covered by
/// a pending, unexpired approval whose `max_price` is not exceeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    pub token_id: TokenId,
    pub max_price: Decimal,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Approval {
    /// True if this approval covers a buy at `price` at time `now`.
    #[must_use]
    pub fn covers(&self, price: Decimal, now: DateTime<Utc>) -> bool {
        self.status == ApprovalStatus::Pending && self.expires_at > now && price <= self.max_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn approval(status: ApprovalStatus, expires_in: Duration) -> Approval {
        Approval {
            token_id: TokenId::from("tok"),
            max_price: dec!(0.96),
            status,
            created_at: Utc::now(),
            expires_at: Utc::now() + expires_in,
        }
    }

    #[test]
    fn pending_unexpired_covers_price_at_or_below_max() {
        let a = approval(ApprovalStatus::Pending, Duration::hours(1));
        let now = Utc::now();
        assert!(a.covers(dec!(0.96), now));
        assert!(a.covers(dec!(0.95), now));
        assert!(!a.covers(dec!(0.97), now));
    }

    #[test]
    fn expired_or_executed_never_covers() {
        let now = Utc::now();
        assert!(!approval(ApprovalStatus::Pending, Duration::hours(-1)).covers(dec!(0.9), now));
        assert!(!approval(ApprovalStatus::Executed, Duration::hours(1)).covers(dec!(0.9), now));
    }
}
