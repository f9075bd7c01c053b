//! Pure domain types.
//!
//! No I/O, no storage, no venue specifics: just the vocabulary of the
//! trading pipeline.

pub mod approval;
pub mod candidate;
pub mod context;
pub mod event;
pub mod id;
pub mod market;
pub mod order;
pub mod position;
pub mod score;
pub mod trade;
pub mod trigger;
pub mod watchlist;

pub use approval::{Approval, ApprovalStatus};
pub use candidate::{Candidate, CandidateStatus};
pub use context::StrategyContext;
pub use event::{BookLevel, BookSnapshot, IngestEvent, PriceTick, TradeTick};
pub use id::{ConditionId, OrderId, PositionId, TokenId};
pub use market::{
    Market, MarketUniverse, OutcomeToken, PriceSnapshot, Tier, TierRequest, TokenMeta,
};
pub use order::{Fill, Order, OrderMode, OrderStatus};
pub use position::{
    ExitEvent, ExitSignal, ExitStatus, ExitType, Position, PositionStatus,
};
pub use score::{compute_interestingness, tier_recommendation, MarketMetrics};
pub use trade::{Side, Trade};
pub use trigger::{Trigger, TriggerData};
pub use watchlist::{Promotion, WatchStatus, WatchlistEntry};
