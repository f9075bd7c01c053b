//! Application orchestration.

pub mod config;
pub mod orchestrator;
pub mod pipeline;

pub use config::{Config, TradeMode};
pub use orchestrator::Orchestrator;
pub use pipeline::{PipelineOutcome, TradingPipeline};
