//! The stateful trading pipeline.
//!
//! Wires the event path end to end: raw event → trigger extraction →
//! freshness and threshold gates → atomic first-trigger recording →
//! context building → hard filters → strategy decision → order
//! submission / watchlist. Also executes watchlist promotions and exit
//! signals.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::core::domain::{
    Candidate, CandidateStatus, ExitSignal, ExitType, IngestEvent, OrderId, Promotion, Side,
    StrategyContext, TriggerData,
};
use crate::core::execution::{OrderManager, PositionTracker};
use crate::core::service::{EventProcessor, TriggerTracker, WatchlistService};
use crate::core::store::{
    streams, ApprovalStore, CandidateStore, MarketDataStore, MarketStore, UniverseStore,
    WatermarkStore,
};
use crate::core::strategy::{Decision, Strategy};
use crate::error::{Error, Result};

/// What the pipeline did with one event.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Not a processable event, or no usable trigger in it.
    Ignored,
    /// Valid trigger but older than the freshness window.
    Stale,
    /// Price below the configured threshold.
    BelowThreshold,
    /// Another caller already recorded this `(condition, threshold)`.
    NotFirst,
    /// A hard filter rejected the market.
    Filtered(String),
    /// Queued on the watchlist.
    Watching,
    /// Strategy rejected the trigger.
    Rejected(String),
    /// Approval mode is on and no covering approval exists.
    AwaitingApproval,
    /// BUY submitted.
    Executed(OrderId),
}

/// End-to-end event pipeline.
pub struct TradingPipeline {
    processor: EventProcessor,
    trigger_tracker: TriggerTracker,
    strategy: Box<dyn Strategy>,
    watchlist: Arc<WatchlistService>,
    order_manager: Arc<OrderManager>,
    position_tracker: Arc<PositionTracker>,
    candidates: Arc<dyn CandidateStore>,
    approvals: Arc<dyn ApprovalStore>,
    markets: Arc<dyn MarketStore>,
    universe: Arc<dyn UniverseStore>,
    market_data: Arc<dyn MarketDataStore>,
    watermarks: Arc<dyn WatermarkStore>,
    max_trade_age_seconds: f64,
    approval_required: bool,
    stake: Decimal,
}

impl TradingPipeline {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        processor: EventProcessor,
        trigger_tracker: TriggerTracker,
        strategy: Box<dyn Strategy>,
        watchlist: Arc<WatchlistService>,
        order_manager: Arc<OrderManager>,
        position_tracker: Arc<PositionTracker>,
        candidates: Arc<dyn CandidateStore>,
        approvals: Arc<dyn ApprovalStore>,
        markets: Arc<dyn MarketStore>,
        universe: Arc<dyn UniverseStore>,
        market_data: Arc<dyn MarketDataStore>,
        watermarks: Arc<dyn WatermarkStore>,
        max_trade_age_seconds: f64,
        approval_required: bool,
        stake: Decimal,
    ) -> Self {
        Self {
            processor,
            trigger_tracker,
            strategy,
            watchlist,
            order_manager,
            position_tracker,
            candidates,
            approvals,
            markets,
            universe,
            market_data,
            watermarks,
            max_trade_age_seconds,
            approval_required,
            stake,
        }
    }

    /// Process one ingest event through the full pipeline.
    pub async fn handle_event(&self, event: &IngestEvent) -> Result<PipelineOutcome> {
        if !EventProcessor::should_process(event) {
            return Ok(PipelineOutcome::Ignored);
        }

        self.capture_market_data(event).await;

        let now = Utc::now();
        let Some(trigger) = self.processor.extract_trigger(event, now) else {
            return Ok(PipelineOutcome::Ignored);
        };

        // Keep position marks fresh on every price-bearing event.
        self.position_tracker
            .update_current_price(&trigger.token_id, trigger.price);

        if trigger.trade_age_seconds > self.max_trade_age_seconds {
            debug!(
                token = %trigger.token_id,
                age = trigger.trade_age_seconds,
                "Dropping stale event"
            );
            return Ok(PipelineOutcome::Stale);
        }

        if !self.processor.meets_threshold(trigger.price) {
            return Ok(PipelineOutcome::BelowThreshold);
        }

        let threshold = self.processor.threshold();
        let context = self.processor.build_context(&*self.markets, &trigger, now).await?;
        let decision = self.strategy.evaluate(&context);
        let score = match &decision {
            Decision::Execute { score, .. } | Decision::Watch { score } => Some(*score),
            Decision::Reject { .. } => None,
        };

        // The single gate for at-most-once semantics. Everything after this
        // point happens at most once per (condition, threshold).
        let recorded = self
            .trigger_tracker
            .try_record_trigger_atomic(&trigger, threshold, score)
            .await?;
        if !recorded {
            return Ok(PipelineOutcome::NotFirst);
        }

        self.universe
            .record_strategy_signal(&trigger.condition_id)
            .await?;

        if let Some(reason) = self.processor.apply_filters(&context) {
            info!(
                token = %trigger.token_id,
                reason = %reason,
                "Trigger filtered"
            );
            return Ok(PipelineOutcome::Filtered(reason));
        }

        match decision {
            Decision::Execute { score, stake } => {
                self.record_candidate(&trigger, threshold, score, CandidateStatus::Approved, None)
                    .await?;
                self.execute_entry(&trigger, &context, threshold, stake).await
            }
            Decision::Watch { score } => {
                self.record_candidate(&trigger, threshold, score, CandidateStatus::Pending, None)
                    .await?;
                self.watchlist
                    .add_to_watchlist(
                        trigger.token_id.clone(),
                        trigger.condition_id.clone(),
                        score,
                        context.time_to_end_hours.unwrap_or(f64::MAX),
                        Some(trigger.price),
                        context.question.clone(),
                    )
                    .await?;
                Ok(PipelineOutcome::Watching)
            }
            Decision::Reject { reason } => {
                self.record_candidate(
                    &trigger,
                    threshold,
                    context.probability(),
                    CandidateStatus::Rejected,
                    Some(reason.clone()),
                )
                .await?;
                Ok(PipelineOutcome::Rejected(reason))
            }
        }
    }

    /// Execute a watchlist promotion: buy at the stored trigger price.
    pub async fn execute_promotion(&self, promotion: &Promotion) -> Result<PipelineOutcome> {
        let Some(price) = promotion.trigger_price else {
            return Ok(PipelineOutcome::Rejected("promotion without price".into()));
        };
        info!(
            token = %promotion.token_id,
            score = promotion.score,
            "Executing watchlist promotion"
        );
        let trigger = TriggerData {
            token_id: promotion.token_id.clone(),
            condition_id: promotion.condition_id.clone(),
            price,
            size: None,
            trade_age_seconds: 0.0,
            timestamp: Utc::now(),
        };
        let context = StrategyContext {
            token_id: promotion.token_id.clone(),
            condition_id: promotion.condition_id.clone(),
            trigger_price: price,
            size: None,
            trade_age_seconds: 0.0,
            question: promotion.question.clone(),
            outcome: String::new(),
            outcome_index: None,
            category: None,
            end_date: None,
            time_to_end_hours: None,
        };
        let threshold = self.processor.threshold();
        self.execute_entry(&trigger, &context, threshold, self.stake).await
    }

    /// Execute an exit signal.
    ///
    /// Resolution exits close the position directly at the resolution
    /// value; everything else submits a SELL and closes at its price.
    pub async fn execute_exit(&self, signal: &ExitSignal) -> Result<()> {
        let now = Utc::now();
        let position = self.position_tracker.get(&signal.position_id);
        let fallback = position.as_ref().map_or(Decimal::ZERO, |p| {
            p.current_price.unwrap_or(p.entry_price)
        });
        let price = signal.target_price.unwrap_or(fallback);

        if signal.exit_type == ExitType::Resolution {
            self.position_tracker
                .close_position(&signal.position_id, price, signal.exit_type, None, now)
                .await?;
            return Ok(());
        }

        match self
            .order_manager
            .submit_order(
                signal.token_id.clone(),
                signal.condition_id.clone(),
                Side::Sell,
                price,
                signal.size,
            )
            .await
        {
            Ok(order_id) => {
                self.position_tracker
                    .close_position(
                        &signal.position_id,
                        price,
                        signal.exit_type,
                        Some(order_id),
                        now,
                    )
                    .await?;
                Ok(())
            }
            Err(e) => {
                warn!(
                    position = %signal.position_id,
                    error = %e,
                    "Exit order failed; position stays open for the next tick"
                );
                Ok(())
            }
        }
    }

    async fn execute_entry(
        &self,
        trigger: &TriggerData,
        context: &StrategyContext,
        threshold: Decimal,
        stake: Decimal,
    ) -> Result<PipelineOutcome> {
        if self.approval_required {
            let approval = self.approvals.pending_for(&trigger.token_id).await?;
            let covered = approval
                .as_ref()
                .is_some_and(|a| a.covers(trigger.price, Utc::now()));
            if !covered {
                info!(token = %trigger.token_id, "Entry held for approval");
                return Ok(PipelineOutcome::AwaitingApproval);
            }
        }

        match self
            .order_manager
            .submit_order(
                trigger.token_id.clone(),
                trigger.condition_id.clone(),
                Side::Buy,
                trigger.price,
                stake,
            )
            .await
        {
            Ok(order_id) => {
                self.candidates
                    .set_status(
                        &trigger.token_id,
                        &trigger.condition_id,
                        threshold,
                        CandidateStatus::Executed,
                        Some(&order_id),
                    )
                    .await?;
                if self.approval_required {
                    self.approvals.mark_executed(&trigger.token_id).await?;
                }
                info!(
                    order_id = %order_id,
                    token = %trigger.token_id,
                    question = %context.question,
                    price = %trigger.price,
                    "Entry submitted"
                );
                Ok(PipelineOutcome::Executed(order_id))
            }
            Err(Error::Execution(e)) => {
                let reason = e.to_string();
                warn!(token = %trigger.token_id, reason = %reason, "Entry rejected");
                self.candidates
                    .set_status(
                        &trigger.token_id,
                        &trigger.condition_id,
                        threshold,
                        CandidateStatus::Rejected,
                        None,
                    )
                    .await?;
                Ok(PipelineOutcome::Rejected(reason))
            }
            Err(e) => Err(e),
        }
    }

    async fn record_candidate(
        &self,
        trigger: &TriggerData,
        threshold: Decimal,
        score: f64,
        status: CandidateStatus,
        reason: Option<String>,
    ) -> Result<()> {
        let candidate = Candidate {
            token_id: trigger.token_id.clone(),
            condition_id: trigger.condition_id.clone(),
            threshold,
            trigger_price: trigger.price,
            score,
            status,
            reason,
            order_id: None,
            created_at: Utc::now(),
            decided_at: None,
        };
        self.candidates.upsert(&candidate).await?;
        self.watermarks
            .update(
                streams::CANDIDATES,
                &threshold.normalize().to_string(),
                candidate.created_at.timestamp_millis(),
            )
            .await?;
        Ok(())
    }

    /// Persist tier-2/3 market data from price-bearing events.
    async fn capture_market_data(&self, event: &IngestEvent) {
        match event {
            IngestEvent::Book(book) => {
                if let Err(e) = self.market_data.record_book_snapshot(book).await {
                    debug!(error = %e, "Book snapshot write failed");
                }
                if let (Some(price), Some(at)) = (
                    book.last_trade_price.or_else(|| book.best_bid()),
                    book.timestamp,
                ) {
                    if let Err(e) = self
                        .market_data
                        .upsert_candle(&book.token_id, price, None, at)
                        .await
                    {
                        debug!(error = %e, "Candle write failed");
                    }
                }
            }
            IngestEvent::PriceChange(tick)
            | IngestEvent::LastTradePrice(tick)
            | IngestEvent::PriceUpdate(tick) => {
                if let (Some(price), Some(at)) = (tick.effective_price(), tick.timestamp) {
                    if let Err(e) = self
                        .market_data
                        .upsert_candle(&tick.token_id, price, tick.size, at)
                        .await
                    {
                        debug!(error = %e, "Candle write failed");
                    }
                }
            }
            IngestEvent::Trade(tick) => {
                if let (Some(price), Some(at)) = (tick.price, tick.timestamp) {
                    if let Err(e) = self
                        .market_data
                        .upsert_candle(&tick.token_id, price, tick.size, at)
                        .await
                    {
                        debug!(error = %e, "Candle write failed");
                    }
                }
            }
            IngestEvent::Heartbeat | IngestEvent::Ack | IngestEvent::Unknown => {}
        }
    }
}
