//! Position lifecycle: fills in, P&L out.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::core::domain::{
    ExitEvent, ExitStatus, ExitType, Fill, Order, OrderId, Position, PositionId, PositionStatus,
    Side, TokenId,
};
use crate::core::store::PositionStore;
use crate::error::Result;

/// Aggregates fills into positions and computes realized/unrealized P&L.
///
/// The in-memory map is owned here and re-hydrated from storage on
/// startup; on mismatch, storage wins.
pub struct PositionTracker {
    store: Arc<dyn PositionStore>,
    positions: RwLock<HashMap<PositionId, Position>>,
}

impl PositionTracker {
    #[must_use]
    pub fn new(store: Arc<dyn PositionStore>) -> Self {
        Self {
            store,
            positions: RwLock::new(HashMap::new()),
        }
    }

    /// Re-hydrate open positions from storage. Returns the count loaded.
    pub async fn load_positions(&self) -> Result<usize> {
        let open = self.store.open_positions().await?;
        let count = open.len();
        let mut positions = self.positions.write();
        positions.clear();
        for position in open {
            positions.insert(position.id.clone(), position);
        }
        info!(count, "Positions loaded from storage");
        Ok(count)
    }

    /// Apply a fill. BUY fills open or extend a position with a
    /// size-weighted entry price; SELL fills realize P&L and close the
    /// position when its size reaches zero. Zero-size fills do nothing.
    pub async fn record_fill(&self, fill: &Fill) -> Result<Option<Position>> {
        if fill.size <= Decimal::ZERO {
            return Ok(None);
        }

        let updated = {
            let mut positions = self.positions.write();
            let existing = positions
                .values_mut()
                .find(|p| p.is_open() && p.token_id == fill.token_id);

            match (fill.side, existing) {
                (Side::Buy, Some(position)) => {
                    let new_size = position.size + fill.size;
                    position.entry_price = (position.entry_price * position.size
                        + fill.price * fill.size)
                        / new_size;
                    position.size = new_size;
                    position.entry_cost += fill.notional();
                    position.clone()
                }
                (Side::Buy, None) => {
                    let position = Position::open(
                        fill.token_id.clone(),
                        fill.condition_id.clone(),
                        fill.size,
                        fill.price,
                        fill.timestamp,
                    );
                    positions.insert(position.id.clone(), position.clone());
                    position
                }
                (Side::Sell, Some(position)) => {
                    let sold = fill.size.min(position.size);
                    position.size -= sold;
                    position.realized_pnl += sold * (fill.price - position.entry_price);
                    if position.size == Decimal::ZERO {
                        position.status = PositionStatus::Closed;
                        position.exit_timestamp = Some(fill.timestamp);
                    }
                    position.clone()
                }
                (Side::Sell, None) => {
                    debug!(token = %fill.token_id, "Sell fill with no open position, ignoring");
                    return Ok(None);
                }
            }
        };

        self.store.upsert(&updated).await?;
        debug!(
            position = %updated.id,
            token = %updated.token_id,
            size = %updated.size,
            "Fill applied"
        );
        Ok(Some(updated))
    }

    /// Apply the filled portion of a terminal order as a fill.
    pub async fn record_order_fill(&self, order: &Order) -> Result<Option<Position>> {
        if order.filled_size <= Decimal::ZERO {
            return Ok(None);
        }
        let fill = Fill {
            order_id: order.id.clone(),
            token_id: order.token_id.clone(),
            condition_id: order.condition_id.clone(),
            side: order.side,
            size: order.filled_size,
            price: order.avg_fill_price.unwrap_or(order.price),
            timestamp: order.updated_at,
        };
        self.record_fill(&fill).await
    }

    /// Unrealized P&L for one position at `current_price`. Zero for
    /// unknown positions.
    #[must_use]
    pub fn calculate_pnl(&self, position_id: &PositionId, current_price: Decimal) -> Decimal {
        self.positions
            .read()
            .get(position_id)
            .map_or(Decimal::ZERO, |p| p.pnl_at(current_price))
    }

    /// Total unrealized P&L across open positions, given current prices by
    /// token. Positions without a price contribute zero.
    #[must_use]
    pub fn calculate_total_pnl(&self, prices: &HashMap<TokenId, Decimal>) -> Decimal {
        self.positions
            .read()
            .values()
            .filter(|p| p.is_open())
            .filter_map(|p| prices.get(&p.token_id).map(|price| p.pnl_at(*price)))
            .sum()
    }

    /// Record the latest observed price for a token's open positions.
    pub fn update_current_price(&self, token_id: &TokenId, price: Decimal) {
        let mut positions = self.positions.write();
        for position in positions.values_mut() {
            if position.is_open() && &position.token_id == token_id {
                position.current_price = Some(price);
                position.unrealized_pnl = Some(position.pnl_at(price));
            }
        }
    }

    /// Close a position, recording an [`ExitEvent`] audit row.
    ///
    /// Idempotent: closing an already-closed position returns `None`.
    pub async fn close_position(
        &self,
        position_id: &PositionId,
        exit_price: Decimal,
        exit_type: ExitType,
        exit_order_id: Option<OrderId>,
        now: DateTime<Utc>,
    ) -> Result<Option<ExitEvent>> {
        let (position, event) = {
            let mut positions = self.positions.write();
            let Some(position) = positions.get_mut(position_id) else {
                return Ok(None);
            };
            if !position.is_open() {
                return Ok(None);
            }

            let net_pnl = position.size * (exit_price - position.entry_price);
            let event = ExitEvent {
                position_id: position_id.clone(),
                exit_type,
                entry_price: position.entry_price,
                exit_price,
                size: position.size,
                gross_pnl: net_pnl,
                net_pnl,
                hours_held: position.hours_held(now),
                status: if exit_order_id.is_some() {
                    ExitStatus::Executed
                } else {
                    ExitStatus::Pending
                },
                created_at: now,
            };

            position.status = if exit_type == ExitType::Resolution {
                PositionStatus::Resolved
            } else {
                PositionStatus::Closed
            };
            position.realized_pnl += net_pnl;
            position.exit_order_id = exit_order_id;
            position.exit_timestamp = Some(now);
            (position.clone(), event)
        };

        self.store.upsert(&position).await?;
        self.store.record_exit(&event).await?;
        info!(
            position = %position_id,
            exit_type = exit_type.as_str(),
            net_pnl = %event.net_pnl,
            "Position closed"
        );
        Ok(Some(event))
    }

    pub async fn get_exit_events(&self, position_id: &PositionId) -> Result<Vec<ExitEvent>> {
        self.store.exits_for(position_id).await
    }

    /// Insert a position directly (venue import path).
    pub fn import_position(&self, position: Position) -> Result<()> {
        self.positions.write().insert(position.id.clone(), position);
        Ok(())
    }

    /// Overwrite a position's size and entry price (venue reconciliation;
    /// storage wins over local state, and the venue wins over storage).
    pub fn overwrite_size(
        &self,
        position_id: &PositionId,
        size: Decimal,
        avg_price: Decimal,
    ) -> Result<()> {
        let mut positions = self.positions.write();
        if let Some(position) = positions.get_mut(position_id) {
            position.size = size;
            position.entry_price = avg_price;
            position.entry_cost = size * avg_price;
        }
        Ok(())
    }

    /// Persist every tracked position.
    pub async fn persist_all(&self) -> Result<()> {
        let snapshot: Vec<Position> = self.positions.read().values().cloned().collect();
        for position in snapshot {
            self.store.upsert(&position).await?;
        }
        Ok(())
    }

    #[must_use]
    pub fn open_positions(&self) -> Vec<Position> {
        self.positions
            .read()
            .values()
            .filter(|p| p.is_open())
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn get(&self, position_id: &PositionId) -> Option<Position> {
        self.positions.read().get(position_id).cloned()
    }
}
