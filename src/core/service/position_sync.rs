//! Reconciles local positions with the venue's view.
//!
//! Imports positions the bot does not know about, fixes drifted sizes, and
//! closes positions the venue no longer reports. The hold policy decides
//! whether freshly imported positions get a full holding window or are
//! treated as mature so exit rules apply immediately.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::core::domain::{ExitType, Position};
use crate::core::exchange::Venue;
use crate::core::execution::PositionTracker;
use crate::error::Result;

/// Holding-window policy for imported positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldPolicy {
    /// The holding window starts fresh at import (default).
    New,
    /// Backdate the hold start so exit rules apply immediately.
    Mature { days: i64 },
}

/// Default holding window for imported positions, in hours (7 days).
pub const IMPORTED_HOLD_HOURS: f64 = 168.0;

/// Outcome counters from one position sync.
#[derive(Debug, Clone, Default)]
pub struct PositionSyncReport {
    pub positions_found: usize,
    pub positions_imported: usize,
    pub positions_updated: usize,
    pub positions_closed: usize,
    pub errors: Vec<String>,
}

/// Venue-to-local position synchronizer.
pub struct PositionSyncService {
    venue: Arc<dyn Venue>,
    tracker: Arc<PositionTracker>,
}

impl PositionSyncService {
    #[must_use]
    pub fn new(venue: Arc<dyn Venue>, tracker: Arc<PositionTracker>) -> Self {
        Self { venue, tracker }
    }

    /// Reconcile local open positions against the venue.
    pub async fn sync_positions(
        &self,
        dry_run: bool,
        policy: HoldPolicy,
    ) -> Result<PositionSyncReport> {
        let venue_positions = self.venue.positions().await?;
        let local = self.tracker.open_positions();
        let mut report = PositionSyncReport {
            positions_found: venue_positions.len(),
            ..PositionSyncReport::default()
        };
        let now = Utc::now();

        for vp in &venue_positions {
            if vp.size <= Decimal::ZERO {
                continue;
            }
            match local.iter().find(|p| p.token_id == vp.token_id) {
                None => {
                    report.positions_imported += 1;
                    if dry_run {
                        continue;
                    }
                    let condition_id = vp
                        .condition_id
                        .clone()
                        .unwrap_or_else(|| crate::core::domain::ConditionId::from(""));
                    let mut position = Position::open(
                        vp.token_id.clone(),
                        condition_id,
                        vp.size,
                        vp.avg_price,
                        now,
                    );
                    position.hold_hours = IMPORTED_HOLD_HOURS;
                    if let HoldPolicy::Mature { days } = policy {
                        position.hold_start_at = now - Duration::days(days);
                    }
                    position.current_price = vp.current_price;
                    info!(
                        token = %position.token_id,
                        size = %position.size,
                        policy = ?policy,
                        "Importing venue position"
                    );
                    if let Err(e) = self.tracker.import_position(position) {
                        report.errors.push(e.to_string());
                    }
                }
                Some(existing) if existing.size != vp.size => {
                    report.positions_updated += 1;
                    if dry_run {
                        continue;
                    }
                    info!(
                        token = %vp.token_id,
                        local = %existing.size,
                        venue = %vp.size,
                        "Correcting drifted position size"
                    );
                    if let Err(e) =
                        self.tracker
                            .overwrite_size(&existing.id, vp.size, vp.avg_price)
                    {
                        report.errors.push(e.to_string());
                    }
                }
                Some(_) => {}
            }
        }

        // Local open positions the venue no longer reports are gone: closed
        // or redeemed out-of-band.
        for position in &local {
            let still_held = venue_positions
                .iter()
                .any(|vp| vp.token_id == position.token_id && vp.size > Decimal::ZERO);
            if still_held {
                continue;
            }
            report.positions_closed += 1;
            if dry_run {
                continue;
            }
            let exit_price = position.current_price.unwrap_or(position.entry_price);
            warn!(
                token = %position.token_id,
                "Position vanished from venue; closing locally"
            );
            match self
                .tracker
                .close_position(&position.id, exit_price, ExitType::Manual, None, now)
                .await
            {
                Ok(_) => {}
                Err(e) => report.errors.push(e.to_string()),
            }
        }

        // Persist imports/updates outside the compare loop.
        if !dry_run {
            self.tracker.persist_all().await?;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{ConditionId, TokenId};
    use crate::core::exchange::VenuePosition;
    use crate::testkit::store::InMemoryStores;
    use crate::testkit::venue::ScriptedVenue;
    use rust_decimal_macros::dec;

    fn venue_position(token: &str, size: Decimal) -> VenuePosition {
        VenuePosition {
            token_id: TokenId::from(token),
            condition_id: Some(ConditionId::from("0xC")),
            size,
            avg_price: dec!(0.93),
            current_price: Some(dec!(0.96)),
        }
    }

    #[tokio::test]
    async fn imports_unknown_positions_with_fresh_hold() {
        let stores = InMemoryStores::new();
        let tracker = Arc::new(PositionTracker::new(stores.positions()));
        let venue = Arc::new(
            ScriptedVenue::new(dec!(1000)).with_positions(vec![venue_position("tok_v", dec!(50))]),
        );
        let service = PositionSyncService::new(venue, tracker.clone());

        let report = service.sync_positions(false, HoldPolicy::New).await.unwrap();
        assert_eq!(report.positions_imported, 1);
        assert_eq!(report.positions_closed, 0);

        let open = tracker.open_positions();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].size, dec!(50));
        assert_eq!(open[0].hold_hours, IMPORTED_HOLD_HOURS);
        // Fresh policy: the window has not elapsed.
        assert!(!open[0].holding_window_elapsed(Utc::now()));
    }

    #[tokio::test]
    async fn mature_policy_backdates_hold_start() {
        let stores = InMemoryStores::new();
        let tracker = Arc::new(PositionTracker::new(stores.positions()));
        let venue = Arc::new(
            ScriptedVenue::new(dec!(1000)).with_positions(vec![venue_position("tok_v", dec!(50))]),
        );
        let service = PositionSyncService::new(venue, tracker.clone());

        service
            .sync_positions(false, HoldPolicy::Mature { days: 8 })
            .await
            .unwrap();

        let open = tracker.open_positions();
        assert!(open[0].holding_window_elapsed(Utc::now()));
    }

    #[tokio::test]
    async fn corrects_drifted_sizes() {
        let stores = InMemoryStores::new();
        let tracker = Arc::new(PositionTracker::new(stores.positions()));
        tracker
            .import_position(Position::open(
                TokenId::from("tok_v"),
                ConditionId::from("0xC"),
                dec!(30),
                dec!(0.90),
                Utc::now(),
            ))
            .unwrap();

        let venue = Arc::new(
            ScriptedVenue::new(dec!(1000)).with_positions(vec![venue_position("tok_v", dec!(50))]),
        );
        let service = PositionSyncService::new(venue, tracker.clone());

        let report = service.sync_positions(false, HoldPolicy::New).await.unwrap();
        assert_eq!(report.positions_updated, 1);
        assert_eq!(tracker.open_positions()[0].size, dec!(50));
    }

    #[tokio::test]
    async fn closes_vanished_positions() {
        let stores = InMemoryStores::new();
        let tracker = Arc::new(PositionTracker::new(stores.positions()));
        tracker
            .import_position(Position::open(
                TokenId::from("tok_gone"),
                ConditionId::from("0xC"),
                dec!(30),
                dec!(0.90),
                Utc::now(),
            ))
            .unwrap();

        let venue = Arc::new(ScriptedVenue::new(dec!(1000)));
        let service = PositionSyncService::new(venue, tracker.clone());

        let report = service.sync_positions(false, HoldPolicy::New).await.unwrap();
        assert_eq!(report.positions_closed, 1);
        assert!(tracker.open_positions().is_empty());
    }

    #[tokio::test]
    async fn dry_run_changes_nothing() {
        let stores = InMemoryStores::new();
        let tracker = Arc::new(PositionTracker::new(stores.positions()));
        let venue = Arc::new(
            ScriptedVenue::new(dec!(1000)).with_positions(vec![venue_position("tok_v", dec!(50))]),
        );
        let service = PositionSyncService::new(venue, tracker.clone());

        let report = service.sync_positions(true, HoldPolicy::New).await.unwrap();
        assert_eq!(report.positions_imported, 1);
        assert!(tracker.open_positions().is_empty());
    }
}
