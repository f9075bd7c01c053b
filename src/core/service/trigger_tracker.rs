//! First-trigger tracking with at-most-once semantics.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::debug;

use crate::core::domain::{ConditionId, TokenId, Trigger, TriggerData};
use crate::core::store::{streams, TriggerStore, WatermarkStore};
use crate::error::Result;

/// Enforces at-most-once first-trigger semantics per
/// `(condition_id, threshold)`.
pub struct TriggerTracker {
    triggers: Arc<dyn TriggerStore>,
    watermarks: Arc<dyn WatermarkStore>,
}

impl TriggerTracker {
    #[must_use]
    pub fn new(triggers: Arc<dyn TriggerStore>, watermarks: Arc<dyn WatermarkStore>) -> Self {
        Self {
            triggers,
            watermarks,
        }
    }

    /// Atomically record a first trigger; returns whether THIS call won.
    ///
    /// This is the only operation allowed to gate order submission. The
    /// read-only helpers below are for display and diagnostics.
    pub async fn try_record_trigger_atomic(
        &self,
        data: &TriggerData,
        threshold: Decimal,
        score: Option<f64>,
    ) -> Result<bool> {
        let trigger = Trigger::from_data(data, threshold, score);
        let recorded = self.triggers.try_record_atomic(&trigger).await?;

        if recorded {
            debug!(
                token = %trigger.token_id,
                condition = %trigger.condition_id,
                threshold = %threshold,
                price = %trigger.price,
                "First trigger recorded"
            );
            self.watermarks
                .update(
                    streams::TRIGGERS,
                    &threshold.normalize().to_string(),
                    data.timestamp.timestamp_millis(),
                )
                .await?;
        }
        Ok(recorded)
    }

    /// Read-only: would this exact token be a first trigger?
    pub async fn is_first_trigger(
        &self,
        token_id: &TokenId,
        condition_id: &ConditionId,
        threshold: Decimal,
    ) -> Result<bool> {
        self.triggers
            .is_first_trigger(token_id, condition_id, threshold)
            .await
    }

    /// Read-only: has any token of this condition triggered at this
    /// threshold?
    pub async fn has_condition_triggered(
        &self,
        condition_id: &ConditionId,
        threshold: Decimal,
    ) -> Result<bool> {
        self.triggers
            .has_condition_triggered(condition_id, threshold)
            .await
    }

    pub async fn get_trigger(
        &self,
        token_id: &TokenId,
        condition_id: &ConditionId,
        threshold: Decimal,
    ) -> Result<Option<Trigger>> {
        self.triggers.get(token_id, condition_id, threshold).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::store::InMemoryStores;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn data(token: &str, condition: &str) -> TriggerData {
        TriggerData {
            token_id: TokenId::from(token),
            condition_id: ConditionId::from(condition),
            price: dec!(0.96),
            size: Some(dec!(75)),
            trade_age_seconds: 1.0,
            timestamp: Utc::now(),
        }
    }

    fn tracker(stores: &InMemoryStores) -> TriggerTracker {
        TriggerTracker::new(stores.triggers(), stores.watermarks())
    }

    #[tokio::test]
    async fn records_first_trigger_once() {
        let stores = InMemoryStores::new();
        let tracker = tracker(&stores);

        let first = tracker
            .try_record_trigger_atomic(&data("tok_abc", "0x123"), dec!(0.95), Some(0.98))
            .await
            .unwrap();
        let second = tracker
            .try_record_trigger_atomic(&data("tok_abc", "0x123"), dec!(0.95), Some(0.98))
            .await
            .unwrap();

        assert!(first);
        assert!(!second);
    }

    #[tokio::test]
    async fn different_token_same_condition_is_blocked() {
        // Dual-key dedup: multiple token IDs map to one condition.
        let stores = InMemoryStores::new();
        let tracker = tracker(&stores);

        assert!(tracker
            .try_record_trigger_atomic(&data("tok_Y", "0xC"), dec!(0.95), None)
            .await
            .unwrap());
        assert!(!tracker
            .try_record_trigger_atomic(&data("tok_N", "0xC"), dec!(0.95), None)
            .await
            .unwrap());

        assert!(tracker
            .has_condition_triggered(&ConditionId::from("0xC"), dec!(0.95))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn same_token_different_condition_is_allowed() {
        let stores = InMemoryStores::new();
        let tracker = tracker(&stores);

        assert!(tracker
            .try_record_trigger_atomic(&data("tok_abc", "0x111"), dec!(0.95), None)
            .await
            .unwrap());
        assert!(tracker
            .try_record_trigger_atomic(&data("tok_abc", "0x222"), dec!(0.95), None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn different_thresholds_are_independent() {
        let stores = InMemoryStores::new();
        let tracker = tracker(&stores);

        assert!(tracker
            .try_record_trigger_atomic(&data("tok", "0xC"), dec!(0.90), None)
            .await
            .unwrap());
        assert!(tracker
            .try_record_trigger_atomic(&data("tok", "0xC"), dec!(0.95), None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn concurrent_contenders_see_one_winner() {
        let stores = InMemoryStores::new();
        let tracker = Arc::new(tracker(&stores));

        let mut handles = Vec::new();
        for i in 0..16 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                tracker
                    .try_record_trigger_atomic(
                        &data(&format!("tok_{i}"), "0xC"),
                        dec!(0.95),
                        None,
                    )
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn recording_advances_trigger_watermark() {
        let stores = InMemoryStores::new();
        let tracker = tracker(&stores);
        let d = data("tok", "0xC");

        tracker
            .try_record_trigger_atomic(&d, dec!(0.95), None)
            .await
            .unwrap();

        let watermark = stores
            .watermarks()
            .get(streams::TRIGGERS, "0.95")
            .await
            .unwrap();
        assert_eq!(watermark, d.timestamp.timestamp_millis());
    }

    #[tokio::test]
    async fn stored_trigger_is_retrievable() {
        let stores = InMemoryStores::new();
        let tracker = tracker(&stores);
        let d = data("tok_abc", "0x123");

        tracker
            .try_record_trigger_atomic(&d, dec!(0.95), Some(0.98))
            .await
            .unwrap();

        let trigger = tracker
            .get_trigger(&d.token_id, &d.condition_id, dec!(0.95))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(trigger.price, dec!(0.96));
        assert_eq!(trigger.score, Some(0.98));
    }
}
