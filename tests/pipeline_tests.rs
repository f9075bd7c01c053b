//! End-to-end pipeline behavior over in-memory stores and a scripted
//! venue: event ingestion through trigger dedup, strategy decisions, order
//! lifecycle, position tracking, and exits.

mod support;

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;

use support::{rig, RigOptions};
use thresher::app::PipelineOutcome;
use thresher::core::domain::{
    Approval, ApprovalStatus, ConditionId, IngestEvent, OrderStatus, PositionStatus, Side,
    TokenId, TradeTick,
};
use thresher::core::execution::MarketState;
use thresher::core::store::{
    streams, ApprovalStore, MarketStore, OrderStore, TradeStore, WatchlistStore, WatermarkStore,
};
use thresher::testkit::domain as fixtures;

fn trade_event_aged(token: &str, condition: &str, price: rust_decimal::Decimal, age: Duration) -> IngestEvent {
    IngestEvent::Trade(TradeTick {
        token_id: TokenId::from(token),
        condition_id: Some(ConditionId::from(condition)),
        price: Some(price),
        size: Some(dec!(50)),
        side: Some(Side::Buy),
        timestamp: Some(Utc::now() - age),
    })
}

async fn seed_market(rig: &support::Rig, condition: &str, question: &str, yes: &str, no: &str) {
    rig.stores
        .markets()
        .upsert_market(&fixtures::market(condition, question, yes, no))
        .await
        .unwrap();
}

#[tokio::test]
async fn trade_event_flows_to_filled_position() {
    let mut rig = rig(RigOptions::default());
    seed_market(&rig, "0xC", "Will X happen?", "tok_yes", "tok_no").await;
    rig.venue.script_ack("order_1");

    // High-probability trigger executes immediately.
    let outcome = rig
        .pipeline
        .handle_event(&fixtures::trade_event("tok_yes", "0xC", dec!(0.98)))
        .await
        .unwrap();
    let order_id = match outcome {
        PipelineOutcome::Executed(id) => id,
        other => panic!("expected execution, got {other:?}"),
    };

    // Venue reports the order fully matched; reconciliation emits the fill.
    rig.venue
        .script_status(order_id.as_str(), "MATCHED", dec!(20), Some(dec!(0.98)));
    let order = rig.order_manager.sync_order_status(&order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Filled);

    let fill = rig.fills.recv().await.unwrap();
    let position = rig
        .position_tracker
        .record_fill(&fill)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(position.size, dec!(20));
    assert_eq!(position.entry_price, dec!(0.98));

    // The position exits at the profit target and the SELL closes it.
    rig.venue.script_ack("exit_order_1");
    let state = MarketState {
        current_price: Some(dec!(0.99)),
        time_to_end_hours: Some(240.0),
        resolved: false,
        resolution_value: None,
    };
    let signal = rig
        .exit_manager
        .evaluate(&position, &state, Utc::now())
        .unwrap();
    rig.pipeline.execute_exit(&signal).await.unwrap();

    let closed = rig.position_tracker.get(&position.id).unwrap();
    assert_eq!(closed.status, PositionStatus::Closed);
    let events = rig
        .position_tracker
        .get_exit_events(&position.id)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    // 20 * (0.99 - 0.98) = 0.20
    assert_eq!(events[0].net_pnl, dec!(0.20));
}

#[tokio::test]
async fn concurrent_tokens_of_one_condition_trade_once() {
    let rig = Arc::new(rig(RigOptions::default()));
    seed_market(&rig, "0xC", "Will X happen?", "tok_Y", "tok_N").await;

    let a = {
        let rig = rig.clone();
        tokio::spawn(async move {
            rig.pipeline
                .handle_event(&fixtures::trade_event("tok_Y", "0xC", dec!(0.98)))
                .await
                .unwrap()
        })
    };
    let b = {
        let rig = rig.clone();
        tokio::spawn(async move {
            rig.pipeline
                .handle_event(&fixtures::trade_event("tok_N", "0xC", dec!(0.98)))
                .await
                .unwrap()
        })
    };

    let outcomes = [a.await.unwrap(), b.await.unwrap()];
    let executed = outcomes
        .iter()
        .filter(|o| matches!(o, PipelineOutcome::Executed(_)))
        .count();
    let deduped = outcomes
        .iter()
        .filter(|o| matches!(o, PipelineOutcome::NotFirst))
        .count();

    assert_eq!(executed, 1);
    assert_eq!(deduped, 1);
    assert_eq!(rig.stores.trigger_count(), 1);
}

#[tokio::test]
async fn stale_trade_is_dropped_without_trigger() {
    let rig = rig(RigOptions::default());
    seed_market(&rig, "0xC", "Will X happen?", "tok_A", "tok_B").await;

    let outcome = rig
        .pipeline
        .handle_event(&trade_event_aged("tok_A", "0xC", dec!(0.95), Duration::days(60)))
        .await
        .unwrap();

    assert_eq!(outcome, PipelineOutcome::Stale);
    assert_eq!(rig.stores.trigger_count(), 0);
}

#[tokio::test]
async fn freshness_boundary_is_inclusive() {
    let rig = rig(RigOptions::default());
    seed_market(&rig, "0xC", "Will X happen?", "tok_A", "tok_B").await;
    rig.venue.script_ack("order_1");

    // Just inside the 300s window still processes.
    let outcome = rig
        .pipeline
        .handle_event(&trade_event_aged("tok_A", "0xC", dec!(0.98), Duration::seconds(299)))
        .await
        .unwrap();
    assert!(matches!(outcome, PipelineOutcome::Executed(_)));
}

#[tokio::test]
async fn event_without_timestamp_is_ignored() {
    let rig = rig(RigOptions::default());
    let event = IngestEvent::Trade(TradeTick {
        token_id: TokenId::from("tok_A"),
        condition_id: Some(ConditionId::from("0xC")),
        price: Some(dec!(0.98)),
        size: None,
        side: None,
        timestamp: None,
    });
    let outcome = rig.pipeline.handle_event(&event).await.unwrap();
    assert_eq!(outcome, PipelineOutcome::Ignored);
    assert_eq!(rig.stores.trigger_count(), 0);
}

#[tokio::test]
async fn below_threshold_events_do_not_trigger() {
    let rig = rig(RigOptions::default());
    let outcome = rig
        .pipeline
        .handle_event(&fixtures::trade_event("tok_A", "0xC", dec!(0.94)))
        .await
        .unwrap();
    assert_eq!(outcome, PipelineOutcome::BelowThreshold);
    assert_eq!(rig.stores.trigger_count(), 0);
}

#[tokio::test]
async fn exact_threshold_crosses_and_watches() {
    let rig = rig(RigOptions::default());
    seed_market(&rig, "0xC", "Will X happen?", "tok_A", "tok_B").await;

    // 0.95 is at the trigger threshold but below the 0.97 execution score.
    let outcome = rig
        .pipeline
        .handle_event(&fixtures::trade_event("tok_A", "0xC", dec!(0.95)))
        .await
        .unwrap();
    assert_eq!(outcome, PipelineOutcome::Watching);
    assert_eq!(rig.stores.trigger_count(), 1);

    let entry = rig
        .stores
        .watchlist()
        .get(&TokenId::from("tok_A"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.trigger_price, Some(dec!(0.95)));
}

#[tokio::test]
async fn weather_market_is_filtered_but_trigger_recorded() {
    let rig = rig(RigOptions::default());
    seed_market(&rig, "0xW", "Will it rain in NYC tomorrow?", "tok_w", "tok_wn").await;

    let outcome = rig
        .pipeline
        .handle_event(&fixtures::trade_event("tok_w", "0xW", dec!(0.98)))
        .await
        .unwrap();
    assert!(matches!(outcome, PipelineOutcome::Filtered(_)));
    // The crossing itself is still a fact worth recording.
    assert_eq!(rig.stores.trigger_count(), 1);
    assert_eq!(rig.venue.submit_calls(), 0);
}

#[tokio::test]
async fn rainbow_six_is_not_weather() {
    let rig = rig(RigOptions::default());
    seed_market(
        &rig,
        "0xE",
        "Will Team A win Rainbow Six Siege tournament?",
        "tok_e",
        "tok_en",
    )
    .await;
    rig.venue.script_ack("order_rb6");

    let outcome = rig
        .pipeline
        .handle_event(&fixtures::trade_event("tok_e", "0xE", dec!(0.98)))
        .await
        .unwrap();
    assert!(matches!(outcome, PipelineOutcome::Executed(_)));
}

#[tokio::test]
async fn buy_above_cap_is_rejected_without_venue_call() {
    let rig = rig(RigOptions {
        max_buy_price: dec!(0.95),
        ..RigOptions::default()
    });
    seed_market(&rig, "0xC", "Will X happen?", "tok_A", "tok_B").await;

    let outcome = rig
        .pipeline
        .handle_event(&fixtures::trade_event("tok_A", "0xC", dec!(0.97)))
        .await
        .unwrap();

    assert!(matches!(outcome, PipelineOutcome::Rejected(_)));
    assert_eq!(rig.venue.submit_calls(), 0);
    // No order row, no reservation.
    assert!(rig
        .stores
        .orders()
        .open_orders()
        .await
        .unwrap()
        .is_empty());
    assert_eq!(rig.balance.reserved_total(), dec!(0));
}

#[tokio::test]
async fn partial_fill_adjusts_reservation_and_balance() {
    let mut rig = rig(RigOptions::default());
    seed_market(&rig, "0xC", "Will X happen?", "tok_A", "tok_B").await;
    rig.venue.script_ack("order_pf");

    // Buy 105 shares at ~0.952: a ~$100 reservation.
    let outcome = rig
        .pipeline
        .handle_event(&fixtures::trade_event("tok_A", "0xC", dec!(0.95)))
        .await
        .unwrap();
    // 0.95 watches rather than executing; drive the order directly instead.
    assert_eq!(outcome, PipelineOutcome::Watching);

    let order_id = rig
        .order_manager
        .submit_order(
            TokenId::from("tok_A"),
            ConditionId::from("0xC"),
            Side::Buy,
            dec!(0.95),
            dec!(105.263157894736842),
        )
        .await
        .unwrap();
    let reserved = rig.balance.get_reservation(&order_id).unwrap().amount;
    assert!((reserved - dec!(100)).abs() < dec!(0.01));

    let available_before = rig.balance.get_available_balance().await;

    // $40 of it fills.
    rig.venue.script_status(
        order_id.as_str(),
        "LIVE",
        dec!(42.105263157894737),
        Some(dec!(0.95)),
    );
    let order = rig.order_manager.sync_order_status(&order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Partial);

    let remaining = rig.balance.get_reservation(&order_id).unwrap().amount;
    assert!((remaining - dec!(60)).abs() < dec!(0.01));

    let available_after = rig.balance.get_available_balance().await;
    assert!((available_after - available_before - dec!(40)).abs() < dec!(0.01));

    let fill = rig.fills.recv().await.unwrap();
    assert!((fill.notional() - dec!(40)).abs() < dec!(0.01));
}

#[tokio::test]
async fn watermark_updates_never_move_backward() {
    let rig = rig(RigOptions::default());
    let watermarks = rig.stores.watermarks();

    let stored = watermarks.update(streams::TRIGGERS, "0.95", 2_000).await.unwrap();
    assert_eq!(stored, 2_000);
    let stored = watermarks.update(streams::TRIGGERS, "0.95", 1_000).await.unwrap();
    assert_eq!(stored, 2_000);
    assert_eq!(watermarks.get(streams::TRIGGERS, "0.95").await.unwrap(), 2_000);
}

#[tokio::test]
async fn trade_ingestion_is_idempotent() {
    let rig = rig(RigOptions::default());
    let trades = rig.stores.trades();
    let trade = thresher::core::domain::Trade {
        condition_id: ConditionId::from("0xC"),
        trade_id: "t1".into(),
        token_id: TokenId::from("tok_A"),
        price: dec!(0.95),
        size: dec!(10),
        side: Side::Buy,
        timestamp: Utc::now(),
    };

    assert_eq!(trades.upsert_trades(&[trade.clone()]).await.unwrap(), 1);
    assert_eq!(trades.upsert_trades(&[trade.clone()]).await.unwrap(), 0);
    assert_eq!(trades.upsert_trades(&[trade]).await.unwrap(), 0);
    assert_eq!(rig.stores.trade_count(), 1);
}

#[tokio::test]
async fn heartbeats_and_acks_are_ignored() {
    let rig = rig(RigOptions::default());
    assert_eq!(
        rig.pipeline.handle_event(&IngestEvent::Heartbeat).await.unwrap(),
        PipelineOutcome::Ignored
    );
    assert_eq!(
        rig.pipeline.handle_event(&IngestEvent::Ack).await.unwrap(),
        PipelineOutcome::Ignored
    );
}

#[tokio::test]
async fn approval_mode_holds_entries_until_covered() {
    let rig = rig(RigOptions {
        approval_required: true,
        ..RigOptions::default()
    });
    seed_market(&rig, "0xC", "Will X happen?", "tok_A", "tok_B").await;

    let outcome = rig
        .pipeline
        .handle_event(&fixtures::trade_event("tok_A", "0xC", dec!(0.98)))
        .await
        .unwrap();
    assert_eq!(outcome, PipelineOutcome::AwaitingApproval);
    assert_eq!(rig.venue.submit_calls(), 0);

    // With a covering approval on a second condition, the entry goes out.
    seed_market(&rig, "0xD", "Will Y happen?", "tok_D", "tok_Dn").await;
    rig.stores
        .approvals()
        .create(&Approval {
            token_id: TokenId::from("tok_D"),
            max_price: dec!(0.99),
            status: ApprovalStatus::Pending,
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::hours(1),
        })
        .await
        .unwrap();
    rig.venue.script_ack("order_approved");

    let outcome = rig
        .pipeline
        .handle_event(&fixtures::trade_event("tok_D", "0xD", dec!(0.98)))
        .await
        .unwrap();
    assert!(matches!(outcome, PipelineOutcome::Executed(_)));

    // The approval is consumed.
    let pending = rig
        .stores
        .approvals()
        .pending_for(&TokenId::from("tok_D"))
        .await
        .unwrap();
    assert!(pending.is_none());
}

#[tokio::test]
async fn book_events_capture_market_data() {
    let rig = rig(RigOptions::default());
    let frame = r#"{"event_type": "book", "asset_id": "tok_A", "market": "0xC",
                    "last_trade_price": "0.80",
                    "bids": [{"price": "0.79", "size": "100"}],
                    "asks": [{"price": "0.81", "size": "100"}],
                    "timestamp": 1704067200000}"#;
    let events = thresher::core::exchange::polymarket::messages::parse_frame(frame).unwrap();
    for event in &events {
        rig.pipeline.handle_event(event).await.unwrap();
    }
    assert_eq!(rig.stores.book_snapshot_count(), 1);
    assert_eq!(rig.stores.candle_point_count(), 1);
}

#[tokio::test]
async fn order_listing_rejects_unknown_sort_fields() {
    let rig = rig(RigOptions::default());
    let err = rig
        .stores
        .orders()
        .list("price; DROP TABLE orders", 10)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        thresher::error::Error::Invalid { field: "sort_by", .. }
    ));
    // Fields on the allow-list are accepted.
    rig.stores.orders().list("created_at", 10).await.unwrap();
}

#[tokio::test]
async fn double_cancel_still_succeeds() {
    let rig = rig(RigOptions::default());
    rig.venue.script_ack("order_c");
    let order_id = rig
        .order_manager
        .submit_order(
            TokenId::from("tok"),
            ConditionId::from("0xC"),
            Side::Buy,
            dec!(0.95),
            dec!(10),
        )
        .await
        .unwrap();

    assert!(rig.order_manager.cancel_order(&order_id).await.unwrap());
    assert!(rig.order_manager.cancel_order(&order_id).await.unwrap());
}
