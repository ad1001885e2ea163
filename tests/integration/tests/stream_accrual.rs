//! Integration test: stream accrual against live channels.
//!
//! Exercises lazy accrual, the channel pause/resume coupling, underfunded
//! auto-stop, and force-stop on closure across the stream engine and the
//! lifecycle controller.

use chrono::Duration;
use paylane_core::{Amount, ChannelState};
use paylane_integration_tests::{engine, peer};
use paylane_stream::{StopReason, StreamError};

#[tokio::test]
async fn test_accrual_flush_moves_value() {
    let fx = engine();

    let channel = fx.lifecycle.open(peer(), Amount::new(100), 24).unwrap();
    fx.lifecycle.confirm(channel.id).unwrap();

    let stream = fx.streams.start(channel.id, Amount::new(1)).unwrap();
    let outcome = fx
        .streams
        .flush_at(stream.id, stream.accrual_mark + Duration::seconds(40))
        .unwrap();
    assert_eq!(outcome.flushed, Amount::new(40));

    let snapshot = fx.store.get(channel.id).unwrap();
    assert_eq!(snapshot.local_balance, Amount::new(60));
    assert_eq!(snapshot.remote_balance, Amount::new(40));
    assert!(snapshot.invariant_holds());
}

#[tokio::test]
async fn test_stream_requires_active_channel() {
    let fx = engine();

    let channel = fx.lifecycle.open(peer(), Amount::new(100), 24).unwrap();
    // Still Pending.
    assert!(matches!(
        fx.streams.start(channel.id, Amount::new(1)),
        Err(StreamError::ChannelNotActive(_, ChannelState::Pending))
    ));
}

#[tokio::test]
async fn test_channel_pause_suspends_accrual() {
    let fx = engine();

    let channel = fx.lifecycle.open(peer(), Amount::new(100), 24).unwrap();
    fx.lifecycle.confirm(channel.id).unwrap();
    let stream = fx.streams.start(channel.id, Amount::new(1)).unwrap();

    // Channel pause force-pauses the stream through the lifecycle hook.
    fx.lifecycle.pause(channel.id).unwrap();
    let paused = fx.streams.get(stream.id).unwrap();
    assert!(paused.paused_by_channel);
    assert!(paused.is_paused());

    // Paused time accrues nothing.
    let later = paused.accrual_mark + Duration::seconds(300);
    assert_eq!(paused.active_ms_at(later), paused.banked_ms);

    // Resume reactivates it.
    fx.lifecycle.resume(channel.id).unwrap();
    assert!(fx.streams.get(stream.id).unwrap().is_running());
}

#[tokio::test]
async fn test_channel_resume_leaves_owner_paused_streams() {
    let fx = engine();

    let channel = fx.lifecycle.open(peer(), Amount::new(100), 24).unwrap();
    fx.lifecycle.confirm(channel.id).unwrap();
    let by_owner = fx.streams.start(channel.id, Amount::new(1)).unwrap();
    let by_channel = fx.streams.start(channel.id, Amount::new(2)).unwrap();

    fx.streams.pause(by_owner.id).unwrap();
    fx.lifecycle.pause(channel.id).unwrap();
    fx.lifecycle.resume(channel.id).unwrap();

    // Owner-paused stream stays paused; the other comes back.
    assert!(fx.streams.get(by_owner.id).unwrap().is_paused());
    assert!(fx.streams.get(by_channel.id).unwrap().is_running());
}

#[tokio::test]
async fn test_underfunded_stream_auto_stops_without_partial_transfer() {
    let fx = engine();

    let channel = fx.lifecycle.open(peer(), Amount::new(25), 24).unwrap();
    fx.lifecycle.confirm(channel.id).unwrap();
    let stream = fx.streams.start(channel.id, Amount::new(1)).unwrap();

    let result = fx
        .streams
        .flush_at(stream.id, stream.accrual_mark + Duration::seconds(40));
    assert!(matches!(
        result,
        Err(StreamError::Underfunded {
            accrued: 40,
            available: 25,
            ..
        })
    ));

    let snapshot = fx.store.get(channel.id).unwrap();
    assert_eq!(snapshot.local_balance, Amount::new(25));
    assert_eq!(snapshot.remote_balance, Amount::ZERO);
    assert_eq!(
        fx.streams.get(stream.id).unwrap().stopped,
        Some(StopReason::Underfunded)
    );
}

#[tokio::test]
async fn test_close_force_stops_streams() {
    let fx = engine();

    let channel = fx.lifecycle.open(peer(), Amount::new(100), 24).unwrap();
    fx.lifecycle.confirm(channel.id).unwrap();
    let a = fx.streams.start(channel.id, Amount::new(1)).unwrap();
    let b = fx.streams.start(channel.id, Amount::new(3)).unwrap();

    fx.lifecycle.close(channel.id).unwrap();

    assert_eq!(
        fx.streams.get(a.id).unwrap().stopped,
        Some(StopReason::ChannelClosed)
    );
    assert_eq!(
        fx.streams.get(b.id).unwrap().stopped,
        Some(StopReason::ChannelClosed)
    );

    // Close itself moved no balances.
    let snapshot = fx.store.get(channel.id).unwrap();
    assert_eq!(snapshot.local_balance, Amount::new(100));

    // And the settled channel accepts no new streams.
    fx.lifecycle.settle(channel.id).await.unwrap();
    assert!(fx.streams.start(channel.id, Amount::new(1)).is_err());
}

#[tokio::test]
async fn test_stream_flush_and_micropay_share_one_balance() {
    let fx = engine();

    let channel = fx.lifecycle.open(peer(), Amount::new(100), 24).unwrap();
    fx.lifecycle.confirm(channel.id).unwrap();
    let stream = fx.streams.start(channel.id, Amount::new(2)).unwrap();

    fx.lifecycle.micropay(channel.id, Amount::new(50)).unwrap();
    fx.streams
        .flush_at(stream.id, stream.accrual_mark + Duration::seconds(10))
        .unwrap();

    let snapshot = fx.store.get(channel.id).unwrap();
    assert_eq!(snapshot.local_balance, Amount::new(30));
    assert_eq!(snapshot.remote_balance, Amount::new(70));
    assert!(snapshot.invariant_holds());
    assert_eq!(snapshot.transfers.len(), 2);
}
