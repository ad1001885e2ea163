//! Integration test: channel lifecycle end to end.
//!
//! Drives open → confirm → micropay → top-up → pause/resume → close →
//! settle across the controller, store, and settlement collaborator.

use std::sync::Arc;

use paylane_channel::ChannelError;
use paylane_core::{Amount, ChannelState, CoreError};
use paylane_integration_tests::{engine, engine_with, peer, FlakySettlement};

#[tokio::test]
async fn test_full_lifecycle_happy_path() {
    let fx = engine();

    let channel = fx.lifecycle.open(peer(), Amount::new(100), 24).unwrap();
    assert_eq!(channel.state, ChannelState::Pending);
    assert_eq!(channel.capacity, Amount::new(100));
    assert_eq!(channel.local_balance, Amount::new(100));
    assert_eq!(channel.remote_balance, Amount::ZERO);

    fx.lifecycle.confirm(channel.id).unwrap();
    let applied = fx.lifecycle.micropay(channel.id, Amount::new(30)).unwrap();
    assert_eq!(applied.local_balance, Amount::new(70));
    assert_eq!(applied.remote_balance, Amount::new(30));

    fx.lifecycle.top_up(channel.id, Amount::new(50)).unwrap();
    let snapshot = fx.store.get(channel.id).unwrap();
    assert_eq!(snapshot.capacity, Amount::new(150));
    assert_eq!(snapshot.local_balance, Amount::new(120));
    assert!(snapshot.invariant_holds());

    fx.lifecycle.pause(channel.id).unwrap();
    // Balance mutations are frozen while paused.
    assert!(matches!(
        fx.lifecycle.micropay(channel.id, Amount::new(1)),
        Err(ChannelError::NotActive(_, ChannelState::Paused))
    ));
    fx.lifecycle.resume(channel.id).unwrap();

    fx.lifecycle.close(channel.id).unwrap();
    let receipt = fx.lifecycle.settle(channel.id).await.unwrap();
    assert_eq!(receipt.local_balance, Amount::new(120));
    assert_eq!(receipt.remote_balance, Amount::new(30));

    let archived = fx.store.get(channel.id).unwrap();
    assert_eq!(archived.state, ChannelState::Closed);
    assert!(archived.invariant_holds());
}

#[tokio::test]
async fn test_settlement_failure_then_retry() {
    let fx = engine_with(Arc::new(FlakySettlement::new(2)));

    let channel = fx.lifecycle.open(peer(), Amount::new(40), 12).unwrap();
    fx.lifecycle.confirm(channel.id).unwrap();
    fx.lifecycle.micropay(channel.id, Amount::new(10)).unwrap();
    fx.lifecycle.close(channel.id).unwrap();

    // Two failures leave the channel Closing each time.
    for _ in 0..2 {
        let result = fx.lifecycle.settle(channel.id).await;
        assert!(matches!(result, Err(ChannelError::SettlementFailure(_))));
        assert_eq!(fx.store.get(channel.id).unwrap().state, ChannelState::Closing);
    }

    // Third attempt lands.
    let receipt = fx.lifecycle.settle(channel.id).await.unwrap();
    assert_eq!(receipt.local_balance, Amount::new(30));
    assert_eq!(receipt.remote_balance, Amount::new(10));
    assert_eq!(fx.store.get(channel.id).unwrap().state, ChannelState::Closed);

    // Terminal: no transition accepted afterwards.
    assert!(matches!(
        fx.lifecycle.close(channel.id),
        Err(ChannelError::Core(CoreError::InvalidTransition { .. }))
    ));
    assert!(fx.lifecycle.settle(channel.id).await.is_err());
}

#[tokio::test]
async fn test_overdraft_rejected_balances_unchanged() {
    let fx = engine();

    let channel = fx.lifecycle.open(peer(), Amount::new(10), 24).unwrap();
    fx.lifecycle.confirm(channel.id).unwrap();

    let result = fx.lifecycle.micropay(channel.id, Amount::new(15));
    assert!(matches!(
        result,
        Err(ChannelError::InsufficientBalance {
            available: 10,
            required: 15
        })
    ));

    let snapshot = fx.store.get(channel.id).unwrap();
    assert_eq!(snapshot.local_balance, Amount::new(10));
    assert_eq!(snapshot.remote_balance, Amount::ZERO);
}

#[tokio::test]
async fn test_idempotent_transitions() {
    let fx = engine();

    let channel = fx.lifecycle.open(peer(), Amount::new(10), 24).unwrap();
    fx.lifecycle.confirm(channel.id).unwrap();

    // Repeats are no-op successes.
    assert_eq!(
        fx.lifecycle.confirm(channel.id).unwrap().state,
        ChannelState::Active
    );
    fx.lifecycle.pause(channel.id).unwrap();
    assert_eq!(
        fx.lifecycle.pause(channel.id).unwrap().state,
        ChannelState::Paused
    );
    fx.lifecycle.resume(channel.id).unwrap();
    assert_eq!(
        fx.lifecycle.resume(channel.id).unwrap().state,
        ChannelState::Active
    );
    fx.lifecycle.close(channel.id).unwrap();
    assert_eq!(
        fx.lifecycle.close(channel.id).unwrap().state,
        ChannelState::Closing
    );
}

#[tokio::test]
async fn test_transfer_history_accumulates() {
    let fx = engine();

    let channel = fx.lifecycle.open(peer(), Amount::new(100), 24).unwrap();
    fx.lifecycle.confirm(channel.id).unwrap();
    fx.lifecycle.micropay(channel.id, Amount::new(5)).unwrap();
    fx.lifecycle.micropay(channel.id, Amount::new(7)).unwrap();

    let snapshot = fx.store.get(channel.id).unwrap();
    assert_eq!(snapshot.transfers.len(), 2);
    assert_eq!(snapshot.transfers[0].amount, Amount::new(5));
    assert_eq!(snapshot.transfers[1].amount, Amount::new(7));
    // Content hashes are unique per transfer.
    assert_ne!(snapshot.transfers[0].hash, snapshot.transfers[1].hash);
}

#[tokio::test]
async fn test_channels_are_independent() {
    let fx = engine();

    let a = fx.lifecycle.open(peer(), Amount::new(100), 24).unwrap();
    let b = fx.lifecycle.open(peer(), Amount::new(200), 24).unwrap();
    fx.lifecycle.confirm(a.id).unwrap();
    fx.lifecycle.confirm(b.id).unwrap();

    fx.lifecycle.micropay(a.id, Amount::new(60)).unwrap();
    fx.lifecycle.pause(b.id).unwrap();

    // a unaffected by b's pause; b unaffected by a's payment.
    assert_eq!(fx.store.get(a.id).unwrap().state, ChannelState::Active);
    let b_snapshot = fx.store.get(b.id).unwrap();
    assert_eq!(b_snapshot.state, ChannelState::Paused);
    assert_eq!(b_snapshot.local_balance, Amount::new(200));

    let stats = fx.store.stats();
    assert_eq!(stats.active_channels, 2);
    assert_eq!(stats.total_capacity, Amount::new(300));
}
