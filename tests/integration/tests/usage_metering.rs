//! Integration test: metered device usage billed to channels.
//!
//! Exercises meter/device registration, scope and cap enforcement,
//! credential rotation, and the interplay of all three balance mutation
//! sources on one channel.

use chrono::Duration;
use paylane_core::{Amount, ChannelId, ChannelState};
use paylane_integration_tests::{engine, peer, Engine};
use paylane_meter::MeterError;
use std::collections::HashSet;

fn active_channel(fx: &Engine, deposit: u128) -> ChannelId {
    let channel = fx.lifecycle.open(peer(), Amount::new(deposit), 24).unwrap();
    fx.lifecycle.confirm(channel.id).unwrap();
    channel.id
}

#[tokio::test]
async fn test_usage_billed_to_channel() {
    let fx = engine();
    let channel_id = active_channel(&fx, 1_000);

    let meter = fx
        .meters
        .create_meter("inference-tokens", "1k tokens", Amount::new(3))
        .unwrap();
    let mut scopes = HashSet::new();
    scopes.insert(meter.id);
    let device = fx
        .devices
        .create_device("edge-unit-1", scopes, Amount::new(500))
        .unwrap();

    let charge = fx
        .metering
        .record_usage(device.id, meter.id, 40, channel_id)
        .unwrap();
    assert_eq!(charge.charged, Amount::new(120));

    let snapshot = fx.store.get(channel_id).unwrap();
    assert_eq!(snapshot.local_balance, Amount::new(880));
    assert_eq!(snapshot.remote_balance, Amount::new(120));
    assert!(snapshot.invariant_holds());
}

#[tokio::test]
async fn test_cap_enforcement_scenario() {
    let fx = engine();
    let channel_id = active_channel(&fx, 1_000);

    let meter = fx
        .meters
        .create_meter("api-calls", "call", Amount::new(1))
        .unwrap();
    let mut scopes = HashSet::new();
    scopes.insert(meter.id);
    let device = fx
        .devices
        .create_device("edge-unit-1", scopes, Amount::new(100))
        .unwrap();

    // 90 charged this month already.
    fx.metering
        .record_usage(device.id, meter.id, 90, channel_id)
        .unwrap();
    assert_eq!(fx.metering.rolling_total(device.id), Amount::new(90));

    // 15 more breaches the cap: no record, no balance change.
    let result = fx.metering.record_usage(device.id, meter.id, 15, channel_id);
    assert!(matches!(result, Err(MeterError::CapExceeded { .. })));
    assert_eq!(fx.metering.charges_for_device(device.id).len(), 1);
    assert_eq!(
        fx.store.get(channel_id).unwrap().remote_balance,
        Amount::new(90)
    );
}

#[tokio::test]
async fn test_scope_and_disable_rejections() {
    let fx = engine();
    let channel_id = active_channel(&fx, 1_000);

    let in_scope = fx
        .meters
        .create_meter("api-calls", "call", Amount::new(1))
        .unwrap();
    let out_of_scope = fx
        .meters
        .create_meter("storage", "GB", Amount::new(2))
        .unwrap();
    let mut scopes = HashSet::new();
    scopes.insert(in_scope.id);
    let device = fx
        .devices
        .create_device("edge-unit-1", scopes, Amount::new(100))
        .unwrap();

    assert!(matches!(
        fx.metering
            .record_usage(device.id, out_of_scope.id, 1, channel_id),
        Err(MeterError::ScopeViolation { .. })
    ));

    fx.devices.set_enabled(device.id, false).unwrap();
    assert!(matches!(
        fx.metering.record_usage(device.id, in_scope.id, 1, channel_id),
        Err(MeterError::ScopeViolation { .. })
    ));

    fx.devices.set_enabled(device.id, true).unwrap();
    assert!(fx
        .metering
        .record_usage(device.id, in_scope.id, 1, channel_id)
        .is_ok());
}

#[tokio::test]
async fn test_credential_rotation_atomic_swap() {
    let fx = engine();

    let device = fx
        .devices
        .create_device("edge-unit-1", HashSet::new(), Amount::new(100))
        .unwrap();
    let old_token = device.credential.token.clone();

    let next = fx.devices.rotate_credential(device.id).unwrap();
    assert_eq!(next.version, device.credential.version + 1);

    // Old token is invalid the instant the swap lands; new one works.
    assert!(fx.devices.authenticate(device.id, &old_token).is_err());
    assert!(fx.devices.authenticate(device.id, &next.token).is_ok());
}

#[tokio::test]
async fn test_old_charges_age_out_of_window() {
    let fx = engine();
    let channel_id = active_channel(&fx, 1_000);

    let meter = fx
        .meters
        .create_meter("api-calls", "call", Amount::new(1))
        .unwrap();
    let mut scopes = HashSet::new();
    scopes.insert(meter.id);
    let device = fx
        .devices
        .create_device("edge-unit-1", scopes, Amount::new(100))
        .unwrap();

    let long_ago = chrono::Utc::now() - Duration::days(45);
    fx.metering
        .record_usage_at(device.id, meter.id, 80, channel_id, long_ago)
        .unwrap();

    // The aged-out charge frees the whole cap again.
    assert_eq!(fx.metering.rolling_total(device.id), Amount::ZERO);
    assert!(fx
        .metering
        .record_usage(device.id, meter.id, 100, channel_id)
        .is_ok());
}

#[tokio::test]
async fn test_all_three_mutation_sources_preserve_invariant() {
    let fx = engine();
    let channel_id = active_channel(&fx, 1_000);

    // Manual micropayment.
    fx.lifecycle.micropay(channel_id, Amount::new(100)).unwrap();

    // Stream flush.
    let stream = fx.streams.start(channel_id, Amount::new(5)).unwrap();
    fx.streams
        .flush_at(stream.id, stream.accrual_mark + Duration::seconds(20))
        .unwrap();

    // Metered usage.
    let meter = fx
        .meters
        .create_meter("api-calls", "call", Amount::new(2))
        .unwrap();
    let mut scopes = HashSet::new();
    scopes.insert(meter.id);
    let device = fx
        .devices
        .create_device("edge-unit-1", scopes, Amount::new(500))
        .unwrap();
    fx.metering
        .record_usage(device.id, meter.id, 25, channel_id)
        .unwrap();

    // 100 + 100 + 50 moved, capacity untouched.
    let snapshot = fx.store.get(channel_id).unwrap();
    assert_eq!(snapshot.capacity, Amount::new(1_000));
    assert_eq!(snapshot.local_balance, Amount::new(750));
    assert_eq!(snapshot.remote_balance, Amount::new(250));
    assert!(snapshot.invariant_holds());
    assert_eq!(snapshot.transfers.len(), 3);

    // The full lifecycle still completes.
    fx.lifecycle.close(channel_id).unwrap();
    let receipt = fx.lifecycle.settle(channel_id).await.unwrap();
    assert_eq!(receipt.local_balance, Amount::new(750));
    assert_eq!(receipt.remote_balance, Amount::new(250));
    assert_eq!(
        fx.store.get(channel_id).unwrap().state,
        ChannelState::Closed
    );
}
