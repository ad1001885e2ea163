use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use paylane_channel::{ChannelStore, TransferKind};
use paylane_core::{Amount, ChannelId, ChargeId, DeviceId, EngineConfig, MeterId};
use std::sync::Arc;

use crate::error::MeterError;
use crate::registry::{DeviceRegistry, MeterRegistry};
use crate::types::UsageCharge;

/// Converts metered device usage into channel charges.
///
/// The monthly-cap check and the charge application are evaluated under
/// the device's charge-log entry lock, so two concurrent reports from the
/// same device can never both pass the check and jointly exceed the cap.
/// Reports from different devices proceed in parallel; the channel-side
/// transfer is serialized by the channel store.
pub struct MeteringEngine {
    store: Arc<ChannelStore>,
    meters: Arc<MeterRegistry>,
    devices: Arc<DeviceRegistry>,
    /// Append-only charge log per device. The entry guard doubles as the
    /// per-device serialization point.
    charges: DashMap<DeviceId, Vec<UsageCharge>>,
    cap_window: Duration,
}

impl MeteringEngine {
    /// Create an engine over the given store and registries.
    pub fn new(
        store: Arc<ChannelStore>,
        meters: Arc<MeterRegistry>,
        devices: Arc<DeviceRegistry>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            meters,
            devices,
            charges: DashMap::new(),
            cap_window: Duration::days(config.cap_window_days as i64),
        }
    }

    /// Record a usage report and bill it to the channel.
    pub fn record_usage(
        &self,
        device_id: DeviceId,
        meter_id: MeterId,
        units: u64,
        channel_id: ChannelId,
    ) -> Result<UsageCharge, MeterError> {
        self.record_usage_at(device_id, meter_id, units, channel_id, Utc::now())
    }

    /// Record a usage report with an explicit clock reading.
    ///
    /// Order of checks: device scope and enablement, unit validity,
    /// charge computation, rolling-month cap, then the channel transfer.
    /// A rejection at any step leaves the charge log and the channel
    /// untouched.
    pub fn record_usage_at(
        &self,
        device_id: DeviceId,
        meter_id: MeterId,
        units: u64,
        channel_id: ChannelId,
        now: DateTime<Utc>,
    ) -> Result<UsageCharge, MeterError> {
        let device = self.devices.get(device_id)?;
        if !device.enabled {
            return Err(MeterError::ScopeViolation {
                device_id,
                meter_id,
                reason: "device disabled",
            });
        }
        if !device.scopes.contains(&meter_id) {
            return Err(MeterError::ScopeViolation {
                device_id,
                meter_id,
                reason: "meter not in device scopes",
            });
        }
        if units == 0 {
            return Err(MeterError::InvalidInput(
                "units must be greater than zero".into(),
            ));
        }

        let meter = self.meters.get(meter_id)?;
        let charged = meter
            .price_per_unit
            .checked_mul_units(units)
            .ok_or(MeterError::ChargeOverflow)?;

        // Per-device critical section: cap check, channel transfer, and
        // charge append all happen while the log entry is held.
        let mut log = self.charges.entry(device_id).or_default();

        let window_start = now - self.cap_window;
        let mut spent = Amount::ZERO;
        for charge in log.iter() {
            if charge.recorded_at > window_start {
                spent = spent
                    .checked_add(charge.charged)
                    .ok_or(MeterError::ChargeOverflow)?;
            }
        }
        let attempted = spent
            .checked_add(charged)
            .ok_or(MeterError::ChargeOverflow)?;
        if attempted > device.monthly_cap {
            return Err(MeterError::CapExceeded {
                cap: device.monthly_cap.value(),
                attempted: attempted.value(),
            });
        }

        self.store.transfer(
            channel_id,
            charged,
            TransferKind::UsageCharge,
            Some(format!("device {} meter {}", device_id, meter_id)),
        )?;

        let charge = UsageCharge {
            id: ChargeId::new(),
            meter_id,
            device_id,
            channel_id,
            units,
            charged,
            recorded_at: now,
        };
        log.push(charge.clone());

        tracing::info!(
            charge_id = %charge.id,
            device_id = %device_id,
            meter_id = %meter_id,
            channel_id = %channel_id,
            units,
            charged = %charged,
            "usage charge applied"
        );
        Ok(charge)
    }

    /// All charges recorded for a device, oldest first.
    pub fn charges_for_device(&self, device_id: DeviceId) -> Vec<UsageCharge> {
        self.charges
            .get(&device_id)
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Total charged to a device inside the rolling window ending at `now`.
    pub fn window_total_at(&self, device_id: DeviceId, now: DateTime<Utc>) -> Amount {
        let window_start = now - self.cap_window;
        let mut total = Amount::ZERO;
        if let Some(log) = self.charges.get(&device_id) {
            for charge in log.iter() {
                if charge.recorded_at > window_start {
                    total = total.checked_add(charge.charged).unwrap_or(total);
                }
            }
        }
        total
    }

    /// Total charged to a device inside the current rolling window.
    pub fn rolling_total(&self, device_id: DeviceId) -> Amount {
        self.window_total_at(device_id, Utc::now())
    }

    /// All charges across all devices.
    pub fn list_charges(&self) -> Vec<UsageCharge> {
        self.charges
            .iter()
            .flat_map(|log| log.value().clone())
            .collect()
    }

    /// Re-insert a charge loaded from durable storage.
    pub fn insert_restored(&self, charge: UsageCharge) {
        self.charges
            .entry(charge.device_id)
            .or_default()
            .push(charge);
    }
}
