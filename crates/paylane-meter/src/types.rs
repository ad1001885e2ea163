use chrono::{DateTime, Utc};
use paylane_core::{Amount, ChannelId, ChargeId, DeviceId, MeterId};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A priced unit of measurable usage.
///
/// Immutable once created: re-pricing means creating a new meter, so
/// historical charges always reference the price they were billed at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meter {
    /// Unique meter ID.
    pub id: MeterId,
    /// Human-readable name (e.g. "inference-tokens").
    pub name: String,
    /// Unit of measure (e.g. "1k tokens").
    pub unit: String,
    /// Price per unit in atomic units.
    pub price_per_unit: Amount,
    /// When the meter was created.
    pub created_at: DateTime<Utc>,
}

/// A versioned device credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Opaque token, hex-encoded.
    pub token: String,
    /// Monotonic version; bumped on every rotation.
    pub version: u32,
    /// When this credential was issued.
    pub issued_at: DateTime<Utc>,
}

impl Credential {
    /// Issue a fresh credential at version 1.
    pub fn issue() -> Self {
        Self {
            token: Self::random_token(),
            version: 1,
            issued_at: Utc::now(),
        }
    }

    /// Build the successor credential. The caller swaps it in as a single
    /// field assignment under the device entry lock, so there is no
    /// window where neither token is valid.
    pub fn rotated(&self) -> Self {
        Self {
            token: Self::random_token(),
            version: self.version + 1,
            issued_at: Utc::now(),
        }
    }

    fn random_token() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}

/// A credentialed usage source scoped to a subset of meters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Unique device ID.
    pub id: DeviceId,
    /// Human-readable name.
    pub name: String,
    /// Current credential.
    pub credential: Credential,
    /// Meters this device may report usage for.
    pub scopes: HashSet<MeterId>,
    /// Maximum value chargeable per rolling month.
    pub monthly_cap: Amount,
    /// Disabled devices are rejected outright.
    pub enabled: bool,
    /// When the device was registered.
    pub created_at: DateTime<Utc>,
}

/// An immutable record of one metering event.
///
/// Append-only; reconstructs the rolling monthly-cap counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageCharge {
    /// Unique charge ID.
    pub id: ChargeId,
    /// The meter billed against.
    pub meter_id: MeterId,
    /// The reporting device.
    pub device_id: DeviceId,
    /// The channel the charge was applied to.
    pub channel_id: ChannelId,
    /// Units reported. Always positive.
    pub units: u64,
    /// Computed value: `units * price_per_unit`.
    pub charged: Amount,
    /// When the charge was recorded.
    pub recorded_at: DateTime<Utc>,
}
