use paylane_channel::ChannelError;
use paylane_core::{DeviceId, MeterId};

/// Metering-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum MeterError {
    #[error("meter not found: {0}")]
    MeterNotFound(MeterId),

    #[error("device not found: {0}")]
    DeviceNotFound(DeviceId),

    #[error("device disabled: {0}")]
    DeviceDisabled(DeviceId),

    #[error("invalid credential for device {0}")]
    InvalidCredential(DeviceId),

    #[error("scope violation for device {device_id} on meter {meter_id}: {reason}")]
    ScopeViolation {
        device_id: DeviceId,
        meter_id: MeterId,
        reason: &'static str,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("monthly cap exceeded: cap {cap}, attempted total {attempted}")]
    CapExceeded { cap: u128, attempted: u128 },

    #[error("charge computation overflow")]
    ChargeOverflow,

    #[error(transparent)]
    Channel(#[from] ChannelError),
}
