use paylane_core::{ChannelId, ChannelState, CoreError};

/// Channel-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel not found: {0}")]
    NotFound(ChannelId),

    #[error("channel {0} is not active (state {1})")]
    NotActive(ChannelId, ChannelState),

    #[error("insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: u128, required: u128 },

    #[error("balance arithmetic overflow on channel {0}")]
    BalanceOverflow(ChannelId),

    #[error("settlement failed: {0}")]
    SettlementFailure(String),

    #[error("settlement already in flight for channel {0}")]
    SettlementInFlight(ChannelId),

    #[error(transparent)]
    Core(#[from] CoreError),
}
