use crate::state_machine::ChannelState;

/// Core engine errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: ChannelState,
        to: ChannelState,
    },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("validation failed: {0}")]
    ValidationError(String),
}
