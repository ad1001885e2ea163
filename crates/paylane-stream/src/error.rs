use paylane_channel::ChannelError;
use paylane_core::{ChannelId, ChannelState, StreamId};

/// Stream-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("stream not found: {0}")]
    NotFound(StreamId),

    #[error("stream already stopped: {0}")]
    AlreadyStopped(StreamId),

    #[error("channel {0} is not active (state {1})")]
    ChannelNotActive(ChannelId, ChannelState),

    #[error("stream rate must be greater than zero")]
    InvalidRate,

    #[error("stream {stream_id} underfunded: accrued {accrued} exceeds available {available}")]
    Underfunded {
        stream_id: StreamId,
        accrued: u128,
        available: u128,
    },

    #[error(transparent)]
    Channel(#[from] ChannelError),
}
