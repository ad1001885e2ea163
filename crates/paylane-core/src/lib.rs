//! Paylane core: ledger primitives, the channel state machine, engine
//! configuration, and the webhook event vocabulary shared by every crate.

pub mod config;
pub mod error;
pub mod events;
pub mod state_machine;
pub mod types;

pub use config::EngineConfig;
pub use error::CoreError;
pub use events::{IWebhookSink, TracingSink, WebhookEvent};
pub use state_machine::{ChannelEvent, ChannelState, ChannelStateMachine, TransitionOutcome};
pub use types::{Amount, ChannelId, ChargeId, DeviceId, MeterId, PeerAddr, StreamId};
