//! Paylane Channel Layer
//!
//! Owns channel records and their balances. The `ChannelStore` is the
//! single point of truth for balance mutation; the `LifecycleController`
//! drives the open/confirm/pause/resume/close/settle state machine and
//! talks to the external settlement collaborator.

pub mod adapters;
pub mod error;
pub mod lifecycle;
pub mod store;
pub mod traits;
pub mod types;

pub use error::ChannelError;
pub use lifecycle::LifecycleController;
pub use store::{Applied, ChannelStore, StoreStats};
pub use traits::{FeeQuote, IFeeEstimator, ISettlement, IStreamControl, SettlementReceipt};
pub use types::{Channel, Transfer, TransferKind};
