use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paylane_core::{Amount, ChannelId, PeerAddr};
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Proof that a channel's terminal balances were written to the
/// underlying ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementReceipt {
    /// The settled channel.
    pub channel_id: ChannelId,
    /// Final local balance.
    pub local_balance: Amount,
    /// Final remote balance.
    pub remote_balance: Amount,
    /// Adapter that processed the settlement.
    pub adapter_id: String,
    /// When the settlement was confirmed.
    pub settled_at: DateTime<Utc>,
    /// Optional transaction reference on the underlying rail.
    pub tx_ref: Option<String>,
}

/// Settlement collaborator interface.
///
/// Called exactly once per successful `Closing → Closed` transition with
/// the channel's final balance pair. Idempotency on the collaborator side
/// is recommended but not required by this engine.
#[async_trait]
pub trait ISettlement: Send + Sync {
    /// Write the final balances to the underlying ledger.
    async fn settle_channel(
        &self,
        channel_id: ChannelId,
        local_balance: Amount,
        remote_balance: Amount,
        challenge_period_hours: u32,
    ) -> Result<SettlementReceipt, ChannelError>;

    /// Unique identifier of this adapter (e.g. "sa-internal").
    fn adapter_id(&self) -> &str;
}

/// Informational fee quote for a prospective manual send.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeeQuote {
    /// Estimated fee.
    pub fee: Amount,
    /// Suggested nonce (monotonic per estimator).
    pub nonce: u64,
    /// Estimated confirmation time in seconds.
    pub eta_secs: u64,
}

/// Fee estimator collaborator. Output is display-only; the engine never
/// depends on it for correctness.
#[async_trait]
pub trait IFeeEstimator: Send + Sync {
    /// Estimate fee, nonce, and ETA for sending `amount` from `from` to `to`.
    async fn estimate(
        &self,
        from: &PeerAddr,
        to: &PeerAddr,
        amount: Amount,
    ) -> Result<FeeQuote, ChannelError>;
}

/// Hooks the lifecycle controller fires so the stream engine can follow
/// channel transitions. Implementations must be fast and non-blocking:
/// they run while the caller is between channel critical sections.
pub trait IStreamControl: Send + Sync {
    /// The channel was paused: force-pause its running streams.
    fn on_channel_paused(&self, channel_id: ChannelId);
    /// The channel was resumed: reactivate streams paused by the channel
    /// (not those paused or stopped by their owner).
    fn on_channel_resumed(&self, channel_id: ChannelId);
    /// The channel is closing: force-stop all its streams.
    fn on_channel_closing(&self, channel_id: ChannelId);
}
