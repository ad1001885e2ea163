use chrono::{DateTime, Utc};
use paylane_core::{Amount, ChannelId, ChannelState, PeerAddr};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// What caused a balance shift inside a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    /// Manual micropayment.
    Payment,
    /// Accrued stream value flushed to the counterparty.
    StreamFlush,
    /// Metered device usage billed to the channel.
    UsageCharge,
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Payment => write!(f, "Payment"),
            Self::StreamFlush => write!(f, "StreamFlush"),
            Self::UsageCharge => write!(f, "UsageCharge"),
        }
    }
}

/// One applied balance shift, recorded in the channel's transfer history.
///
/// Append-only: transfers are never mutated or removed once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    /// Unique transfer ID (UUID v7, time-ordered).
    pub id: Uuid,
    /// Value moved from local to remote.
    pub amount: Amount,
    /// Mutation source.
    pub kind: TransferKind,
    /// When the transfer was applied.
    pub timestamp: DateTime<Utc>,
    /// BLAKE3 content hash over the transfer fields.
    pub hash: String,
    /// Free-form note.
    pub memo: Option<String>,
}

impl Transfer {
    /// Build a transfer record, computing its content hash.
    pub(crate) fn record(
        channel_id: ChannelId,
        amount: Amount,
        kind: TransferKind,
        memo: Option<String>,
    ) -> Self {
        let id = Uuid::now_v7();
        let timestamp = Utc::now();
        let hash_data = format!(
            "{}:{}:{}:{}:{}",
            channel_id,
            id,
            amount,
            kind,
            timestamp.timestamp_millis()
        );
        let hash = hex::encode(blake3::hash(hash_data.as_bytes()).as_bytes());
        Self {
            id,
            amount,
            kind,
            timestamp,
            hash,
            memo,
        }
    }
}

/// A bilateral value-locking agreement.
///
/// Invariant: `local_balance + remote_balance == capacity` at all times,
/// and both balances are non-negative. Capacity never decreases until
/// settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    /// Unique channel ID.
    pub id: ChannelId,
    /// Counterparty address.
    pub peer: PeerAddr,
    /// Total value locked in the channel.
    pub capacity: Amount,
    /// Value still owned by the local party.
    pub local_balance: Amount,
    /// Value earned by the counterparty.
    pub remote_balance: Amount,
    /// Lifecycle state.
    pub state: ChannelState,
    /// Creation timestamp.
    pub opened_at: DateTime<Utc>,
    /// Advisory challenge period, forwarded to the settlement collaborator.
    pub challenge_period_hours: u32,
    /// True while a settlement call is in flight. Not persisted: a restart
    /// means any previous call has been abandoned from our side.
    #[serde(skip)]
    pub settle_in_flight: bool,
    /// Append-only history of balance shifts.
    pub transfers: Vec<Transfer>,
}

impl Channel {
    /// Create a new channel in `Pending` with the full deposit on the
    /// local side.
    pub fn open(peer: PeerAddr, deposit: Amount, challenge_period_hours: u32) -> Self {
        Self {
            id: ChannelId::new(),
            peer,
            capacity: deposit,
            local_balance: deposit,
            remote_balance: Amount::ZERO,
            state: ChannelState::Pending,
            opened_at: Utc::now(),
            challenge_period_hours,
            settle_in_flight: false,
            transfers: Vec::new(),
        }
    }

    /// Check the capacity invariant.
    pub fn invariant_holds(&self) -> bool {
        self.local_balance
            .checked_add(self.remote_balance)
            .map(|sum| sum == self.capacity)
            .unwrap_or(false)
    }
}
