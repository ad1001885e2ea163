use dashmap::DashMap;
use paylane_core::{Amount, ChannelId, ChannelState, CoreError, PeerAddr};

use crate::error::ChannelError;
use crate::types::{Channel, Transfer, TransferKind};

/// Result of an applied balance transfer.
#[derive(Debug, Clone)]
pub struct Applied {
    /// The recorded transfer.
    pub transfer: Transfer,
    /// Local balance after the transfer.
    pub local_balance: Amount,
    /// Remote balance after the transfer.
    pub remote_balance: Amount,
}

/// Aggregate figures over the store.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStats {
    pub active_channels: usize,
    pub archived_channels: usize,
    pub total_capacity: Amount,
    pub total_local: Amount,
    pub total_remote: Amount,
}

/// Owns every channel record and is the only component permitted to
/// mutate channel balances.
///
/// Concurrency: channels live in a `DashMap`; every mutation runs inside
/// `get_mut` on the channel's entry, which serializes callers per channel
/// while leaving unrelated channels fully parallel. No global lock.
pub struct ChannelStore {
    /// Live channels (Pending through Closing).
    channels: DashMap<ChannelId, Channel>,
    /// Closed channels, archived rather than deleted.
    archive: DashMap<ChannelId, Channel>,
}

impl ChannelStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            archive: DashMap::new(),
        }
    }

    /// Insert a live channel record.
    pub fn insert(&self, channel: Channel) {
        self.channels.insert(channel.id, channel);
    }

    /// Insert a channel directly into the archive (restore path).
    pub fn insert_archived(&self, channel: Channel) {
        self.archive.insert(channel.id, channel);
    }

    /// Get a channel by ID, checking live channels first, then the archive.
    pub fn get(&self, id: ChannelId) -> Result<Channel, ChannelError> {
        if let Some(channel) = self.channels.get(&id) {
            return Ok(channel.clone());
        }
        self.archive
            .get(&id)
            .map(|c| c.clone())
            .ok_or(ChannelError::NotFound(id))
    }

    /// Get an archived channel, if any.
    pub fn get_archived(&self, id: ChannelId) -> Option<Channel> {
        self.archive.get(&id).map(|c| c.clone())
    }

    /// All live channels.
    pub fn list(&self) -> Vec<Channel> {
        self.channels.iter().map(|e| e.clone()).collect()
    }

    /// All archived channels.
    pub fn list_archived(&self) -> Vec<Channel> {
        self.archive.iter().map(|e| e.clone()).collect()
    }

    /// All channels (live or archived) with the given counterparty.
    pub fn list_for_peer(&self, peer: &PeerAddr) -> Vec<Channel> {
        self.channels
            .iter()
            .chain(self.archive.iter())
            .filter(|e| &e.peer == peer)
            .map(|e| e.clone())
            .collect()
    }

    /// Run a closure against a live channel under its entry lock.
    ///
    /// This is the per-channel critical section every mutation goes
    /// through.
    pub(crate) fn with_channel_mut<T>(
        &self,
        id: ChannelId,
        f: impl FnOnce(&mut Channel) -> Result<T, ChannelError>,
    ) -> Result<T, ChannelError> {
        let mut entry = self
            .channels
            .get_mut(&id)
            .ok_or(ChannelError::NotFound(id))?;
        f(entry.value_mut())
    }

    /// Move `amount` from the local balance to the remote balance.
    ///
    /// The shared mechanics behind micropayments, stream flushes, and
    /// usage charges: capacity-preserving, all-or-nothing, legal only on
    /// an `Active` channel. Rejects with `InsufficientBalance` rather than
    /// ever driving the local balance negative.
    pub fn transfer(
        &self,
        id: ChannelId,
        amount: Amount,
        kind: TransferKind,
        memo: Option<String>,
    ) -> Result<Applied, ChannelError> {
        if amount.is_zero() {
            return Err(CoreError::InvalidAmount(
                "transfer amount must be greater than zero".into(),
            )
            .into());
        }

        let mut entry = match self.channels.get_mut(&id) {
            Some(entry) => entry,
            None => {
                return Err(match self.get_archived(id) {
                    Some(archived) => ChannelError::NotActive(id, archived.state),
                    None => ChannelError::NotFound(id),
                });
            }
        };
        let channel = entry.value_mut();

        if channel.state != ChannelState::Active {
            return Err(ChannelError::NotActive(id, channel.state));
        }
        if amount > channel.local_balance {
            return Err(ChannelError::InsufficientBalance {
                available: channel.local_balance.value(),
                required: amount.value(),
            });
        }

        // Compute both sides before assigning either: the transfer is
        // applied entirely or not at all.
        let new_local = channel
            .local_balance
            .checked_sub(amount)
            .ok_or(ChannelError::BalanceOverflow(id))?;
        let new_remote = channel
            .remote_balance
            .checked_add(amount)
            .ok_or(ChannelError::BalanceOverflow(id))?;

        channel.local_balance = new_local;
        channel.remote_balance = new_remote;
        debug_assert!(channel.invariant_holds());

        let transfer = Transfer::record(id, amount, kind, memo);
        channel.transfers.push(transfer.clone());

        tracing::debug!(
            channel_id = %id,
            amount = %amount,
            kind = %kind,
            local = %new_local,
            remote = %new_remote,
            "balance transfer applied"
        );

        Ok(Applied {
            transfer,
            local_balance: new_local,
            remote_balance: new_remote,
        })
    }

    /// Increase capacity and local balance together.
    ///
    /// Legal in `Active` or `Paused`. Both fields move atomically; a
    /// partial application would break the capacity invariant.
    pub fn top_up(&self, id: ChannelId, amount: Amount) -> Result<Channel, ChannelError> {
        if amount.is_zero() {
            return Err(CoreError::InvalidAmount(
                "top-up amount must be greater than zero".into(),
            )
            .into());
        }

        self.with_channel_mut(id, |channel| {
            match channel.state {
                ChannelState::Active | ChannelState::Paused => {}
                other => return Err(ChannelError::NotActive(id, other)),
            }

            let new_capacity = channel
                .capacity
                .checked_add(amount)
                .ok_or(ChannelError::BalanceOverflow(id))?;
            let new_local = channel
                .local_balance
                .checked_add(amount)
                .ok_or(ChannelError::BalanceOverflow(id))?;

            channel.capacity = new_capacity;
            channel.local_balance = new_local;
            debug_assert!(channel.invariant_holds());

            tracing::info!(
                channel_id = %id,
                amount = %amount,
                capacity = %new_capacity,
                "channel topped up"
            );
            Ok(channel.clone())
        })
    }

    /// Move a closed channel from the live map to the archive.
    pub(crate) fn archive(&self, id: ChannelId) -> Result<Channel, ChannelError> {
        let (_, channel) = self
            .channels
            .remove(&id)
            .ok_or(ChannelError::NotFound(id))?;
        debug_assert!(channel.state.is_terminal());
        self.archive.insert(id, channel.clone());
        Ok(channel)
    }

    /// Aggregate figures across live channels.
    pub fn stats(&self) -> StoreStats {
        let mut total_capacity = Amount::ZERO;
        let mut total_local = Amount::ZERO;
        let mut total_remote = Amount::ZERO;
        for entry in self.channels.iter() {
            total_capacity = total_capacity
                .checked_add(entry.capacity)
                .unwrap_or(total_capacity);
            total_local = total_local
                .checked_add(entry.local_balance)
                .unwrap_or(total_local);
            total_remote = total_remote
                .checked_add(entry.remote_balance)
                .unwrap_or(total_remote);
        }
        StoreStats {
            active_channels: self.channels.len(),
            archived_channels: self.archive.len(),
            total_capacity,
            total_local,
            total_remote,
        }
    }
}

impl Default for ChannelStore {
    fn default() -> Self {
        Self::new()
    }
}
