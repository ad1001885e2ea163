use std::sync::{Arc, OnceLock};
use std::time::Duration;

use paylane_core::{
    Amount, ChannelEvent, ChannelId, ChannelState, ChannelStateMachine, CoreError, EngineConfig,
    IWebhookSink, PeerAddr, TransitionOutcome, WebhookEvent,
};

use crate::error::ChannelError;
use crate::store::{Applied, ChannelStore};
use crate::traits::{FeeQuote, IFeeEstimator, ISettlement, IStreamControl, SettlementReceipt};
use crate::types::{Channel, TransferKind};

/// Orchestrates channel lifecycle transitions and enforces the state
/// machine. All balance mutation is delegated to the `ChannelStore`.
pub struct LifecycleController {
    store: Arc<ChannelStore>,
    settlement: Arc<dyn ISettlement>,
    webhooks: Arc<dyn IWebhookSink>,
    fees: Option<Arc<dyn IFeeEstimator>>,
    streams: OnceLock<Arc<dyn IStreamControl>>,
    min_deposit: Amount,
    max_deposit: Amount,
    settle_timeout: Duration,
}

impl LifecycleController {
    /// Create a controller over the given store and collaborators.
    pub fn new(
        store: Arc<ChannelStore>,
        settlement: Arc<dyn ISettlement>,
        webhooks: Arc<dyn IWebhookSink>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            settlement,
            webhooks,
            fees: None,
            streams: OnceLock::new(),
            min_deposit: Amount::new(config.min_deposit),
            max_deposit: Amount::new(config.max_deposit),
            settle_timeout: Duration::from_secs(config.settle_timeout_secs),
        }
    }

    /// Attach a fee estimator collaborator.
    pub fn with_fee_estimator(mut self, fees: Arc<dyn IFeeEstimator>) -> Self {
        self.fees = Some(fees);
        self
    }

    /// Wire in the stream engine. Called once during assembly; later calls
    /// are ignored.
    pub fn set_stream_control(&self, streams: Arc<dyn IStreamControl>) {
        let _ = self.streams.set(streams);
    }

    fn streams(&self) -> Option<&Arc<dyn IStreamControl>> {
        self.streams.get()
    }

    /// Open a new channel toward `peer` with the given deposit.
    ///
    /// The full deposit lands on the local side; the channel starts in
    /// `Pending` until confirmed. `challenge_period_hours` is advisory
    /// metadata forwarded to the settlement collaborator.
    pub fn open(
        &self,
        peer: PeerAddr,
        deposit: Amount,
        challenge_period_hours: u32,
    ) -> Result<Channel, ChannelError> {
        if deposit.is_zero() {
            return Err(CoreError::InvalidAmount(
                "deposit must be greater than zero".into(),
            )
            .into());
        }
        if deposit < self.min_deposit {
            return Err(CoreError::InvalidAmount(format!(
                "deposit must be at least {}",
                self.min_deposit
            ))
            .into());
        }
        if deposit > self.max_deposit {
            return Err(CoreError::InvalidAmount(format!(
                "deposit cannot exceed {}",
                self.max_deposit
            ))
            .into());
        }

        let channel = Channel::open(peer, deposit, challenge_period_hours);
        let snapshot = channel.clone();
        self.store.insert(channel);

        tracing::info!(
            channel_id = %snapshot.id,
            peer = %snapshot.peer,
            capacity = %snapshot.capacity,
            "channel opened"
        );
        self.webhooks.deliver(&WebhookEvent::ChannelOpened {
            channel_id: snapshot.id,
            peer: snapshot.peer.clone(),
            capacity: snapshot.capacity,
        });

        Ok(snapshot)
    }

    /// Apply a lifecycle event to a channel under its entry lock.
    ///
    /// Returns the post-transition snapshot and whether state changed.
    fn apply_event(
        &self,
        id: ChannelId,
        event: ChannelEvent,
    ) -> Result<(Channel, bool), ChannelError> {
        let result = self.store.with_channel_mut(id, |channel| {
            match ChannelStateMachine::transition(channel.state, event)? {
                TransitionOutcome::Applied(next) => {
                    channel.state = next;
                    Ok((channel.clone(), true))
                }
                TransitionOutcome::NoChange => Ok((channel.clone(), false)),
            }
        });

        // Archived channels are terminal: report the transition attempt
        // against Closed rather than "not found".
        match result {
            Err(ChannelError::NotFound(_)) => match self.store.get_archived(id) {
                Some(archived) => Err(CoreError::InvalidTransition {
                    from: archived.state,
                    to: event.target(),
                }
                .into()),
                None => Err(ChannelError::NotFound(id)),
            },
            other => other,
        }
    }

    fn emit_updated(&self, channel: &Channel) {
        self.webhooks.deliver(&WebhookEvent::ChannelUpdated {
            channel_id: channel.id,
            local_balance: channel.local_balance,
            remote_balance: channel.remote_balance,
        });
    }

    /// Confirm a pending channel, activating it.
    pub fn confirm(&self, id: ChannelId) -> Result<Channel, ChannelError> {
        let (channel, changed) = self.apply_event(id, ChannelEvent::Confirm)?;
        if changed {
            tracing::info!(channel_id = %id, "channel confirmed");
            self.emit_updated(&channel);
        }
        Ok(channel)
    }

    /// Pause an active channel. Force-pauses its running streams.
    pub fn pause(&self, id: ChannelId) -> Result<Channel, ChannelError> {
        let (channel, changed) = self.apply_event(id, ChannelEvent::Pause)?;
        if changed {
            if let Some(streams) = self.streams() {
                streams.on_channel_paused(id);
            }
            tracing::info!(channel_id = %id, "channel paused");
            self.emit_updated(&channel);
        }
        Ok(channel)
    }

    /// Resume a paused channel. Reactivates streams that were paused by
    /// the channel pause; streams paused or stopped by their owner stay
    /// as they are.
    pub fn resume(&self, id: ChannelId) -> Result<Channel, ChannelError> {
        let (channel, changed) = self.apply_event(id, ChannelEvent::Resume)?;
        if changed {
            if let Some(streams) = self.streams() {
                streams.on_channel_resumed(id);
            }
            tracing::info!(channel_id = %id, "channel resumed");
            self.emit_updated(&channel);
        }
        Ok(channel)
    }

    /// Request channel closure. Stops all associated streams; balances are
    /// untouched until settlement.
    pub fn close(&self, id: ChannelId) -> Result<Channel, ChannelError> {
        let (channel, changed) = self.apply_event(id, ChannelEvent::Close)?;
        if changed {
            if let Some(streams) = self.streams() {
                streams.on_channel_closing(id);
            }
            tracing::info!(channel_id = %id, "channel closing");
            self.emit_updated(&channel);
        }
        Ok(channel)
    }

    /// Increase channel capacity and local balance by `amount`.
    pub fn top_up(&self, id: ChannelId, amount: Amount) -> Result<Channel, ChannelError> {
        let channel = self.store.top_up(id, amount)?;
        self.emit_updated(&channel);
        Ok(channel)
    }

    /// Send a manual micropayment over an active channel.
    pub fn micropay(&self, id: ChannelId, amount: Amount) -> Result<Applied, ChannelError> {
        let applied = self
            .store
            .transfer(id, amount, TransferKind::Payment, None)?;
        self.webhooks.deliver(&WebhookEvent::ChannelUpdated {
            channel_id: id,
            local_balance: applied.local_balance,
            remote_balance: applied.remote_balance,
        });
        Ok(applied)
    }

    /// Settle a closing channel using the configured timeout.
    pub async fn settle(&self, id: ChannelId) -> Result<SettlementReceipt, ChannelError> {
        self.settle_with_timeout(id, self.settle_timeout).await
    }

    /// Settle a closing channel, bounding the collaborator call by
    /// `timeout`.
    ///
    /// The settlement call is issued with no channel entry held: the
    /// balances are snapshotted and an in-flight marker set under the
    /// lock, the lock is released for the call, and the lock is
    /// reacquired only to apply `Closed` (or clear the marker on
    /// failure). A slow collaborator therefore never blocks other
    /// operations on the channel's shard. On failure or timeout the
    /// channel stays `Closing` and the caller may retry.
    pub async fn settle_with_timeout(
        &self,
        id: ChannelId,
        timeout: Duration,
    ) -> Result<SettlementReceipt, ChannelError> {
        // Phase 1: validate and mark in-flight under the entry lock.
        let phase1 = self.store.with_channel_mut(id, |channel| {
            let outcome = ChannelStateMachine::transition(channel.state, ChannelEvent::Settle)?;
            if !matches!(outcome, TransitionOutcome::Applied(ChannelState::Closed)) {
                return Err(CoreError::InvalidTransition {
                    from: channel.state,
                    to: ChannelState::Closed,
                }
                .into());
            }
            if channel.settle_in_flight {
                return Err(ChannelError::SettlementInFlight(id));
            }
            channel.settle_in_flight = true;
            Ok((
                channel.local_balance,
                channel.remote_balance,
                channel.challenge_period_hours,
            ))
        });
        let (local, remote, challenge) = match phase1 {
            Ok(snapshot) => snapshot,
            Err(ChannelError::NotFound(_)) => {
                return Err(match self.store.get_archived(id) {
                    Some(archived) => CoreError::InvalidTransition {
                        from: archived.state,
                        to: ChannelState::Closed,
                    }
                    .into(),
                    None => ChannelError::NotFound(id),
                });
            }
            Err(e) => return Err(e),
        };

        // Phase 2: the external call, outside any channel lock.
        let call = self.settlement.settle_channel(id, local, remote, challenge);
        let outcome = tokio::time::timeout(timeout, call).await;

        // Phase 3: apply the result under the entry lock.
        match outcome {
            Ok(Ok(receipt)) => {
                self.store.with_channel_mut(id, |channel| {
                    channel.settle_in_flight = false;
                    channel.state = ChannelState::Closed;
                    Ok(())
                })?;
                let archived = self.store.archive(id)?;
                tracing::info!(
                    channel_id = %id,
                    local = %archived.local_balance,
                    remote = %archived.remote_balance,
                    "channel settled and archived"
                );
                self.webhooks.deliver(&WebhookEvent::ChannelClosed {
                    channel_id: id,
                    local_balance: archived.local_balance,
                    remote_balance: archived.remote_balance,
                });
                Ok(receipt)
            }
            Ok(Err(e)) => {
                self.clear_in_flight(id)?;
                tracing::warn!(
                    channel_id = %id,
                    error = %e,
                    "settlement call failed; channel remains Closing"
                );
                Err(ChannelError::SettlementFailure(e.to_string()))
            }
            Err(_) => {
                // The request may still be in flight at the collaborator;
                // the channel is left Closing, not rolled back, and the
                // caller may retry.
                self.clear_in_flight(id)?;
                tracing::warn!(
                    channel_id = %id,
                    timeout_ms = timeout.as_millis() as u64,
                    "settlement call timed out; channel remains Closing"
                );
                Err(ChannelError::SettlementFailure(format!(
                    "settlement call timed out after {}ms",
                    timeout.as_millis()
                )))
            }
        }
    }

    fn clear_in_flight(&self, id: ChannelId) -> Result<(), ChannelError> {
        self.store.with_channel_mut(id, |channel| {
            channel.settle_in_flight = false;
            Ok(())
        })
    }

    /// Informational fee quote for a manual send. Requires a fee
    /// estimator collaborator.
    pub async fn fee_quote(
        &self,
        from: &PeerAddr,
        to: &PeerAddr,
        amount: Amount,
    ) -> Result<FeeQuote, ChannelError> {
        let fees = self.fees.as_ref().ok_or_else(|| {
            ChannelError::Core(CoreError::ValidationError(
                "no fee estimator configured".into(),
            ))
        })?;
        fees.estimate(from, to, amount).await
    }
}
