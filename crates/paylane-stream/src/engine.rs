use chrono::{DateTime, Utc};
use dashmap::DashMap;
use paylane_channel::{ChannelError, ChannelStore, IStreamControl, TransferKind};
use paylane_core::{Amount, ChannelId, ChannelState, IWebhookSink, StreamId, WebhookEvent};
use std::sync::Arc;

use crate::error::StreamError;
use crate::types::{StopReason, Stream};

/// Result of one flush.
#[derive(Debug, Clone)]
pub struct FlushOutcome {
    pub stream_id: StreamId,
    pub channel_id: ChannelId,
    /// Value moved from local to remote. Zero when less than one full
    /// second of active time had accumulated.
    pub flushed: Amount,
}

/// Computes and applies stream accrual into channel balances.
///
/// Accrual is lazy: nothing runs per stream in the background. A flush
/// converts whole elapsed active seconds into value and moves it through
/// the channel store's capacity-preserving transfer; fractional seconds
/// carry over to the next flush.
pub struct StreamEngine {
    store: Arc<ChannelStore>,
    streams: DashMap<StreamId, Stream>,
    webhooks: Arc<dyn IWebhookSink>,
}

impl StreamEngine {
    /// Create an engine over the given channel store.
    pub fn new(store: Arc<ChannelStore>, webhooks: Arc<dyn IWebhookSink>) -> Self {
        Self {
            store,
            streams: DashMap::new(),
            webhooks,
        }
    }

    /// Start a stream against an active channel.
    pub fn start(&self, channel_id: ChannelId, rate: Amount) -> Result<Stream, StreamError> {
        if rate.is_zero() {
            return Err(StreamError::InvalidRate);
        }
        let channel = self.store.get(channel_id)?;
        if channel.state != ChannelState::Active {
            return Err(StreamError::ChannelNotActive(channel_id, channel.state));
        }

        let stream = Stream::start(channel_id, rate);
        let snapshot = stream.clone();
        self.streams.insert(stream.id, stream);

        tracing::info!(
            stream_id = %snapshot.id,
            channel_id = %channel_id,
            rate = %rate,
            "stream started"
        );
        self.webhooks.deliver(&WebhookEvent::StreamStarted {
            stream_id: snapshot.id,
            channel_id,
            rate,
        });
        Ok(snapshot)
    }

    /// Get a stream snapshot.
    pub fn get(&self, id: StreamId) -> Result<Stream, StreamError> {
        self.streams
            .get(&id)
            .map(|s| s.clone())
            .ok_or(StreamError::NotFound(id))
    }

    /// All streams, including stopped ones.
    pub fn list(&self) -> Vec<Stream> {
        self.streams.iter().map(|e| e.clone()).collect()
    }

    /// All streams bound to a channel.
    pub fn list_for_channel(&self, channel_id: ChannelId) -> Vec<Stream> {
        self.streams
            .iter()
            .filter(|e| e.channel_id == channel_id)
            .map(|e| e.clone())
            .collect()
    }

    /// Re-insert a stream loaded from durable storage.
    pub fn insert_restored(&self, stream: Stream) {
        self.streams.insert(stream.id, stream);
    }

    /// Pause a stream on behalf of its owner.
    pub fn pause(&self, id: StreamId) -> Result<Stream, StreamError> {
        self.pause_at(id, Utc::now())
    }

    /// Pause with an explicit clock reading.
    pub fn pause_at(&self, id: StreamId, now: DateTime<Utc>) -> Result<Stream, StreamError> {
        let mut entry = self.streams.get_mut(&id).ok_or(StreamError::NotFound(id))?;
        let stream = entry.value_mut();
        if stream.stopped.is_some() {
            return Err(StreamError::AlreadyStopped(id));
        }
        if !stream.paused_by_owner {
            stream.bank(now);
            stream.paused_by_owner = true;
            tracing::debug!(stream_id = %id, "stream paused by owner");
        }
        Ok(stream.clone())
    }

    /// Resume an owner-paused stream.
    pub fn resume(&self, id: StreamId) -> Result<Stream, StreamError> {
        self.resume_at(id, Utc::now())
    }

    /// Resume with an explicit clock reading.
    pub fn resume_at(&self, id: StreamId, now: DateTime<Utc>) -> Result<Stream, StreamError> {
        let mut entry = self.streams.get_mut(&id).ok_or(StreamError::NotFound(id))?;
        let stream = entry.value_mut();
        if stream.stopped.is_some() {
            return Err(StreamError::AlreadyStopped(id));
        }
        if stream.paused_by_owner {
            stream.paused_by_owner = false;
            if stream.is_running() {
                stream.accrual_mark = now;
            }
            tracing::debug!(stream_id = %id, "stream resumed by owner");
        }
        Ok(stream.clone())
    }

    /// Stop a stream for good, flushing accrued value first.
    ///
    /// The final flush only applies while the channel is Active; accrual
    /// banked during a channel pause is forfeited if the stream is
    /// stopped before the channel resumes. Stopping an already-stopped
    /// stream is a no-op success.
    pub fn stop(&self, id: StreamId) -> Result<Stream, StreamError> {
        self.stop_at(id, Utc::now())
    }

    /// Stop with an explicit clock reading.
    pub fn stop_at(&self, id: StreamId, now: DateTime<Utc>) -> Result<Stream, StreamError> {
        {
            let entry = self.streams.get(&id).ok_or(StreamError::NotFound(id))?;
            if entry.stopped.is_some() {
                return Ok(entry.clone());
            }
        }

        // Final flush: an underfunded result already stopped the stream.
        self.flush_at(id, now)?;

        let mut entry = self.streams.get_mut(&id).ok_or(StreamError::NotFound(id))?;
        let stream = entry.value_mut();
        if stream.stopped.is_none() {
            stream.stopped = Some(StopReason::Owner);
            tracing::info!(stream_id = %id, "stream stopped by owner");
            self.webhooks.deliver(&WebhookEvent::StreamStopped {
                stream_id: id,
                channel_id: stream.channel_id,
                reason: StopReason::Owner.to_string(),
            });
        }
        Ok(stream.clone())
    }

    /// Flush accrued value into the channel balance.
    pub fn flush(&self, id: StreamId) -> Result<FlushOutcome, StreamError> {
        self.flush_at(id, Utc::now())
    }

    /// Flush with an explicit clock reading, so a sweep can apply one
    /// consistent instant across many streams.
    ///
    /// Whole elapsed active seconds convert to `rate * seconds`; the
    /// sub-second remainder stays banked. If accrued value exceeds the
    /// channel's local balance the stream is auto-stopped with reason
    /// `Underfunded` and no value moves at all.
    pub fn flush_at(&self, id: StreamId, now: DateTime<Utc>) -> Result<FlushOutcome, StreamError> {
        let mut entry = self.streams.get_mut(&id).ok_or(StreamError::NotFound(id))?;
        let stream = entry.value_mut();
        if stream.stopped.is_some() {
            return Err(StreamError::AlreadyStopped(id));
        }

        let channel_id = stream.channel_id;
        let active_ms = stream.active_ms_at(now);
        let whole_secs = active_ms / 1_000;
        let accrued = stream
            .rate
            .checked_mul_units(whole_secs)
            .ok_or(ChannelError::BalanceOverflow(channel_id))?;

        if accrued.is_zero() {
            return Ok(FlushOutcome {
                stream_id: id,
                channel_id,
                flushed: Amount::ZERO,
            });
        }

        match self.store.transfer(
            channel_id,
            accrued,
            TransferKind::StreamFlush,
            Some(format!("stream {}", id)),
        ) {
            Ok(applied) => {
                stream.banked_ms = active_ms % 1_000;
                if stream.is_running() {
                    stream.accrual_mark = now;
                }
                tracing::debug!(
                    stream_id = %id,
                    channel_id = %channel_id,
                    flushed = %applied.transfer.amount,
                    "stream accrual flushed"
                );
                Ok(FlushOutcome {
                    stream_id: id,
                    channel_id,
                    flushed: accrued,
                })
            }
            Err(ChannelError::InsufficientBalance { available, .. }) => {
                stream.stopped = Some(StopReason::Underfunded);
                tracing::warn!(
                    stream_id = %id,
                    channel_id = %channel_id,
                    accrued = %accrued,
                    available = available,
                    "stream underfunded, auto-stopping"
                );
                self.webhooks.deliver(&WebhookEvent::StreamStopped {
                    stream_id: id,
                    channel_id,
                    reason: StopReason::Underfunded.to_string(),
                });
                Err(StreamError::Underfunded {
                    stream_id: id,
                    accrued: accrued.value(),
                    available,
                })
            }
            // Channel not currently transferable (paused mid-race or
            // closing): keep everything banked and try again later.
            Err(ChannelError::NotActive(_, _)) => Ok(FlushOutcome {
                stream_id: id,
                channel_id,
                flushed: Amount::ZERO,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Flush every live stream at one clock reading. Returns how many
    /// streams moved value. Underfunded streams stop themselves and are
    /// not counted.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let ids: Vec<StreamId> = self
            .streams
            .iter()
            .filter(|e| e.stopped.is_none())
            .map(|e| e.id)
            .collect();

        let mut moved = 0;
        for id in ids {
            match self.flush_at(id, now) {
                Ok(outcome) if !outcome.flushed.is_zero() => moved += 1,
                Ok(_) => {}
                Err(StreamError::Underfunded { .. }) => {}
                Err(StreamError::AlreadyStopped(_)) => {}
                Err(e) => {
                    tracing::warn!(stream_id = %id, error = %e, "sweep flush failed");
                }
            }
        }
        moved
    }

    /// Flush every live stream now.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    fn for_channel_mut(&self, channel_id: ChannelId, mut f: impl FnMut(&mut Stream)) {
        for mut entry in self.streams.iter_mut() {
            if entry.channel_id == channel_id {
                f(entry.value_mut());
            }
        }
    }
}

impl IStreamControl for StreamEngine {
    fn on_channel_paused(&self, channel_id: ChannelId) {
        let now = Utc::now();
        self.for_channel_mut(channel_id, |stream| {
            if stream.stopped.is_none() && !stream.paused_by_channel {
                stream.bank(now);
                stream.paused_by_channel = true;
            }
        });
        tracing::debug!(channel_id = %channel_id, "streams force-paused with channel");
    }

    fn on_channel_resumed(&self, channel_id: ChannelId) {
        let now = Utc::now();
        self.for_channel_mut(channel_id, |stream| {
            if stream.stopped.is_none() && stream.paused_by_channel {
                stream.paused_by_channel = false;
                if stream.is_running() {
                    stream.accrual_mark = now;
                }
            }
        });
        tracing::debug!(channel_id = %channel_id, "streams reactivated with channel");
    }

    fn on_channel_closing(&self, channel_id: ChannelId) {
        let mut stopped = Vec::new();
        self.for_channel_mut(channel_id, |stream| {
            if stream.stopped.is_none() {
                stream.stopped = Some(StopReason::ChannelClosed);
                stopped.push(stream.id);
            }
        });
        for stream_id in stopped {
            tracing::info!(stream_id = %stream_id, channel_id = %channel_id, "stream force-stopped by channel closure");
            self.webhooks.deliver(&WebhookEvent::StreamStopped {
                stream_id,
                channel_id,
                reason: StopReason::ChannelClosed.to_string(),
            });
        }
    }
}
