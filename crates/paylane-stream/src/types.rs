use chrono::{DateTime, Utc};
use paylane_core::{Amount, ChannelId, StreamId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a stream stopped accruing for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Stopped by its owner.
    Owner,
    /// Force-stopped because the channel left the Active/Paused pair.
    ChannelClosed,
    /// Auto-stopped because accrual exceeded the channel's local balance.
    Underfunded,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owner => write!(f, "owner"),
            Self::ChannelClosed => write!(f, "channel_closed"),
            Self::Underfunded => write!(f, "underfunded"),
        }
    }
}

/// A continuous payment commitment bound to one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    /// Unique stream ID.
    pub id: StreamId,
    /// The channel this stream accrues against.
    pub channel_id: ChannelId,
    /// Value accrued per second. Strictly positive.
    pub rate: Amount,
    /// When the stream started.
    pub started_at: DateTime<Utc>,
    /// Paused explicitly by the stream's owner.
    pub paused_by_owner: bool,
    /// Force-paused because the channel is paused.
    pub paused_by_channel: bool,
    /// Terminal stop reason, if any.
    pub stopped: Option<StopReason>,
    /// Start of the current active segment. Meaningful only while running.
    pub accrual_mark: DateTime<Utc>,
    /// Active milliseconds banked from completed segments and fractional
    /// carry, not yet flushed.
    pub banked_ms: u64,
}

impl Stream {
    /// Create a running stream starting now.
    pub fn start(channel_id: ChannelId, rate: Amount) -> Self {
        let now = Utc::now();
        Self {
            id: StreamId::new(),
            channel_id,
            rate,
            started_at: now,
            paused_by_owner: false,
            paused_by_channel: false,
            stopped: None,
            accrual_mark: now,
            banked_ms: 0,
        }
    }

    /// Whether the stream is currently accruing.
    pub fn is_running(&self) -> bool {
        self.stopped.is_none() && !self.paused_by_owner && !self.paused_by_channel
    }

    /// Whether the stream is alive but suspended.
    pub fn is_paused(&self) -> bool {
        self.stopped.is_none() && (self.paused_by_owner || self.paused_by_channel)
    }

    /// Active milliseconds accumulated up to `now`: banked segments plus
    /// the current segment if the stream is running. Time spent paused
    /// (by owner or by channel) is excluded by construction.
    pub fn active_ms_at(&self, now: DateTime<Utc>) -> u64 {
        let mut ms = self.banked_ms;
        if self.is_running() {
            let segment = (now - self.accrual_mark).num_milliseconds();
            if segment > 0 {
                ms = ms.saturating_add(segment as u64);
            }
        }
        ms
    }

    /// Fold the current active segment into the banked total.
    pub(crate) fn bank(&mut self, now: DateTime<Utc>) {
        if self.is_running() {
            self.banked_ms = self.active_ms_at(now);
        }
    }
}
