use serde::{Deserialize, Serialize};

use crate::types::{Amount, ChannelId, PeerAddr, StreamId};

/// Notifications delivered to the webhook collaborator.
///
/// Delivery is fire-and-forget: the engine never blocks on or retries a
/// webhook; delivery guarantees belong to the collaborator. The
/// `invoice.*` events are part of the shared vocabulary but originate from
/// the invoicing service, not this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WebhookEvent {
    /// A channel was opened.
    ChannelOpened {
        channel_id: ChannelId,
        peer: PeerAddr,
        capacity: Amount,
    },
    /// A channel's balances or lifecycle state changed.
    ChannelUpdated {
        channel_id: ChannelId,
        local_balance: Amount,
        remote_balance: Amount,
    },
    /// A channel reached its terminal state.
    ChannelClosed {
        channel_id: ChannelId,
        local_balance: Amount,
        remote_balance: Amount,
    },
    /// A stream began accruing.
    StreamStarted {
        stream_id: StreamId,
        channel_id: ChannelId,
        rate: Amount,
    },
    /// A stream was stopped (by its owner, by channel closure, or because
    /// it ran the channel's local balance dry).
    StreamStopped {
        stream_id: StreamId,
        channel_id: ChannelId,
        reason: String,
    },
    /// An invoice was created (emitted by the invoicing service).
    InvoiceCreated { invoice_id: uuid::Uuid },
    /// An invoice was paid (emitted by the invoicing service).
    InvoicePaid { invoice_id: uuid::Uuid },
}

impl WebhookEvent {
    /// The wire-level event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChannelOpened { .. } => "channel.opened",
            Self::ChannelUpdated { .. } => "channel.updated",
            Self::ChannelClosed { .. } => "channel.closed",
            Self::StreamStarted { .. } => "stream.started",
            Self::StreamStopped { .. } => "stream.stopped",
            Self::InvoiceCreated { .. } => "invoice.created",
            Self::InvoicePaid { .. } => "invoice.paid",
        }
    }
}

/// Webhook delivery sink.
///
/// Implementations must not block the caller; a slow downstream is the
/// collaborator's problem, not the engine's.
pub trait IWebhookSink: Send + Sync {
    /// Deliver one event, fire-and-forget.
    fn deliver(&self, event: &WebhookEvent);
}

/// Default sink: emits each event as a structured log line.
pub struct TracingSink;

impl IWebhookSink for TracingSink {
    fn deliver(&self, event: &WebhookEvent) {
        tracing::info!(event = event.name(), payload = ?event, "webhook event");
    }
}
