//! Shared fixtures for Paylane integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use paylane_channel::adapters::InternalLedgerAdapter;
use paylane_channel::{
    ChannelError, ChannelStore, ISettlement, IStreamControl, LifecycleController,
    SettlementReceipt,
};
use paylane_core::{Amount, ChannelId, EngineConfig, IWebhookSink, PeerAddr, TracingSink};
use paylane_meter::{DeviceRegistry, MeterRegistry, MeteringEngine};
use paylane_stream::StreamEngine;

/// Settlement adapter that fails a fixed number of times, then delegates
/// to the internal ledger.
pub struct FlakySettlement {
    failures_left: AtomicUsize,
    pub inner: InternalLedgerAdapter,
}

impl FlakySettlement {
    pub fn new(failures: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(failures),
            inner: InternalLedgerAdapter::new(),
        }
    }
}

#[async_trait]
impl ISettlement for FlakySettlement {
    async fn settle_channel(
        &self,
        channel_id: ChannelId,
        local_balance: Amount,
        remote_balance: Amount,
        challenge_period_hours: u32,
    ) -> Result<SettlementReceipt, ChannelError> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ChannelError::SettlementFailure("rail unavailable".into()));
        }
        self.inner
            .settle_channel(channel_id, local_balance, remote_balance, challenge_period_hours)
            .await
    }

    fn adapter_id(&self) -> &str {
        "sa-flaky"
    }
}

/// A fully wired engine without the durability layer.
pub struct Engine {
    pub store: Arc<ChannelStore>,
    pub streams: Arc<StreamEngine>,
    pub meters: Arc<MeterRegistry>,
    pub devices: Arc<DeviceRegistry>,
    pub metering: Arc<MeteringEngine>,
    pub lifecycle: Arc<LifecycleController>,
}

/// Wire up every component against the given settlement adapter.
pub fn engine_with(settlement: Arc<dyn ISettlement>) -> Engine {
    let config = EngineConfig::default();
    let store = Arc::new(ChannelStore::new());
    let webhooks: Arc<dyn IWebhookSink> = Arc::new(TracingSink);
    let streams = Arc::new(StreamEngine::new(Arc::clone(&store), Arc::clone(&webhooks)));
    let meters = Arc::new(MeterRegistry::new());
    let devices = Arc::new(DeviceRegistry::new());
    let metering = Arc::new(MeteringEngine::new(
        Arc::clone(&store),
        Arc::clone(&meters),
        Arc::clone(&devices),
        &config,
    ));
    let lifecycle = Arc::new(LifecycleController::new(
        Arc::clone(&store),
        settlement,
        webhooks,
        &config,
    ));
    let stream_control: Arc<dyn IStreamControl> = streams.clone();
    lifecycle.set_stream_control(stream_control);

    Engine {
        store,
        streams,
        meters,
        devices,
        metering,
        lifecycle,
    }
}

/// Wire up every component with the in-memory settlement ledger.
pub fn engine() -> Engine {
    engine_with(Arc::new(InternalLedgerAdapter::new()))
}

/// A fixed test counterparty.
pub fn peer() -> PeerAddr {
    PeerAddr::new("peer-a").unwrap()
}
