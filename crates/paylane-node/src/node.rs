//! Engine assembly and the node run loop.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use paylane_channel::{ChannelStore, ISettlement, IStreamControl, LifecycleController};
use paylane_core::{ChannelState, EngineConfig, IWebhookSink};
use paylane_meter::{DeviceRegistry, MeterRegistry, MeteringEngine};
use paylane_stream::StreamEngine;

use crate::storage::Storage;

/// Counts of records reconstructed from durable storage.
#[derive(Debug, Default, Clone, Copy)]
pub struct RestoreSummary {
    pub channels: usize,
    pub archived: usize,
    pub closing: usize,
    pub streams: usize,
    pub meters: usize,
    pub devices: usize,
    pub charges: usize,
}

/// A fully wired Paylane engine with durable storage.
pub struct PaylaneNode {
    pub config: EngineConfig,
    pub store: Arc<ChannelStore>,
    pub streams: Arc<StreamEngine>,
    pub meters: Arc<MeterRegistry>,
    pub devices: Arc<DeviceRegistry>,
    pub metering: Arc<MeteringEngine>,
    pub lifecycle: Arc<LifecycleController>,
    storage: Arc<Storage>,
}

impl PaylaneNode {
    /// Assemble the engine over the given storage and collaborators.
    pub fn new(
        config: EngineConfig,
        storage: Arc<Storage>,
        settlement: Arc<dyn ISettlement>,
        webhooks: Arc<dyn IWebhookSink>,
    ) -> Self {
        let store = Arc::new(ChannelStore::new());
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
        let stream_control: Arc<dyn IStreamControl> = Arc::clone(&streams);
        lifecycle.set_stream_control(stream_control);

        Self {
            config,
            store,
            streams,
            meters,
            devices,
            metering,
            lifecycle,
            storage,
        }
    }

    /// Reconstruct in-memory state from durable storage.
    ///
    /// Channels come back in the exact state they were persisted in;
    /// channels caught mid-close resume as `Closing` and stay settleable
    /// through the normal caller-driven retry path.
    pub fn restore(&self) -> Result<RestoreSummary> {
        let mut summary = RestoreSummary::default();

        for channel in self.storage.load_channels()? {
            if channel.state == ChannelState::Closing {
                summary.closing += 1;
                tracing::info!(channel_id = %channel.id, "restored in-flight closing channel");
            }
            self.store.insert(channel);
            summary.channels += 1;
        }
        for channel in self.storage.load_archived_channels()? {
            self.store.insert_archived(channel);
            summary.archived += 1;
        }
        for stream in self.storage.load_streams()? {
            self.streams.insert_restored(stream);
            summary.streams += 1;
        }
        for meter in self.storage.load_meters()? {
            self.meters.insert_restored(meter);
            summary.meters += 1;
        }
        for device in self.storage.load_devices()? {
            self.devices.insert_restored(device);
            summary.devices += 1;
        }
        for charge in self.storage.load_charges()? {
            self.metering.insert_restored(charge);
            summary.charges += 1;
        }

        tracing::info!(
            channels = summary.channels,
            archived = summary.archived,
            closing = summary.closing,
            streams = summary.streams,
            meters = summary.meters,
            devices = summary.devices,
            charges = summary.charges,
            "state restored from storage"
        );
        Ok(summary)
    }

    /// Persist a full snapshot of the engine state.
    pub fn snapshot(&self) -> Result<()> {
        for channel in self.store.list() {
            self.storage.put_channel(&channel)?;
        }
        for channel in self.store.list_archived() {
            self.storage.put_archived_channel(&channel)?;
        }
        for stream in self.streams.list() {
            self.storage.put_stream(&stream)?;
        }
        for meter in self.meters.list() {
            self.storage.put_meter(&meter)?;
        }
        for device in self.devices.list() {
            self.storage.put_device(&device)?;
        }
        for charge in self.metering.list_charges() {
            self.storage.put_charge(&charge)?;
        }
        tracing::debug!("state snapshot persisted");
        Ok(())
    }

    /// Run the periodic stream-flush sweep and snapshot loop until
    /// interrupted. Takes a final snapshot on shutdown.
    pub async fn run(&self) -> Result<()> {
        let mut flush_tick =
            tokio::time::interval(Duration::from_secs(self.config.flush_interval_secs.max(1)));
        let mut snapshot_tick = tokio::time::interval(Duration::from_secs(
            self.config.snapshot_interval_secs.max(1),
        ));
        // The first tick of an interval fires immediately.
        flush_tick.tick().await;
        snapshot_tick.tick().await;

        tracing::info!(
            flush_interval_secs = self.config.flush_interval_secs,
            snapshot_interval_secs = self.config.snapshot_interval_secs,
            "node running"
        );

        loop {
            tokio::select! {
                _ = flush_tick.tick() => {
                    let moved = self.streams.sweep();
                    if moved > 0 {
                        tracing::debug!(streams_flushed = moved, "sweep complete");
                    }
                }
                _ = snapshot_tick.tick() => {
                    if let Err(e) = self.snapshot() {
                        tracing::error!(error = %e, "snapshot failed");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown requested");
                    break;
                }
            }
        }

        self.snapshot()?;
        Ok(())
    }
}
