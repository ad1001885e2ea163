//! RocksDB storage backend for the Paylane node.

use anyhow::Result;
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

use paylane_channel::Channel;
use paylane_meter::{Device, Meter, UsageCharge};
use paylane_stream::Stream;

/// Column family names for different record types.
const CF_CHANNELS: &str = "channels";
const CF_ARCHIVE: &str = "archive";
const CF_STREAMS: &str = "streams";
const CF_METERS: &str = "meters";
const CF_DEVICES: &str = "devices";
const CF_CHARGES: &str = "charges";

/// RocksDB-backed storage for the Paylane node.
///
/// Values are JSON-encoded records keyed by their ID. A restart
/// reconstructs every channel's id, peer, state, capacity, balances, and
/// open timestamp from the `channels`/`archive` families.
pub struct Storage {
    db: DB,
}

impl Storage {
    /// Open or create a RocksDB database at the given path with column
    /// families.
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_CHANNELS, Options::default()),
            ColumnFamilyDescriptor::new(CF_ARCHIVE, Options::default()),
            ColumnFamilyDescriptor::new(CF_STREAMS, Options::default()),
            ColumnFamilyDescriptor::new(CF_METERS, Options::default()),
            ColumnFamilyDescriptor::new(CF_DEVICES, Options::default()),
            ColumnFamilyDescriptor::new(CF_CHARGES, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)?;

        Ok(Self { db })
    }

    fn put_json<T: Serialize>(&self, cf_name: &str, key: &str, value: &T) -> Result<()> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| anyhow::anyhow!("column family '{}' not found", cf_name))?;
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(&cf, key.as_bytes(), bytes)?;
        Ok(())
    }

    fn delete(&self, cf_name: &str, key: &str) -> Result<()> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| anyhow::anyhow!("column family '{}' not found", cf_name))?;
        self.db.delete_cf(&cf, key.as_bytes())?;
        Ok(())
    }

    fn scan_json<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| anyhow::anyhow!("column family '{}' not found", cf_name))?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    /// Persist a live channel record.
    pub fn put_channel(&self, channel: &Channel) -> Result<()> {
        self.put_json(CF_CHANNELS, &channel.id.to_string(), channel)
    }

    /// Persist an archived channel and drop its live record.
    pub fn put_archived_channel(&self, channel: &Channel) -> Result<()> {
        self.put_json(CF_ARCHIVE, &channel.id.to_string(), channel)?;
        self.delete(CF_CHANNELS, &channel.id.to_string())
    }

    /// Load all live channels.
    pub fn load_channels(&self) -> Result<Vec<Channel>> {
        self.scan_json(CF_CHANNELS)
    }

    /// Load all archived channels.
    pub fn load_archived_channels(&self) -> Result<Vec<Channel>> {
        self.scan_json(CF_ARCHIVE)
    }

    /// Persist a stream record.
    pub fn put_stream(&self, stream: &Stream) -> Result<()> {
        self.put_json(CF_STREAMS, &stream.id.to_string(), stream)
    }

    /// Load all streams.
    pub fn load_streams(&self) -> Result<Vec<Stream>> {
        self.scan_json(CF_STREAMS)
    }

    /// Persist a meter record.
    pub fn put_meter(&self, meter: &Meter) -> Result<()> {
        self.put_json(CF_METERS, &meter.id.to_string(), meter)
    }

    /// Load all meters.
    pub fn load_meters(&self) -> Result<Vec<Meter>> {
        self.scan_json(CF_METERS)
    }

    /// Persist a device record.
    pub fn put_device(&self, device: &Device) -> Result<()> {
        self.put_json(CF_DEVICES, &device.id.to_string(), device)
    }

    /// Load all devices.
    pub fn load_devices(&self) -> Result<Vec<Device>> {
        self.scan_json(CF_DEVICES)
    }

    /// Persist a usage charge record.
    pub fn put_charge(&self, charge: &UsageCharge) -> Result<()> {
        self.put_json(CF_CHARGES, &charge.id.to_string(), charge)
    }

    /// Load all usage charges.
    pub fn load_charges(&self) -> Result<Vec<UsageCharge>> {
        self.scan_json(CF_CHARGES)
    }
}
