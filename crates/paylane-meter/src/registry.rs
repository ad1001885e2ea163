use dashmap::DashMap;
use paylane_core::{Amount, DeviceId, MeterId};
use std::collections::HashSet;

use crate::error::MeterError;
use crate::types::{Credential, Device, Meter};

/// Registry of priced meters. Meters are immutable once created.
pub struct MeterRegistry {
    meters: DashMap<MeterId, Meter>,
}

impl MeterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            meters: DashMap::new(),
        }
    }

    /// Create a new meter. There is no update or delete: price changes
    /// require a new meter so historical billing stays auditable.
    pub fn create_meter(
        &self,
        name: impl Into<String>,
        unit: impl Into<String>,
        price_per_unit: Amount,
    ) -> Result<Meter, MeterError> {
        let name = name.into();
        let unit = unit.into();
        if name.is_empty() {
            return Err(MeterError::InvalidInput("meter name is empty".into()));
        }
        if unit.is_empty() {
            return Err(MeterError::InvalidInput("meter unit is empty".into()));
        }

        let meter = Meter {
            id: MeterId::new(),
            name,
            unit,
            price_per_unit,
            created_at: chrono::Utc::now(),
        };
        self.meters.insert(meter.id, meter.clone());
        tracing::info!(meter_id = %meter.id, name = %meter.name, price = %meter.price_per_unit, "meter created");
        Ok(meter)
    }

    /// Look up a meter.
    pub fn get(&self, id: MeterId) -> Result<Meter, MeterError> {
        self.meters
            .get(&id)
            .map(|m| m.clone())
            .ok_or(MeterError::MeterNotFound(id))
    }

    /// All meters.
    pub fn list(&self) -> Vec<Meter> {
        self.meters.iter().map(|e| e.clone()).collect()
    }

    /// Re-insert a meter loaded from durable storage.
    pub fn insert_restored(&self, meter: Meter) {
        self.meters.insert(meter.id, meter);
    }
}

impl Default for MeterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of credentialed devices.
pub struct DeviceRegistry {
    devices: DashMap<DeviceId, Device>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            devices: DashMap::new(),
        }
    }

    /// Register a device with the given meter scopes and monthly cap.
    /// The device starts enabled with a freshly issued credential.
    pub fn create_device(
        &self,
        name: impl Into<String>,
        scopes: HashSet<MeterId>,
        monthly_cap: Amount,
    ) -> Result<Device, MeterError> {
        let name = name.into();
        if name.is_empty() {
            return Err(MeterError::InvalidInput("device name is empty".into()));
        }

        let device = Device {
            id: DeviceId::new(),
            name,
            credential: Credential::issue(),
            scopes,
            monthly_cap,
            enabled: true,
            created_at: chrono::Utc::now(),
        };
        self.devices.insert(device.id, device.clone());
        tracing::info!(device_id = %device.id, name = %device.name, "device registered");
        Ok(device)
    }

    /// Rotate a device's credential.
    ///
    /// The successor is generated first, then swapped in as one field
    /// assignment under the device entry lock: the old token stops
    /// validating at the same instant the new one starts, with no gap
    /// and no overlap.
    pub fn rotate_credential(&self, id: DeviceId) -> Result<Credential, MeterError> {
        let mut entry = self
            .devices
            .get_mut(&id)
            .ok_or(MeterError::DeviceNotFound(id))?;
        let device = entry.value_mut();

        let next = device.credential.rotated();
        device.credential = next.clone();

        tracing::info!(device_id = %id, version = next.version, "device credential rotated");
        Ok(next)
    }

    /// Enable or disable a device. Idempotent.
    pub fn set_enabled(&self, id: DeviceId, enabled: bool) -> Result<Device, MeterError> {
        let mut entry = self
            .devices
            .get_mut(&id)
            .ok_or(MeterError::DeviceNotFound(id))?;
        let device = entry.value_mut();
        if device.enabled != enabled {
            device.enabled = enabled;
            tracing::info!(device_id = %id, enabled, "device toggled");
        }
        Ok(device.clone())
    }

    /// Verify a device token. Fails for unknown or disabled devices and
    /// for tokens from any credential other than the current one.
    pub fn authenticate(&self, id: DeviceId, token: &str) -> Result<(), MeterError> {
        let device = self
            .devices
            .get(&id)
            .ok_or(MeterError::DeviceNotFound(id))?;
        if !device.enabled {
            return Err(MeterError::DeviceDisabled(id));
        }
        if device.credential.token != token {
            return Err(MeterError::InvalidCredential(id));
        }
        Ok(())
    }

    /// Look up a device.
    pub fn get(&self, id: DeviceId) -> Result<Device, MeterError> {
        self.devices
            .get(&id)
            .map(|d| d.clone())
            .ok_or(MeterError::DeviceNotFound(id))
    }

    /// All devices.
    pub fn list(&self) -> Vec<Device> {
        self.devices.iter().map(|e| e.clone()).collect()
    }

    /// Re-insert a device loaded from durable storage.
    pub fn insert_restored(&self, device: Device) {
        self.devices.insert(device.id, device);
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
