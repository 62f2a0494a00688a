//! Trait abstractions for the Bluetooth transport and platform permissions.
//!
//! [`BleTransport`] is the seam between the connectivity manager and the
//! radio: [`crate::ble::BtleplugTransport`] drives real hardware and
//! [`crate::mock::MockTransport`] scripts a peripheral for tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vitals_types::{DeviceDescriptor, ServiceInfo};

use crate::error::Result;

/// Services and characteristics reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredServices {
    pub services: Vec<ServiceInfo>,
    pub characteristics: Vec<vitals_types::CharacteristicInfo>,
}

/// Link-level events for one connected peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A subscribed characteristic changed.
    Notification { characteristic: Uuid, value: Vec<u8> },
    /// The peripheral dropped the link.
    Disconnected,
}

/// Operations the manager needs from a BLE stack.
///
/// Peripherals are addressed by the identifier carried in
/// [`DeviceDescriptor::id`].
#[async_trait]
pub trait BleTransport: Send + Sync {
    /// Start scanning for peripherals advertising any of `services`.
    ///
    /// The stream yields one descriptor per advertisement and ends when the
    /// scan is stopped.
    async fn start_scan(&self, services: &[Uuid]) -> Result<BoxStream<'static, DeviceDescriptor>>;

    /// Stop an active scan. Must be safe to call when not scanning.
    async fn stop_scan(&self) -> Result<()>;

    /// Open a link to the peripheral.
    async fn connect(&self, id: &str) -> Result<DeviceDescriptor>;

    /// Discover services and characteristics on a connected peripheral.
    async fn discover_services(&self, id: &str) -> Result<DiscoveredServices>;

    /// Read a characteristic value.
    async fn read(&self, id: &str, characteristic: Uuid) -> Result<Vec<u8>>;

    /// Enable notifications for a characteristic.
    async fn subscribe(&self, id: &str, characteristic: Uuid) -> Result<()>;

    /// Disable notifications for a characteristic.
    async fn unsubscribe(&self, id: &str, characteristic: Uuid) -> Result<()>;

    /// Notifications and link loss for a connected peripheral.
    ///
    /// The stream ends when the link is closed.
    async fn events(&self, id: &str) -> Result<BoxStream<'static, TransportEvent>>;

    /// Close the link.
    async fn disconnect(&self, id: &str) -> Result<()>;
}

/// Outcome of a permission query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionStatus {
    /// True when every required permission is granted.
    pub granted: bool,
    /// Per-permission verdicts. Empty on platforms without a granular model.
    pub permissions: BTreeMap<String, bool>,
}

impl PermissionStatus {
    /// A status with nothing to ask for.
    pub fn granted() -> Self {
        Self {
            granted: true,
            permissions: BTreeMap::new(),
        }
    }

    /// Build a status from per-permission verdicts.
    pub fn from_permissions(permissions: BTreeMap<String, bool>) -> Self {
        let granted = permissions.values().all(|granted| *granted);
        Self {
            granted,
            permissions,
        }
    }

    /// Names of permissions that are not granted.
    pub fn missing(&self) -> Vec<String> {
        self.permissions
            .iter()
            .filter(|(_, granted)| !**granted)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Checks and requests the Bluetooth permissions needed to scan.
///
/// Implementations fail closed: a backend error is reported as a denial,
/// never as an `Err`.
#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn check_all_permissions(&self) -> PermissionStatus;

    async fn request_all_permissions(&self) -> PermissionStatus;
}
