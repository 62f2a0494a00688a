//! Core BLE library for wearable vital-sign monitors.
//!
//! This crate connects to a single health wearable over Bluetooth Low
//! Energy, decodes its GATT notifications into vitals readings and keeps a
//! derived health view for presentation layers.
//!
//! # Features
//!
//! - **Discovery**: scan for peripherals advertising standard health services
//! - **Connection lifecycle**: one connection at a time, with an explicit state machine
//! - **Vitals decoding**: heart rate, blood pressure, temperature, SpO2 and battery
//! - **Auto-reconnection**: three attempts at 2 s, 4 s and 8 s after link loss
//! - **Health context**: 24 h history and threshold alerts over a `watch` channel
//! - **Offline sync** (feature `api-client`): upload readings, queueing them while offline
//!
//! # Supported Services
//!
//! | Service | UUID | Characteristic |
//! |---------|------|----------------|
//! | Heart Rate | 0x180D | Heart Rate Measurement (0x2A37) |
//! | Blood Pressure | 0x1810 | Blood Pressure Measurement (0x2A35) |
//! | Health Thermometer | 0x1809 | Temperature Measurement (0x2A1C) |
//! | Pulse Oximeter | 0x1822 | SpO2 (0x2A5F) |
//! | Battery | 0x180F | Battery Level (0x2A19) |
//! | Device Information | 0x180A | - |
//!
//! # Platform Differences
//!
//! On macOS peripherals are identified by a CoreBluetooth UUID rather than a
//! MAC address. The UUID is stable for a given device on a given Mac but
//! differs between machines. See [`create_identifier`].
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use vitals_core::{BtleplugTransport, ConnectivityManager, DeviceEvent, platform_gate};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(BtleplugTransport::new().await?);
//!     let manager = ConnectivityManager::new(transport, platform_gate());
//!
//!     let mut events = manager.subscribe();
//!     manager.start_scanning(None).await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         if let DeviceEvent::DeviceDiscovered { device } = event {
//!             manager.connect_to_device(&device.id).await?;
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod ble;
pub mod error;
pub mod events;
pub mod health;
pub mod manager;
pub mod mock;
pub mod permissions;
pub mod readings;
pub mod reconnect;
pub mod retry;
pub mod scan;
pub mod thresholds;
pub mod traits;
pub mod util;

#[cfg(feature = "api-client")]
pub mod api_client;
#[cfg(feature = "api-client")]
pub mod sync;

// Re-export types and uuid modules from vitals-types
pub use vitals_types::types;
pub use vitals_types::uuid;

pub use ble::{BtleplugTransport, get_adapter};
pub use error::{ConnectionFailureReason, DeviceNotFoundReason, Error, Result};
pub use events::{DeviceEvent, DisconnectReason, EventDispatcher, EventReceiver, EventSender};
pub use health::{HealthConfig, HealthDataContext, HealthSnapshot};
pub use manager::{ConnectivityManager, ManagerConfig};
pub use mock::{MockPeripheral, MockPermissions, MockTransport};
pub use permissions::{
    GranularPermissionGate, NoPermissionModel, PermissionBackend, Platform, REQUIRED_PERMISSIONS,
    platform_gate,
};
pub use readings::{NotificationOutcome, process_notification};
pub use reconnect::ReconnectPolicy;
pub use retry::{Backoff, RetryConfig, Retryable, with_retry};
pub use scan::DiscoveryList;
pub use thresholds::{AlertKind, VitalThresholds};
pub use traits::{
    BleTransport, DiscoveredServices, PermissionGate, PermissionStatus, TransportEvent,
};
pub use util::{create_identifier, format_peripheral_id, identifier_matches};

#[cfg(feature = "api-client")]
pub use api_client::{ApiClient, ApiError};
#[cfg(feature = "api-client")]
pub use sync::{SyncError, SyncOutcome, VitalsSync};

// Re-export from vitals-types
pub use vitals_types::uuid as uuids;
pub use vitals_types::{
    ConnectedDevice, ConnectionState, DeviceDescriptor, Measurement, ParseError, VitalsReading,
};
