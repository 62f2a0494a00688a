//! Platform-agnostic types for BLE wearable vitals monitors.
//!
//! This crate provides the shared data model used by the connectivity
//! manager, the storage facade and the API client.
//!
//! # Features
//!
//! - Device descriptors, connected-device snapshots and connection states
//! - Vitals readings with explicit unknown fields
//! - GATT UUID constants for the health services
//! - Decoders for the vitals characteristic payloads
//!
//! # Example
//!
//! ```
//! use vitals_types::{Measurement, uuids};
//!
//! let m = Measurement::parse(uuids::HEART_RATE_MEASUREMENT, &[0x00, 0x48]).unwrap();
//! assert_eq!(m, Measurement::HeartRate(72));
//! ```

pub mod error;
pub mod payload;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use payload::Measurement;
pub use types::{
    CharacteristicInfo, CharacteristicProperties, ConnectedDevice, ConnectionState,
    DeviceDescriptor, ServiceInfo, VitalsReading, VitalsReadingBuilder,
};
pub use uuid as uuids;
