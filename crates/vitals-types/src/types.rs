//! Core types for wearable vitals data.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ParseError;
use crate::payload::Measurement;

/// A peripheral seen during a scan but not connected.
///
/// Every advertisement produces a fresh descriptor; re-discovery supersedes
/// an older value rather than updating it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceDescriptor {
    /// Platform-assigned identifier, stable for the pairing session.
    pub id: String,
    /// Advertised local name.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub name: Option<String>,
    /// Signal strength in dBm.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub rssi: Option<i16>,
    /// Service UUIDs present in the advertisement.
    #[cfg_attr(feature = "serde", serde(default))]
    pub service_uuids: Vec<Uuid>,
    /// Whether the peripheral accepts connections.
    pub connectable: bool,
}

impl DeviceDescriptor {
    /// Create a connectable descriptor with no name, RSSI or services.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            rssi: None,
            service_uuids: Vec::new(),
            connectable: true,
        }
    }

    /// Set the advertised name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the signal strength.
    #[must_use]
    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    /// Set the advertised services.
    #[must_use]
    pub fn with_services(mut self, services: impl IntoIterator<Item = Uuid>) -> Self {
        self.service_uuids = services.into_iter().collect();
        self
    }

    /// The name if advertised, otherwise the identifier.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Returns true if any advertised service is on the health allow-list.
    pub fn advertises_health_service(&self) -> bool {
        self.service_uuids
            .iter()
            .any(crate::uuid::is_health_service)
    }
}

/// A GATT service discovered on a connected peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ServiceInfo {
    pub uuid: Uuid,
    pub primary: bool,
}

/// Capability flags of a characteristic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CharacteristicProperties {
    pub read: bool,
    pub write: bool,
    pub notify: bool,
    pub indicate: bool,
}

impl CharacteristicProperties {
    /// Returns true if value changes can be pushed by the peripheral.
    pub fn can_subscribe(&self) -> bool {
        self.notify || self.indicate
    }
}

/// A characteristic discovered on a connected peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CharacteristicInfo {
    pub uuid: Uuid,
    /// The service this characteristic belongs to.
    pub service_uuid: Uuid,
    pub properties: CharacteristicProperties,
    /// Last raw value read or notified.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub last_value: Option<Vec<u8>>,
}

impl CharacteristicInfo {
    /// Create a characteristic with no cached value.
    pub fn new(uuid: Uuid, service_uuid: Uuid, properties: CharacteristicProperties) -> Self {
        Self {
            uuid,
            service_uuid,
            properties,
            last_value: None,
        }
    }
}

/// State derived from a live connection.
///
/// Snapshots are immutable. Every change produces a new value through one of
/// the `with_*` methods, so holders of an older snapshot never observe a
/// partial update.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConnectedDevice {
    pub descriptor: DeviceDescriptor,
    /// Services in discovery order.
    pub services: Vec<ServiceInfo>,
    /// Characteristics of all services, flattened.
    pub characteristics: Vec<CharacteristicInfo>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub battery_level: Option<u8>,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub last_seen: OffsetDateTime,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub connected_at: OffsetDateTime,
}

impl ConnectedDevice {
    /// Build the snapshot taken right after service discovery.
    pub fn new(
        descriptor: DeviceDescriptor,
        services: Vec<ServiceInfo>,
        characteristics: Vec<CharacteristicInfo>,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            descriptor,
            services,
            characteristics,
            battery_level: None,
            last_seen: now,
            connected_at: now,
        }
    }

    /// Device identifier.
    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    /// Look up a characteristic by UUID.
    pub fn characteristic(&self, uuid: Uuid) -> Option<&CharacteristicInfo> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }

    /// Vitals characteristics present on the device that accept subscriptions.
    pub fn subscribable_vitals(&self) -> Vec<Uuid> {
        crate::uuid::VITALS_CHARACTERISTICS
            .iter()
            .copied()
            .filter(|uuid| {
                self.characteristic(*uuid)
                    .is_some_and(|c| c.properties.can_subscribe())
            })
            .collect()
    }

    /// New snapshot with the characteristic's cached value replaced.
    #[must_use]
    pub fn with_value(&self, uuid: Uuid, value: &[u8], at: OffsetDateTime) -> Self {
        let mut next = self.clone();
        if let Some(c) = next.characteristics.iter_mut().find(|c| c.uuid == uuid) {
            c.last_value = Some(value.to_vec());
        }
        next.last_seen = at;
        next
    }

    /// New snapshot with the battery level replaced.
    #[must_use]
    pub fn with_battery(&self, level: u8, at: OffsetDateTime) -> Self {
        let mut next = self.clone();
        next.battery_level = Some(level);
        next.last_seen = at;
        next
    }
}

/// Connection lifecycle state.
///
/// ```text
/// Disconnected -> Scanning -> Connecting -> Connected -> Disconnecting -> Disconnected
/// ```
///
/// Any state may move to `Error`; `Error` returns to `Disconnected` after
/// cleanup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Scanning,
    Connecting,
    Connected,
    Disconnecting,
    Error,
}

impl ConnectionState {
    /// Returns true if the transition is part of the lifecycle.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        if self == next || next == Error {
            return true;
        }
        matches!(
            (self, next),
            (Disconnected, Scanning | Connecting)
                | (Scanning, Disconnected | Connecting)
                | (Connecting, Connected | Disconnected)
                // Supersede or link loss.
                | (Connected, Disconnecting | Connecting | Disconnected)
                | (Disconnecting, Disconnected)
                | (Error, Disconnected)
        )
    }

    /// Returns true while a device link exists or is being set up.
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting
                | ConnectionState::Connected
                | ConnectionState::Disconnecting
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Scanning => "scanning",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
            ConnectionState::Error => "error",
        };
        f.write_str(label)
    }
}

/// One parsed sample from a wearable.
///
/// Each notification decodes a single characteristic, so most readings carry
/// only some fields. Unset fields are `None`, never zero.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VitalsReading {
    /// Heart rate in beats per minute.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub heart_rate: Option<u16>,
    /// Systolic pressure in mmHg.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub systolic: Option<f32>,
    /// Diastolic pressure in mmHg.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub diastolic: Option<f32>,
    /// Body temperature in °C.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub temperature: Option<f32>,
    /// Oxygen saturation percentage (0-100).
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub oxygen_saturation: Option<u8>,
    /// Battery percentage (0-100).
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub battery: Option<u8>,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub captured_at: OffsetDateTime,
    /// Identifier of the source device.
    pub device_id: String,
}

impl VitalsReading {
    /// Create a reading with every vital unset.
    pub fn new(device_id: impl Into<String>, captured_at: OffsetDateTime) -> Self {
        Self {
            heart_rate: None,
            systolic: None,
            diastolic: None,
            temperature: None,
            oxygen_saturation: None,
            battery: None,
            captured_at,
            device_id: device_id.into(),
        }
    }

    /// Build the partial reading carried by one decoded measurement.
    pub fn from_measurement(
        measurement: Measurement,
        device_id: impl Into<String>,
        captured_at: OffsetDateTime,
    ) -> Self {
        let mut reading = Self::new(device_id, captured_at);
        match measurement {
            Measurement::HeartRate(bpm) => reading.heart_rate = Some(bpm),
            Measurement::BloodPressure {
                systolic,
                diastolic,
            } => {
                reading.systolic = Some(systolic);
                reading.diastolic = Some(diastolic);
            }
            Measurement::Temperature(celsius) => reading.temperature = Some(celsius),
            Measurement::OxygenSaturation(percent) => reading.oxygen_saturation = Some(percent),
            Measurement::Battery(percent) => reading.battery = Some(percent),
        }
        reading
    }

    /// Create a builder for constructing a `VitalsReading`.
    pub fn builder(device_id: impl Into<String>) -> VitalsReadingBuilder {
        VitalsReadingBuilder {
            reading: Self::new(device_id, OffsetDateTime::UNIX_EPOCH),
        }
    }

    /// Returns true if no vital is set.
    pub fn is_empty(&self) -> bool {
        self.heart_rate.is_none()
            && self.systolic.is_none()
            && self.diastolic.is_none()
            && self.temperature.is_none()
            && self.oxygen_saturation.is_none()
            && self.battery.is_none()
    }
}

/// Builder for [`VitalsReading`].
#[derive(Debug)]
#[must_use]
pub struct VitalsReadingBuilder {
    reading: VitalsReading,
}

impl VitalsReadingBuilder {
    pub fn heart_rate(mut self, bpm: u16) -> Self {
        self.reading.heart_rate = Some(bpm);
        self
    }

    pub fn blood_pressure(mut self, systolic: f32, diastolic: f32) -> Self {
        self.reading.systolic = Some(systolic);
        self.reading.diastolic = Some(diastolic);
        self
    }

    pub fn temperature(mut self, celsius: f32) -> Self {
        self.reading.temperature = Some(celsius);
        self
    }

    pub fn oxygen_saturation(mut self, percent: u8) -> Self {
        self.reading.oxygen_saturation = Some(percent);
        self
    }

    pub fn battery(mut self, percent: u8) -> Self {
        self.reading.battery = Some(percent);
        self
    }

    pub fn captured_at(mut self, timestamp: OffsetDateTime) -> Self {
        self.reading.captured_at = timestamp;
        self
    }

    /// Build without validation.
    #[must_use]
    pub fn build(self) -> VitalsReading {
        self.reading
    }

    /// Build, rejecting percentages above 100.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::OutOfRange`] for an invalid percentage.
    pub fn try_build(self) -> Result<VitalsReading, ParseError> {
        if let Some(spo2) = self.reading.oxygen_saturation.filter(|v| *v > 100) {
            return Err(ParseError::OutOfRange {
                field: "oxygen_saturation",
                value: i64::from(spo2),
            });
        }
        if let Some(battery) = self.reading.battery.filter(|v| *v > 100) {
            return Err(ParseError::OutOfRange {
                field: "battery",
                value: i64::from(battery),
            });
        }
        Ok(self.reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uuid as uuids;

    fn props(notify: bool) -> CharacteristicProperties {
        CharacteristicProperties {
            read: true,
            notify,
            ..Default::default()
        }
    }

    fn sample_device() -> ConnectedDevice {
        ConnectedDevice::new(
            DeviceDescriptor::new("AA:BB").with_name("Band"),
            vec![ServiceInfo {
                uuid: uuids::HEART_RATE_SERVICE,
                primary: true,
            }],
            vec![
                CharacteristicInfo::new(
                    uuids::HEART_RATE_MEASUREMENT,
                    uuids::HEART_RATE_SERVICE,
                    props(true),
                ),
                CharacteristicInfo::new(uuids::BATTERY_LEVEL, uuids::BATTERY_SERVICE, props(false)),
            ],
            OffsetDateTime::UNIX_EPOCH,
        )
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        let d = DeviceDescriptor::new("AA:BB");
        assert_eq!(d.display_name(), "AA:BB");
        assert_eq!(d.with_name("Band").display_name(), "Band");
    }

    #[test]
    fn test_advertises_health_service() {
        let d = DeviceDescriptor::new("x").with_services([uuids::PULSE_OXIMETER_SERVICE]);
        assert!(d.advertises_health_service());
        assert!(!DeviceDescriptor::new("y").advertises_health_service());
    }

    #[test]
    fn test_subscribable_vitals_skips_read_only() {
        let device = sample_device();
        assert_eq!(device.subscribable_vitals(), vec![uuids::HEART_RATE_MEASUREMENT]);
    }

    #[test]
    fn test_with_value_leaves_original_untouched() {
        let device = sample_device();
        let later = OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(5);
        let next = device.with_value(uuids::HEART_RATE_MEASUREMENT, &[0, 72], later);

        assert!(device
            .characteristic(uuids::HEART_RATE_MEASUREMENT)
            .and_then(|c| c.last_value.as_ref())
            .is_none());
        assert_eq!(
            next.characteristic(uuids::HEART_RATE_MEASUREMENT)
                .and_then(|c| c.last_value.clone()),
            Some(vec![0, 72])
        );
        assert_eq!(next.last_seen, later);
        assert_eq!(next.connected_at, device.connected_at);
    }

    #[test]
    fn test_with_battery() {
        let device = sample_device().with_battery(80, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(device.battery_level, Some(80));
    }

    #[test]
    fn test_state_transitions() {
        use ConnectionState::*;
        assert!(Disconnected.can_transition_to(Scanning));
        assert!(Scanning.can_transition_to(Disconnected));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Disconnecting));
        assert!(Error.can_transition_to(Disconnected));
        assert!(Scanning.can_transition_to(Error));
        assert!(!Disconnected.can_transition_to(Connected));
        assert!(!Error.can_transition_to(Connected));
        assert!(!Disconnecting.can_transition_to(Scanning));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Disconnecting.to_string(), "disconnecting");
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_from_measurement_sets_only_decoded_fields() {
        let r = VitalsReading::from_measurement(
            Measurement::BloodPressure {
                systolic: 120.0,
                diastolic: 80.0,
            },
            "dev",
            OffsetDateTime::UNIX_EPOCH,
        );
        assert_eq!(r.systolic, Some(120.0));
        assert_eq!(r.diastolic, Some(80.0));
        assert!(r.heart_rate.is_none());
        assert!(r.oxygen_saturation.is_none());
        assert!(!r.is_empty());
    }

    #[test]
    fn test_builder_try_build_rejects_bad_percent() {
        let err = VitalsReading::builder("dev")
            .oxygen_saturation(101)
            .try_build()
            .unwrap_err();
        assert_eq!(
            err,
            ParseError::OutOfRange {
                field: "oxygen_saturation",
                value: 101
            }
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_reading_json_omits_unknown_fields() {
        let reading = VitalsReading::builder("dev").heart_rate(72).build();
        let json = serde_json::to_string(&reading).unwrap();
        assert!(json.contains("\"heart_rate\":72"));
        assert!(!json.contains("systolic"));
        assert!(json.contains("1970-01-01T00:00:00Z"));

        let back: VitalsReading = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reading);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ConnectionState::Disconnecting).unwrap(),
            "\"disconnecting\""
        );
    }
}
