//! Turning characteristic notifications into vitals readings.

use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use vitals_types::{ConnectedDevice, Measurement, ParseError, VitalsReading};

/// Result of handling one notification.
#[derive(Debug, Clone)]
pub struct NotificationOutcome {
    /// Snapshot with the cached value, `last_seen` and battery refreshed.
    pub snapshot: ConnectedDevice,
    /// The partial reading, if the payload decoded.
    pub reading: Option<VitalsReading>,
}

/// Decode a notification received on `characteristic`.
///
/// Malformed payloads are logged and yield no reading; the snapshot is still
/// refreshed with the raw value.
pub fn process_notification(
    device: &ConnectedDevice,
    characteristic: Uuid,
    value: &[u8],
    at: OffsetDateTime,
) -> NotificationOutcome {
    let mut snapshot = device.with_value(characteristic, value, at);

    let reading = match Measurement::parse(characteristic, value) {
        Ok(measurement) => {
            if let Measurement::Battery(level) = measurement {
                snapshot = snapshot.with_battery(level, at);
            }
            debug!("{} -> {:?}", characteristic, measurement);
            Some(VitalsReading::from_measurement(measurement, device.id(), at))
        }
        Err(ParseError::UnknownCharacteristic(uuid)) => {
            debug!("Ignoring notification on {}", uuid);
            None
        }
        Err(e) => {
            warn!(
                "Dropping malformed payload from {} on {}: {} ({:02X?})",
                device.id(),
                characteristic,
                e,
                value
            );
            None
        }
    };

    NotificationOutcome { snapshot, reading }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitals_types::{
        CharacteristicInfo, CharacteristicProperties, DeviceDescriptor, uuids,
    };

    fn device() -> ConnectedDevice {
        let notify = CharacteristicProperties {
            notify: true,
            ..Default::default()
        };
        ConnectedDevice::new(
            DeviceDescriptor::new("band-1"),
            Vec::new(),
            vec![
                CharacteristicInfo::new(
                    uuids::HEART_RATE_MEASUREMENT,
                    uuids::HEART_RATE_SERVICE,
                    notify,
                ),
                CharacteristicInfo::new(uuids::BATTERY_LEVEL, uuids::BATTERY_SERVICE, notify),
            ],
            OffsetDateTime::UNIX_EPOCH,
        )
    }

    fn later() -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH + time::Duration::minutes(1)
    }

    #[test]
    fn test_heart_rate_notification() {
        let out = process_notification(
            &device(),
            uuids::HEART_RATE_MEASUREMENT,
            &[0x01, 0x48, 0x00],
            later(),
        );
        let reading = out.reading.unwrap();
        assert_eq!(reading.heart_rate, Some(72));
        assert_eq!(reading.device_id, "band-1");
        assert_eq!(reading.captured_at, later());
        assert_eq!(out.snapshot.last_seen, later());
    }

    #[test]
    fn test_battery_notification_updates_snapshot() {
        let out = process_notification(&device(), uuids::BATTERY_LEVEL, &[64], later());
        assert_eq!(out.snapshot.battery_level, Some(64));
        assert_eq!(out.reading.and_then(|r| r.battery), Some(64));
    }

    #[test]
    fn test_malformed_payload_emits_nothing() {
        let out = process_notification(&device(), uuids::HEART_RATE_MEASUREMENT, &[0x01], later());
        assert!(out.reading.is_none());
        assert_eq!(
            out.snapshot
                .characteristic(uuids::HEART_RATE_MEASUREMENT)
                .and_then(|c| c.last_value.clone()),
            Some(vec![0x01])
        );
    }

    #[test]
    fn test_unknown_characteristic_ignored() {
        let out = process_notification(&device(), uuids::MODEL_NUMBER, b"X1", later());
        assert!(out.reading.is_none());
    }
}
