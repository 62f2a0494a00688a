//! Bluetooth UUIDs for health wearables.
//!
//! All identifiers are the Bluetooth SIG assigned numbers expanded to the
//! 128-bit base UUID form (`0000xxxx-0000-1000-8000-00805f9b34fb`).

use uuid::{Uuid, uuid};

// --- Service UUIDs ---

/// Heart Rate service.
pub const HEART_RATE_SERVICE: Uuid = uuid!("0000180d-0000-1000-8000-00805f9b34fb");

/// Blood Pressure service.
pub const BLOOD_PRESSURE_SERVICE: Uuid = uuid!("00001810-0000-1000-8000-00805f9b34fb");

/// Health Thermometer service.
pub const HEALTH_THERMOMETER_SERVICE: Uuid = uuid!("00001809-0000-1000-8000-00805f9b34fb");

/// Pulse Oximeter service.
pub const PULSE_OXIMETER_SERVICE: Uuid = uuid!("00001822-0000-1000-8000-00805f9b34fb");

/// Battery service.
pub const BATTERY_SERVICE: Uuid = uuid!("0000180f-0000-1000-8000-00805f9b34fb");

/// Device Information service.
pub const DEVICE_INFO_SERVICE: Uuid = uuid!("0000180a-0000-1000-8000-00805f9b34fb");

/// Services a wearable must advertise to show up in a scan.
pub const HEALTH_SERVICES: [Uuid; 6] = [
    HEART_RATE_SERVICE,
    BLOOD_PRESSURE_SERVICE,
    HEALTH_THERMOMETER_SERVICE,
    PULSE_OXIMETER_SERVICE,
    BATTERY_SERVICE,
    DEVICE_INFO_SERVICE,
];

// --- Vitals Characteristic UUIDs ---

/// Heart Rate Measurement characteristic.
pub const HEART_RATE_MEASUREMENT: Uuid = uuid!("00002a37-0000-1000-8000-00805f9b34fb");

/// Blood Pressure Measurement characteristic.
pub const BLOOD_PRESSURE_MEASUREMENT: Uuid = uuid!("00002a35-0000-1000-8000-00805f9b34fb");

/// Temperature Measurement characteristic.
pub const TEMPERATURE_MEASUREMENT: Uuid = uuid!("00002a1c-0000-1000-8000-00805f9b34fb");

/// PLX Continuous Measurement (oxygen saturation) characteristic.
pub const OXYGEN_SATURATION_MEASUREMENT: Uuid = uuid!("00002a5f-0000-1000-8000-00805f9b34fb");

/// Battery Level characteristic.
pub const BATTERY_LEVEL: Uuid = uuid!("00002a19-0000-1000-8000-00805f9b34fb");

/// Characteristics the manager subscribes to after connecting.
pub const VITALS_CHARACTERISTICS: [Uuid; 5] = [
    HEART_RATE_MEASUREMENT,
    BLOOD_PRESSURE_MEASUREMENT,
    TEMPERATURE_MEASUREMENT,
    OXYGEN_SATURATION_MEASUREMENT,
    BATTERY_LEVEL,
];

// --- Device Information Characteristic UUIDs ---

/// Manufacturer name string characteristic.
pub const MANUFACTURER_NAME: Uuid = uuid!("00002a29-0000-1000-8000-00805f9b34fb");

/// Model number string characteristic.
pub const MODEL_NUMBER: Uuid = uuid!("00002a24-0000-1000-8000-00805f9b34fb");

/// Firmware revision string characteristic.
pub const FIRMWARE_REVISION: Uuid = uuid!("00002a26-0000-1000-8000-00805f9b34fb");

/// Returns true if `uuid` is one of the allow-listed health services.
pub fn is_health_service(uuid: &Uuid) -> bool {
    HEALTH_SERVICES.contains(uuid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heart_rate_service_uuid() {
        assert_eq!(
            HEART_RATE_SERVICE.to_string(),
            "0000180d-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_heart_rate_measurement_uuid() {
        assert_eq!(
            HEART_RATE_MEASUREMENT.to_string(),
            "00002a37-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_all_uuids_share_sig_base() {
        let suffix = "-0000-1000-8000-00805f9b34fb";
        for uuid in HEALTH_SERVICES.iter().chain(VITALS_CHARACTERISTICS.iter()) {
            assert!(uuid.to_string().ends_with(suffix), "{uuid} is not SIG-based");
        }
    }

    #[test]
    fn test_vitals_characteristics_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for uuid in VITALS_CHARACTERISTICS {
            assert!(seen.insert(uuid));
        }
    }

    #[test]
    fn test_is_health_service() {
        assert!(is_health_service(&PULSE_OXIMETER_SERVICE));
        assert!(!is_health_service(&HEART_RATE_MEASUREMENT));
    }
}
