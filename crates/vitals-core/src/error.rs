//! Error types for vitals-core.
//!
//! # Propagation
//!
//! | Failure | Surfaced as | Handling |
//! |---------|-------------|----------|
//! | Permission denied | [`Error::PermissionDenied`] | Returned to the caller; show [`Error::remediation`] |
//! | Adapter missing or off | [`Error::Bluetooth`], [`Error::DeviceNotFound`] | Returned to the caller |
//! | Connect failure | [`Error::ConnectionFailed`] | Manager moves to `Error`, caller receives the error |
//! | Malformed payload | [`vitals_types::ParseError`] | Logged; the notification is dropped |
//! | Storage failure | [`Error::Storage`] | Returned to the caller |
//!
//! Link loss is never returned as an error: the manager retries internally
//! and settles into `Disconnected` when the attempts run out.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while managing a wearable.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Required Bluetooth permissions were not granted.
    #[error("Bluetooth permissions denied: {}", missing.join(", "))]
    PermissionDenied {
        /// Permissions that are still missing.
        missing: Vec<String>,
    },

    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Device not found during scan or connection.
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceNotFoundReason),

    /// Operation attempted while not connected to device.
    #[error("Not connected to device")]
    NotConnected,

    /// Required characteristic not found on device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID that was not found.
        uuid: String,
    },

    /// Failed to decode data received from device.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// The manager is in a state that does not allow the operation.
    #[error("Cannot {operation} while {state}")]
    Busy {
        /// The rejected operation.
        operation: &'static str,
        /// State at the time of the call.
        state: vitals_types::ConnectionState,
    },

    /// Connection failed with specific reason.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// The device identifier that failed to connect.
        device_id: Option<String>,
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// Local persistence failed.
    #[error("Storage error: {0}")]
    Storage(#[from] vitals_store::Error),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Structured reasons for connection failures.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// Bluetooth adapter not available or powered off.
    AdapterUnavailable,
    /// Device is out of range.
    OutOfRange,
    /// Device rejected the connection.
    Rejected,
    /// Service discovery failed after the link came up.
    ServiceDiscovery(String),
    /// Subscribing to a vitals characteristic failed.
    Subscription(String),
    /// Generic BLE error.
    BleError(String),
    /// Other/unknown error.
    Other(String),
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AdapterUnavailable => write!(f, "Bluetooth adapter unavailable"),
            Self::OutOfRange => write!(f, "device out of range"),
            Self::Rejected => write!(f, "connection rejected by device"),
            Self::ServiceDiscovery(msg) => write!(f, "service discovery failed: {}", msg),
            Self::Subscription(msg) => write!(f, "subscription failed: {}", msg),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Reason why a device was not found.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum DeviceNotFoundReason {
    /// Device with specified identifier not found.
    NotFound { identifier: String },
    /// No Bluetooth adapter available.
    NoAdapter,
}

impl std::fmt::Display for DeviceNotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { identifier } => write!(f, "device '{}' not found", identifier),
            Self::NoAdapter => write!(f, "no Bluetooth adapter available"),
        }
    }
}

impl Error {
    /// Create a device not found error for a specific identifier.
    pub fn device_not_found(identifier: impl Into<String>) -> Self {
        Self::DeviceNotFound(DeviceNotFoundReason::NotFound {
            identifier: identifier.into(),
        })
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a characteristic not found error.
    pub fn characteristic_not_found(uuid: impl ToString) -> Self {
        Self::CharacteristicNotFound {
            uuid: uuid.to_string(),
        }
    }

    /// Create a connection failure with structured reason.
    pub fn connection_failed(device_id: Option<String>, reason: ConnectionFailureReason) -> Self {
        Self::ConnectionFailed { device_id, reason }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Actionable guidance for errors a user can fix.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::PermissionDenied { .. } => Some(
                "Grant Bluetooth and location permissions in the system settings, then scan again.",
            ),
            Self::DeviceNotFound(DeviceNotFoundReason::NoAdapter)
            | Self::ConnectionFailed {
                reason: ConnectionFailureReason::AdapterUnavailable,
                ..
            } => Some("Turn Bluetooth on and make sure an adapter is available."),
            Self::DeviceNotFound(_) => {
                Some("Make sure the wearable is charged, nearby and advertising, then scan again.")
            }
            Self::ConnectionFailed { .. } | Self::Bluetooth(_) => {
                Some("Move the wearable closer and make sure no other phone holds the connection.")
            }
            Self::NotConnected => Some("Connect to a device first."),
            Self::Busy { .. } => Some("Disconnect from the current device first."),
            _ => None,
        }
    }
}

impl From<vitals_types::ParseError> for Error {
    fn from(err: vitals_types::ParseError) -> Self {
        Error::InvalidData(err.to_string())
    }
}

/// Result type alias using vitals-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::device_not_found("AA:BB");
        assert!(err.to_string().contains("AA:BB"));

        let err = Error::NotConnected;
        assert_eq!(err.to_string(), "Not connected to device");

        let err = Error::timeout("connect", Duration::from_secs(10));
        assert!(err.to_string().contains("connect"));
        assert!(err.to_string().contains("10s"));
    }

    #[test]
    fn test_permission_denied_lists_missing() {
        let err = Error::PermissionDenied {
            missing: vec!["BLUETOOTH_SCAN".into(), "ACCESS_FINE_LOCATION".into()],
        };
        assert_eq!(
            err.to_string(),
            "Bluetooth permissions denied: BLUETOOTH_SCAN, ACCESS_FINE_LOCATION"
        );
        assert!(err.remediation().is_some());
    }

    #[test]
    fn test_remediation_for_adapter() {
        let err = Error::connection_failed(None, ConnectionFailureReason::AdapterUnavailable);
        assert!(err.remediation().unwrap().contains("Bluetooth on"));
        assert!(Error::Cancelled.remediation().is_none());
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: Error = vitals_types::ParseError::InsufficientBytes {
            kind: "battery",
            expected: 1,
            actual: 0,
        }
        .into();
        assert!(matches!(err, Error::InvalidData(_)));
        assert!(err.to_string().contains("battery"));
    }

    #[test]
    fn test_btleplug_error_conversion() {
        fn _assert_from_impl<T: From<btleplug::Error>>() {}
        _assert_from_impl::<Error>();
    }
}
