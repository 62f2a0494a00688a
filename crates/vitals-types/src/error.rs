//! Error types for payload parsing in vitals-types.

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur when decoding a characteristic payload.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in vitals-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The payload is shorter than the layout requires.
    #[error("{kind} payload requires {expected} bytes, got {actual}")]
    InsufficientBytes {
        /// Which measurement was being decoded.
        kind: &'static str,
        /// Minimum number of bytes for the layout.
        expected: usize,
        /// Number of bytes received.
        actual: usize,
    },

    /// A decoded value falls outside its physical range.
    #[error("{field} value {value} is out of range")]
    OutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// The decoded raw value.
        value: i64,
    },

    /// The characteristic does not carry a vital sign.
    #[error("Characteristic {0} does not carry a vital sign")]
    UnknownCharacteristic(Uuid),
}

/// Result type alias using vitals-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_bytes_display() {
        let err = ParseError::InsufficientBytes {
            kind: "heart rate",
            expected: 2,
            actual: 1,
        };
        assert_eq!(err.to_string(), "heart rate payload requires 2 bytes, got 1");
    }

    #[test]
    fn test_out_of_range_display() {
        let err = ParseError::OutOfRange {
            field: "battery",
            value: 140,
        };
        assert!(err.to_string().contains("battery"));
        assert!(err.to_string().contains("140"));
    }
}
