//! Decoders for the vitals characteristic payloads.
//!
//! All multi-byte fields are little-endian. Layouts:
//!
//! | Characteristic | Layout |
//! |----------------|--------|
//! | Heart rate | flags, then `u8` bpm, or `u16` bpm when flag bit 0 is set |
//! | Blood pressure | flags, systolic `u16`, diastolic `u16`; raw / 10 → mmHg |
//! | Temperature | flags, `i16`; raw / 100 → °C |
//! | Oxygen saturation | flags, `u8` percent |
//! | Battery | `u8` percent |

use bytes::Buf;
use uuid::Uuid;

use crate::error::{ParseError, ParseResult};
use crate::uuid as uuids;

/// Heart rate flag: value is 16 bits wide.
const HR_VALUE_U16: u8 = 0x01;

/// A single decoded vital sign.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    HeartRate(u16),
    BloodPressure { systolic: f32, diastolic: f32 },
    Temperature(f32),
    OxygenSaturation(u8),
    Battery(u8),
}

impl Measurement {
    /// Decode `data` according to the characteristic it was received on.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::UnknownCharacteristic`] for a characteristic that
    /// carries no vital sign, or the decoder's error for a malformed payload.
    pub fn parse(characteristic: Uuid, data: &[u8]) -> ParseResult<Self> {
        match characteristic {
            c if c == uuids::HEART_RATE_MEASUREMENT => parse_heart_rate(data).map(Self::HeartRate),
            c if c == uuids::BLOOD_PRESSURE_MEASUREMENT => {
                let (systolic, diastolic) = parse_blood_pressure(data)?;
                Ok(Self::BloodPressure {
                    systolic,
                    diastolic,
                })
            }
            c if c == uuids::TEMPERATURE_MEASUREMENT => {
                parse_temperature(data).map(Self::Temperature)
            }
            c if c == uuids::OXYGEN_SATURATION_MEASUREMENT => {
                parse_oxygen_saturation(data).map(Self::OxygenSaturation)
            }
            c if c == uuids::BATTERY_LEVEL => parse_battery(data).map(Self::Battery),
            other => Err(ParseError::UnknownCharacteristic(other)),
        }
    }
}

fn require(kind: &'static str, data: &[u8], expected: usize) -> ParseResult<()> {
    if data.len() < expected {
        return Err(ParseError::InsufficientBytes {
            kind,
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

fn percent(field: &'static str, value: u8) -> ParseResult<u8> {
    if value > 100 {
        return Err(ParseError::OutOfRange {
            field,
            value: i64::from(value),
        });
    }
    Ok(value)
}

/// Decode a Heart Rate Measurement payload into beats per minute.
pub fn parse_heart_rate(data: &[u8]) -> ParseResult<u16> {
    require("heart rate", data, 2)?;
    let mut buf = data;
    let flags = buf.get_u8();
    if flags & HR_VALUE_U16 != 0 {
        require("heart rate", data, 3)?;
        Ok(buf.get_u16_le())
    } else {
        Ok(u16::from(buf.get_u8()))
    }
}

/// Decode a Blood Pressure Measurement payload into (systolic, diastolic) mmHg.
pub fn parse_blood_pressure(data: &[u8]) -> ParseResult<(f32, f32)> {
    require("blood pressure", data, 5)?;
    let mut buf = &data[1..];
    let systolic = buf.get_u16_le();
    let diastolic = buf.get_u16_le();
    Ok((f32::from(systolic) / 10.0, f32::from(diastolic) / 10.0))
}

/// Decode a Temperature Measurement payload into °C.
pub fn parse_temperature(data: &[u8]) -> ParseResult<f32> {
    require("temperature", data, 3)?;
    let mut buf = &data[1..];
    Ok(f32::from(buf.get_i16_le()) / 100.0)
}

/// Decode an oxygen saturation payload into a percentage.
pub fn parse_oxygen_saturation(data: &[u8]) -> ParseResult<u8> {
    require("oxygen saturation", data, 2)?;
    percent("oxygen_saturation", data[1])
}

/// Decode a Battery Level payload into a percentage.
pub fn parse_battery(data: &[u8]) -> ParseResult<u8> {
    require("battery", data, 1)?;
    percent("battery", data[0])
}
