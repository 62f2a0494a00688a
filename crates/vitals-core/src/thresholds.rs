//! Clinical bounds for vitals alerting.
//!
//! # Example
//!
//! ```
//! use vitals_core::{AlertKind, VitalThresholds};
//! use vitals_types::VitalsReading;
//!
//! let thresholds = VitalThresholds::default();
//! let reading = VitalsReading::builder("band").oxygen_saturation(92).build();
//! assert_eq!(thresholds.evaluate(&reading), vec![AlertKind::LowOxygen(92)]);
//! ```

use serde::{Deserialize, Serialize};

use vitals_types::VitalsReading;

/// A vital sign outside its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AlertKind {
    HeartRateLow(u16),
    HeartRateHigh(u16),
    SystolicHigh(f32),
    DiastolicHigh(f32),
    TemperatureLow(f32),
    TemperatureHigh(f32),
    LowOxygen(u8),
}

impl AlertKind {
    /// Short human-readable description.
    pub fn description(&self) -> String {
        match self {
            Self::HeartRateLow(bpm) => format!("Heart rate low: {bpm} bpm"),
            Self::HeartRateHigh(bpm) => format!("Heart rate high: {bpm} bpm"),
            Self::SystolicHigh(mmhg) => format!("Systolic pressure high: {mmhg:.0} mmHg"),
            Self::DiastolicHigh(mmhg) => format!("Diastolic pressure high: {mmhg:.0} mmHg"),
            Self::TemperatureLow(c) => format!("Body temperature low: {c:.1} °C"),
            Self::TemperatureHigh(c) => format!("Body temperature high: {c:.1} °C"),
            Self::LowOxygen(pct) => format!("Oxygen saturation low: {pct}%"),
        }
    }
}

/// Alerting bounds. Values on a bound are normal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VitalThresholds {
    pub heart_rate_min: u16,
    pub heart_rate_max: u16,
    pub systolic_max: f32,
    pub diastolic_max: f32,
    pub temperature_min: f32,
    pub temperature_max: f32,
    pub oxygen_saturation_min: u8,
}

impl Default for VitalThresholds {
    fn default() -> Self {
        Self {
            heart_rate_min: 60,
            heart_rate_max: 100,
            systolic_max: 140.0,
            diastolic_max: 90.0,
            temperature_min: 36.0,
            temperature_max: 37.5,
            oxygen_saturation_min: 95,
        }
    }
}

impl VitalThresholds {
    /// Every bound the reading violates. Unknown fields never alert.
    pub fn evaluate(&self, reading: &VitalsReading) -> Vec<AlertKind> {
        let mut alerts = Vec::new();

        if let Some(bpm) = reading.heart_rate {
            if bpm < self.heart_rate_min {
                alerts.push(AlertKind::HeartRateLow(bpm));
            } else if bpm > self.heart_rate_max {
                alerts.push(AlertKind::HeartRateHigh(bpm));
            }
        }
        if let Some(sys) = reading.systolic.filter(|v| *v > self.systolic_max) {
            alerts.push(AlertKind::SystolicHigh(sys));
        }
        if let Some(dia) = reading.diastolic.filter(|v| *v > self.diastolic_max) {
            alerts.push(AlertKind::DiastolicHigh(dia));
        }
        if let Some(temp) = reading.temperature {
            if temp < self.temperature_min {
                alerts.push(AlertKind::TemperatureLow(temp));
            } else if temp > self.temperature_max {
                alerts.push(AlertKind::TemperatureHigh(temp));
            }
        }
        if let Some(spo2) = reading
            .oxygen_saturation
            .filter(|v| *v < self.oxygen_saturation_min)
        {
            alerts.push(AlertKind::LowOxygen(spo2));
        }

        alerts
    }

    /// Returns true if any bound is violated.
    pub fn is_alerting(&self, reading: &VitalsReading) -> bool {
        !self.evaluate(reading).is_empty()
    }
}
