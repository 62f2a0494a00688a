//! Output formatting for text and JSON output.

use anyhow::Result;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use vitals_core::api_client::HealthAlert;
use vitals_core::{AlertKind, VitalThresholds};
use vitals_store::ConnectionRecord;
use vitals_types::{DeviceDescriptor, VitalsReading};

use crate::style;

/// Formatting options for output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
    /// Use compact JSON output (no pretty-printing).
    pub compact: bool,
}

impl FormatOptions {
    pub fn new(no_color: bool) -> Self {
        Self {
            no_color,
            compact: false,
        }
    }

    /// Serialize value to JSON string, respecting compact option.
    pub fn as_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        let json = if self.compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        };
        Ok(json + "\n")
    }
}

fn timestamp(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.to_string())
}

// ============================================================================
// Scan
// ============================================================================

pub fn format_scan_text(devices: &[&DeviceDescriptor], opts: &FormatOptions) -> String {
    if devices.is_empty() {
        return "No health devices found.\n".to_string();
    }

    let mut out = format!("Found {} device(s):\n\n", devices.len());
    out.push_str(&format!("{:<24} {:<20} {}\n", "NAME", "IDENTIFIER", "SIGNAL"));
    for device in devices {
        out.push_str(&format!(
            "{:<24} {:<20} {}\n",
            device.name.as_deref().unwrap_or("Unknown"),
            device.id,
            style::format_signal_bar(device.rssi, opts.no_color)
        ));
    }
    out
}

pub fn format_scan_json(devices: &[&DeviceDescriptor], opts: &FormatOptions) -> Result<String> {
    opts.as_json(devices)
}

// ============================================================================
// Readings
// ============================================================================

/// One line per reading, listing only the vitals it carries.
pub fn format_reading_line(
    reading: &VitalsReading,
    thresholds: &VitalThresholds,
    opts: &FormatOptions,
) -> String {
    let alerts = thresholds.evaluate(reading);
    let flagged = |check: fn(&AlertKind) -> bool| alerts.iter().any(check);

    let mut parts = Vec::new();
    if let Some(bpm) = reading.heart_rate {
        let alerting = flagged(|a| {
            matches!(a, AlertKind::HeartRateLow(_) | AlertKind::HeartRateHigh(_))
        });
        parts.push(format!(
            "HR {}",
            style::format_vital(&format!("{} bpm", bpm), alerting, opts.no_color)
        ));
    }
    if let (Some(sys), Some(dia)) = (reading.systolic, reading.diastolic) {
        let alerting = flagged(|a| {
            matches!(a, AlertKind::SystolicHigh(_) | AlertKind::DiastolicHigh(_))
        });
        parts.push(format!(
            "BP {}",
            style::format_vital(&format!("{:.0}/{:.0} mmHg", sys, dia), alerting, opts.no_color)
        ));
    }
    if let Some(celsius) = reading.temperature {
        let alerting = flagged(|a| {
            matches!(a, AlertKind::TemperatureLow(_) | AlertKind::TemperatureHigh(_))
        });
        parts.push(format!(
            "Temp {}",
            style::format_vital(&format!("{:.1}°C", celsius), alerting, opts.no_color)
        ));
    }
    if let Some(spo2) = reading.oxygen_saturation {
        let alerting = flagged(|a| matches!(a, AlertKind::LowOxygen(_)));
        parts.push(format!(
            "SpO2 {}",
            style::format_vital(&format!("{}%", spo2), alerting, opts.no_color)
        ));
    }
    if let Some(battery) = reading.battery {
        parts.push(format!(
            "Battery {}",
            style::format_battery_colored(battery, opts.no_color)
        ));
    }

    format!("[{}] {}\n", timestamp(reading.captured_at), parts.join("  "))
}

pub fn format_reading_json(reading: &VitalsReading, opts: &FormatOptions) -> Result<String> {
    // One object per line so the stream can be piped
    let compact = FormatOptions {
        compact: true,
        ..*opts
    };
    compact.as_json(reading)
}

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StorageStatus {
    pub pending_uploads: usize,
    pub authenticated: bool,
    pub connections: Vec<ConnectionRecord>,
}

pub fn format_status_text(status: &StorageStatus, opts: &FormatOptions) -> String {
    let mut out = style::format_title("Vitals Status", opts.no_color);
    out.push_str("\n\n");
    out.push_str(&format!("Pending uploads: {}\n", status.pending_uploads));
    out.push_str(&format!(
        "API token:       {}\n",
        if status.authenticated { "stored" } else { "not set" }
    ));

    if status.connections.is_empty() {
        out.push_str("\nNo connections recorded.\n");
    } else {
        out.push_str("\nRecent connections:\n");
        for record in &status.connections {
            out.push_str(&format!(
                "  {}  {}{}\n",
                timestamp(record.connected_at),
                record.device_id,
                record
                    .device_name
                    .as_deref()
                    .map(|n| format!(" ({})", n))
                    .unwrap_or_default()
            ));
        }
    }
    out
}

// ============================================================================
// Alerts
// ============================================================================

pub fn format_alerts_text(alerts: &[HealthAlert], opts: &FormatOptions) -> String {
    if alerts.is_empty() {
        return style::format_success("No active alerts", opts.no_color) + "\n";
    }
    alerts
        .iter()
        .map(|alert| {
            format!(
                "{} ({})\n",
                style::format_warning(&alert.message, opts.no_color),
                timestamp(alert.created_at)
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> FormatOptions {
        FormatOptions::new(true)
    }

    #[test]
    fn test_scan_text_empty() {
        assert_eq!(format_scan_text(&[], &plain()), "No health devices found.\n");
    }

    #[test]
    fn test_scan_text_lists_devices() {
        let named = DeviceDescriptor::new("AA:BB").with_name("Vitals Band").with_rssi(-60);
        let anonymous = DeviceDescriptor::new("CC:DD");
        let text = format_scan_text(&[&named, &anonymous], &plain());
        assert!(text.starts_with("Found 2 device(s):"));
        assert!(text.contains("Vitals Band"));
        assert!(text.contains("Unknown"));
        assert!(text.contains("N/A"));
    }

    #[test]
    fn test_scan_json_is_array() {
        let device = DeviceDescriptor::new("AA:BB");
        let json = format_scan_json(&[&device], &plain()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["id"], "AA:BB");
    }

    #[test]
    fn test_reading_line_shows_present_vitals_only() {
        let reading = VitalsReading::builder("band")
            .heart_rate(72)
            .blood_pressure(120.0, 80.0)
            .captured_at(OffsetDateTime::UNIX_EPOCH)
            .build();
        let line = format_reading_line(&reading, &VitalThresholds::default(), &plain());
        assert_eq!(
            line,
            "[1970-01-01T00:00:00Z] HR 72 bpm  BP 120/80 mmHg\n"
        );
    }

    #[test]
    fn test_reading_line_flags_breaches() {
        let reading = VitalsReading::builder("band")
            .oxygen_saturation(92)
            .battery(15)
            .build();
        let line = format_reading_line(&reading, &VitalThresholds::default(), &plain());
        assert!(line.contains("SpO2 92%!"));
        assert!(line.contains("Battery 15%"));
    }

    #[test]
    fn test_reading_json_is_single_line() {
        let reading = VitalsReading::builder("band").heart_rate(72).build();
        let json = format_reading_json(&reading, &plain()).unwrap();
        assert_eq!(json.lines().count(), 1);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["heart_rate"], 72);
    }

    #[test]
    fn test_status_text() {
        let status = StorageStatus {
            pending_uploads: 3,
            authenticated: false,
            connections: vec![],
        };
        let text = format_status_text(&status, &plain());
        assert!(text.contains("Pending uploads: 3"));
        assert!(text.contains("not set"));
        assert!(text.contains("No connections recorded."));
    }

    #[test]
    fn test_alerts_text_empty() {
        assert_eq!(format_alerts_text(&[], &plain()), "[OK] No active alerts\n");
    }
}
