//! Visual styling utilities for the CLI.
//!
//! Spinners for long-running BLE operations and colored formatting for
//! vital signs, signal strength and status messages.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

/// Standard spinner tick characters (Braille dots animation)
const SPINNER_TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Standard spinner tick interval
const SPINNER_TICK_MS: u64 = 80;

/// Battery percentages below these are shown red / yellow.
const BATTERY_LOW: u8 = 20;
const BATTERY_MEDIUM: u8 = 50;

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(SPINNER_TICK_CHARS)
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style());
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
    pb
}

/// Create a spinner for scanning operations.
pub fn scanning_spinner(timeout_secs: u64) -> ProgressBar {
    spinner(format!(
        "Scanning for health devices... ({}s)",
        timeout_secs
    ))
}

/// Create a spinner for connecting to a device.
pub fn connecting_spinner(device: &str) -> ProgressBar {
    spinner(format!("Connecting to {}...", device))
}

/// Format a vital value, red when it breaches a threshold.
pub fn format_vital(value: &str, alerting: bool, no_color: bool) -> String {
    if no_color {
        if alerting {
            format!("{}!", value)
        } else {
            value.to_string()
        }
    } else if alerting {
        format!("{}", value.red().bold())
    } else {
        format!("{}", value.green())
    }
}

/// Format battery percentage with appropriate color.
pub fn format_battery_colored(percent: u8, no_color: bool) -> String {
    if no_color {
        return format!("{}%", percent);
    }

    if percent < BATTERY_LOW {
        format!("{}%", percent.red())
    } else if percent < BATTERY_MEDIUM {
        format!("{}%", percent.yellow())
    } else {
        format!("{}%", percent.green())
    }
}

/// Format RSSI as a visual signal bar.
/// RSSI typically ranges from -100 dBm (weak) to -30 dBm (strong).
pub fn format_signal_bar(rssi: Option<i16>, no_color: bool) -> String {
    let Some(rssi) = rssi else {
        return "N/A".to_string();
    };

    let filled = (((rssi + 100).clamp(0, 70) as f32 / 7.0).round() as usize).min(10);
    let bar = format!("{}{}", "█".repeat(filled), "░".repeat(10 - filled));

    if no_color {
        format!("{} {:>4}", bar, rssi)
    } else if filled >= 7 {
        format!("{} {:>4}", bar.green(), rssi)
    } else if filled >= 4 {
        format!("{} {:>4}", bar.yellow(), rssi)
    } else {
        format!("{} {:>4}", bar.red(), rssi)
    }
}

/// Format a success message.
pub fn format_success(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[OK] {}", message)
    } else {
        format!("{} {}", "[OK]".green(), message)
    }
}

/// Format a warning message.
pub fn format_warning(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[!!] {}", message)
    } else {
        format!("{} {}", "[!!]".yellow(), message)
    }
}

/// Format a failure message.
pub fn format_failure(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[XX] {}", message)
    } else {
        format!("{} {}", "[XX]".red(), message)
    }
}

/// Format a title header.
pub fn format_title(title: &str, no_color: bool) -> String {
    let underline = "━".repeat(title.chars().count());
    if no_color {
        format!("{}\n{}", title, underline)
    } else {
        format!("{}\n{}", title.bold(), underline.dimmed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_bar_plain() {
        assert_eq!(format_signal_bar(None, true), "N/A");
        assert_eq!(format_signal_bar(Some(-30), true), "██████████  -30");
        assert_eq!(format_signal_bar(Some(-100), true), "░░░░░░░░░░ -100");
    }

    #[test]
    fn test_vital_marks_alert_without_color() {
        assert_eq!(format_vital("72 bpm", false, true), "72 bpm");
        assert_eq!(format_vital("92%", true, true), "92%!");
    }

    #[test]
    fn test_plain_messages() {
        assert_eq!(format_battery_colored(80, true), "80%");
        assert_eq!(format_success("done", true), "[OK] done");
        assert_eq!(format_warning("careful", true), "[!!] careful");
        assert_eq!(format_failure("broken", true), "[XX] broken");
        assert_eq!(format_title("Doctor", true), "Doctor\n━━━━━━");
    }
}
