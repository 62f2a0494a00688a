//! Typed values kept under the well-known keys.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Temperature display unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

/// User-facing preferences (`user_preferences`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    pub temperature_unit: TemperatureUnit,
    /// Show a notification when a vitals alert fires.
    pub alert_notifications: bool,
    /// Reconnect to the last device on startup.
    pub auto_connect: bool,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            temperature_unit: TemperatureUnit::Celsius,
            alert_notifications: true,
            auto_connect: false,
        }
    }
}

/// Application settings (`app_settings`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Scan duration in seconds.
    pub scan_timeout_secs: u64,
    /// Queue readings for upload when the API is unreachable.
    pub queue_offline: bool,
    pub api_base_url: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            scan_timeout_secs: 15,
            queue_offline: true,
            api_base_url: None,
        }
    }
}

/// Onboarding progress (`onboarding_status`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingStatus {
    pub completed: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

/// One entry of `device_connection_history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub device_id: String,
    pub device_name: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub connected_at: OffsetDateTime,
}

/// WiFi credentials provisioned to a device (`wifi_config_<deviceId>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiConfig {
    pub ssid: String,
    /// Security mode label, e.g. `WPA2`.
    pub security: String,
    #[serde(with = "time::serde::rfc3339")]
    pub configured_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferences_fill_missing_fields() {
        let prefs: UserPreferences =
            serde_json::from_str(r#"{"temperature_unit":"fahrenheit"}"#).unwrap();
        assert_eq!(prefs.temperature_unit, TemperatureUnit::Fahrenheit);
        assert!(prefs.alert_notifications);
    }

    #[test]
    fn test_onboarding_without_timestamp() {
        let status: OnboardingStatus = serde_json::from_str(r#"{"completed":false}"#).unwrap();
        assert_eq!(status, OnboardingStatus::default());
    }
}
