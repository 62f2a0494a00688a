//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::cli::ConfigKey;

/// Scan timeout used when neither the flag nor the config sets one.
pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 15;

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Default device identifier
    #[serde(default)]
    pub device: Option<String>,

    /// Connection timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Scan timeout in seconds
    #[serde(default)]
    pub scan_timeout: Option<u64>,

    /// Backend API base URL
    #[serde(default)]
    pub api_url: Option<String>,

    /// Queue readings for upload while watching
    #[serde(default)]
    pub queue_offline: bool,

    /// Last successfully connected device (auto-updated)
    #[serde(default)]
    pub last_device: Option<String>,

    /// Name of the last connected device (for display)
    #[serde(default)]
    pub last_device_name: Option<String>,
}

impl Config {
    /// Get the config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vitals")
            .join("config.toml")
    }

    /// Load config from the default path, or return default if not found
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load config from `path`; unreadable or malformed files fall back to defaults.
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        eprintln!("Warning: Failed to parse config: {}", e);
                    }
                },
                Err(e) => {
                    eprintln!("Warning: Failed to read config: {}", e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Current value of `key`, formatted for display.
    pub fn get(&self, key: ConfigKey) -> Option<String> {
        match key {
            ConfigKey::Device => self.device.clone(),
            ConfigKey::Timeout => self.timeout.map(|t| t.to_string()),
            ConfigKey::ScanTimeout => self.scan_timeout.map(|t| t.to_string()),
            ConfigKey::ApiUrl => self.api_url.clone(),
            ConfigKey::QueueOffline => Some(self.queue_offline.to_string()),
        }
    }

    /// Parse and store `value` under `key`.
    pub fn set(&mut self, key: ConfigKey, value: &str) -> Result<()> {
        match key {
            ConfigKey::Device => self.device = Some(value.to_string()),
            ConfigKey::Timeout => self.timeout = Some(parse_secs(value)?),
            ConfigKey::ScanTimeout => self.scan_timeout = Some(parse_secs(value)?),
            ConfigKey::ApiUrl => {
                if !value.starts_with("http://") && !value.starts_with("https://") {
                    bail!("API URL must start with http:// or https://");
                }
                self.api_url = Some(value.trim_end_matches('/').to_string());
            }
            ConfigKey::QueueOffline => self.queue_offline = parse_bool(value)?,
        }
        Ok(())
    }

    pub fn unset(&mut self, key: ConfigKey) {
        match key {
            ConfigKey::Device => self.device = None,
            ConfigKey::Timeout => self.timeout = None,
            ConfigKey::ScanTimeout => self.scan_timeout = None,
            ConfigKey::ApiUrl => self.api_url = None,
            ConfigKey::QueueOffline => self.queue_offline = false,
        }
    }

    /// Scan timeout: explicit flag, then config, then the default.
    pub fn resolve_scan_timeout(&self, flag: Option<u64>) -> u64 {
        flag.or(self.scan_timeout)
            .unwrap_or(DEFAULT_SCAN_TIMEOUT_SECS)
    }
}

fn parse_secs(value: &str) -> Result<u64> {
    match value.parse::<u64>() {
        Ok(0) => bail!("Timeout must be greater than zero"),
        Ok(secs) => Ok(secs),
        Err(_) => bail!("'{}' is not a valid number of seconds", value),
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => bail!(
            "Invalid boolean value '{}'. Use: true/false, yes/no, on/off, 1/0",
            value
        ),
    }
}

/// Resolve device from arg, env var, or config.
/// Falls back to last_device if no default device is set.
pub fn resolve_device(device: Option<String>, config: &Config) -> Option<String> {
    device
        .or_else(|| config.device.clone())
        .or_else(|| config.last_device.clone())
}

/// Connection timeout: an explicit non-default flag wins over config.
pub fn resolve_timeout(flag: u64, config: &Config, default: u64) -> u64 {
    if flag != default {
        flag
    } else {
        config.timeout.unwrap_or(default)
    }
}

/// Update the last connected device in config.
/// This is called after a successful connection.
pub fn update_last_device(identifier: &str, name: Option<&str>) -> Result<()> {
    let mut config = Config::load();
    config.last_device = Some(identifier.to_string());
    config.last_device_name = name.map(|n| n.to_string());
    config.save()
}
