//! Scan command implementation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;
use vitals_core::{
    BtleplugTransport, ConnectionState, ConnectivityManager, DeviceEvent, DiscoveryList,
    platform_gate,
};

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, format_scan_json, format_scan_text};
use crate::style;
use crate::util::{with_hint, write_output};

pub async fn cmd_scan(
    timeout: u64,
    format: OutputFormat,
    output: Option<&PathBuf>,
    quiet: bool,
    opts: &FormatOptions,
) -> Result<()> {
    let transport = BtleplugTransport::new()
        .await
        .map_err(with_hint)
        .context("Failed to open Bluetooth adapter")?;
    let manager = ConnectivityManager::new(Arc::new(transport), platform_gate());

    // Show spinner for text output (unless quiet)
    let spinner =
        (!quiet && format == OutputFormat::Text).then(|| style::scanning_spinner(timeout));

    let devices = discover(&manager, Duration::from_secs(timeout)).await;

    if let Some(sp) = spinner {
        sp.finish_and_clear();
    }
    let devices = devices?;

    let sorted = devices.by_signal();
    let content = match format {
        OutputFormat::Json => format_scan_json(&sorted, opts)?,
        OutputFormat::Text => format_scan_text(&sorted, opts),
    };
    write_output(output, &content)
}

/// Scan for `timeout` and collect the deduplicated devices.
pub async fn discover(
    manager: &Arc<ConnectivityManager>,
    timeout: Duration,
) -> Result<DiscoveryList> {
    let mut events = manager.subscribe();
    manager
        .start_scanning(Some(timeout))
        .await
        .map_err(with_hint)?;

    let mut devices = DiscoveryList::new();
    loop {
        match events.recv().await {
            Ok(DeviceEvent::StateChanged {
                to: ConnectionState::Disconnected,
                ..
            }) => break,
            Ok(event) => {
                devices.apply(&event);
            }
            Err(RecvError::Lagged(n)) => warn!("Missed {} scan events", n),
            Err(RecvError::Closed) => break,
        }
    }
    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitals_core::{MockPeripheral, MockPermissions, MockTransport};

    #[tokio::test(start_paused = true)]
    async fn test_discover_collects_unique_devices() {
        let transport = Arc::new(MockTransport::new());
        transport.add_device(MockPeripheral::vitals_band("band-1"));
        transport.add_device(MockPeripheral::vitals_band("band-2"));
        let manager =
            ConnectivityManager::new(transport.clone(), Arc::new(MockPermissions::granted()));

        let devices = discover(&manager, Duration::from_secs(5)).await.unwrap();
        assert_eq!(devices.len(), 2);
        assert!(!transport.is_scanning());
    }

    #[tokio::test]
    async fn test_discover_reports_denied_permissions() {
        let manager = ConnectivityManager::new(
            Arc::new(MockTransport::new()),
            Arc::new(MockPermissions::denied()),
        );
        let err = discover(&manager, Duration::from_secs(5)).await.unwrap_err();
        assert!(err.to_string().contains("Tip:"));
    }
}
