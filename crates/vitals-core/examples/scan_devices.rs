//! Example: Scanning for health wearables
//!
//! Scans for ten seconds and lists every peripheral advertising one of the
//! standard health services, strongest signal first.
//!
//! Run with: `cargo run --example scan_devices`

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use vitals_core::{
    BtleplugTransport, ConnectionState, ConnectivityManager, DeviceEvent, DiscoveryList,
    platform_gate,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let transport = std::sync::Arc::new(BtleplugTransport::new().await?);
    let manager = ConnectivityManager::new(transport, platform_gate());
    let mut events = manager.subscribe();

    println!("Scanning for health devices...");
    manager.start_scanning(Some(Duration::from_secs(10))).await?;

    let mut found = DiscoveryList::new();
    loop {
        match events.recv().await {
            Ok(event @ DeviceEvent::DeviceDiscovered { .. }) => {
                found.apply(&event);
            }
            Ok(DeviceEvent::StateChanged {
                to: ConnectionState::Disconnected,
                ..
            }) => break,
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break,
        }
    }

    if found.is_empty() {
        println!("No devices found. Is the wearable powered on and in range?");
        return Ok(());
    }

    println!("Found {} device(s):", found.len());
    for device in found.by_signal() {
        let rssi = device
            .rssi
            .map(|r| format!("{} dBm", r))
            .unwrap_or_else(|| "N/A".to_string());
        println!("  {} [{}] {}", device.display_name(), device.id, rssi);
    }
    Ok(())
}
