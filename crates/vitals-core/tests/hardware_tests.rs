//! Hardware integration tests for vitals-core
//!
//! These tests require a Bluetooth adapter and a wearable in range, and
//! should be run with:
//! ```
//! cargo test --package vitals-core --test hardware_tests -- --ignored --nocapture
//! ```
//!
//! Configure the wearable via an environment variable:
//! - `VITALS_DEVICE`: device identifier (MAC address, or peripheral ID on macOS)
//!
//! Example:
//! ```
//! VITALS_DEVICE="AA:BB:CC:DD:EE:FF" cargo test --package vitals-core --test hardware_tests -- --ignored --nocapture
//! ```

use std::env;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use vitals_core::{
    BtleplugTransport, ConnectionState, ConnectivityManager, DeviceEvent, DiscoveryList,
    HealthConfig, HealthDataContext, platform_gate,
};

/// Default timeout for BLE operations
const BLE_TIMEOUT: Duration = Duration::from_secs(30);

/// How long to wait for the first notification
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(60);

fn get_device() -> Option<String> {
    env::var("VITALS_DEVICE").ok().filter(|s| !s.is_empty())
}

async fn manager() -> Arc<ConnectivityManager> {
    let transport = match timeout(BLE_TIMEOUT, BtleplugTransport::new()).await {
        Ok(Ok(transport)) => transport,
        Ok(Err(e)) => panic!("No Bluetooth adapter: {}", e),
        Err(_) => panic!("Adapter lookup timed out"),
    };
    ConnectivityManager::new(Arc::new(transport), platform_gate())
}

// =============================================================================
// Scan Tests
// =============================================================================

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_scan_discovers_devices() {
    let manager = manager().await;
    let mut rx = manager.subscribe();

    manager
        .start_scanning(Some(Duration::from_secs(10)))
        .await
        .expect("scan failed to start");

    let mut list = DiscoveryList::new();
    let result = timeout(BLE_TIMEOUT, async {
        while let Ok(event) = rx.recv().await {
            if matches!(
                event,
                DeviceEvent::StateChanged {
                    to: ConnectionState::Disconnected,
                    ..
                }
            ) {
                break;
            }
            list.apply(&event);
        }
    })
    .await;
    assert!(result.is_ok(), "Scan did not stop on its own");

    println!("Scan discovered {} devices:", list.len());
    for device in list.by_signal() {
        println!("  - {} ({:?} dBm)", device.display_name(), device.rssi);
    }
    assert_eq!(manager.state().await, ConnectionState::Disconnected);
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_stop_scan_early() {
    let manager = manager().await;

    manager.start_scanning(None).await.expect("scan failed to start");
    tokio::time::sleep(Duration::from_secs(2)).await;
    manager.stop_scanning().await;
    manager.stop_scanning().await;

    assert_eq!(manager.state().await, ConnectionState::Disconnected);
}

// =============================================================================
// Connection Tests
// =============================================================================

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_connect_and_disconnect() {
    let Some(device_id) = get_device() else {
        println!("Skipping: set VITALS_DEVICE");
        return;
    };
    let manager = manager().await;

    let device = match timeout(BLE_TIMEOUT, manager.connect_to_device(&device_id)).await {
        Ok(Ok(device)) => device,
        Ok(Err(e)) => panic!("Connect failed: {}", e),
        Err(_) => panic!("Connect timed out"),
    };

    println!("Connected to {}", device.descriptor.display_name());
    println!("  Services: {}", device.services.len());
    println!("  Vitals characteristics: {}", device.subscribable_vitals().len());
    if let Some(level) = device.battery_level {
        println!("  Battery: {}%", level);
    }
    assert_eq!(manager.state().await, ConnectionState::Connected);

    manager.disconnect_from_device().await.expect("disconnect failed");
    assert_eq!(manager.state().await, ConnectionState::Disconnected);
    assert!(manager.connected_device().await.is_none());
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_receive_vitals() {
    let Some(device_id) = get_device() else {
        println!("Skipping: set VITALS_DEVICE");
        return;
    };
    let manager = manager().await;
    let ctx = HealthDataContext::attach(Arc::clone(&manager), HealthConfig::default());
    let mut watch = ctx.watch();

    timeout(BLE_TIMEOUT, ctx.connect_to_device(&device_id))
        .await
        .expect("connect timed out")
        .expect("connect failed");

    let snapshot = timeout(NOTIFY_TIMEOUT, watch.wait_for(|s| s.current_vitals.is_some()))
        .await
        .expect("no vitals within timeout")
        .expect("context closed")
        .clone();
    println!("First reading: {:?}", snapshot.current_vitals);
    println!("Alerts: {:?}", snapshot.alerts);

    ctx.disconnect_from_device().await.expect("disconnect failed");
}
