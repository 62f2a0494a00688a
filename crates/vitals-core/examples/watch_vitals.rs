//! Example: Streaming vitals through the health context
//!
//! Connects to the device named by `VITALS_DEVICE` and prints the derived
//! health snapshot every time it changes.
//!
//! Run with: `VITALS_DEVICE=AA:BB:CC:DD:EE:FF cargo run --example watch_vitals`

use std::sync::Arc;

use vitals_core::{
    BtleplugTransport, ConnectivityManager, HealthConfig, HealthDataContext, platform_gate,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let device = std::env::var("VITALS_DEVICE")
        .map_err(|_| "set VITALS_DEVICE to the wearable's identifier")?;

    let transport = Arc::new(BtleplugTransport::new().await?);
    let manager = ConnectivityManager::new(transport, platform_gate());
    let context = HealthDataContext::attach(manager, HealthConfig::default());
    let mut snapshots = context.watch();

    context.connect_to_device(&device).await?;
    println!("Connected. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if let Some(vitals) = &snapshot.current_vitals {
                    println!(
                        "[{}] {:?} alert={}",
                        snapshot.connection_state, vitals, snapshot.alert_active
                    );
                }
            }
        }
    }

    context.disconnect_from_device().await?;
    Ok(())
}
