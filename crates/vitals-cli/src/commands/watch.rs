//! Watch command implementation.
//!
//! Holds one connection open and prints every decoded reading. Link loss is
//! handled by the connectivity manager's automatic reconnect; this command
//! only reports it and exits once the manager gives up.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use vitals_core::{
    BtleplugTransport, ConnectivityManager, DeviceEvent, EventReceiver, HealthConfig,
    HealthDataContext, RetryConfig, VitalThresholds, platform_gate, with_retry,
};
use vitals_store::StorageFacade;
use vitals_types::{ConnectedDevice, VitalsReading};

use crate::cli::OutputFormat;
use crate::config::update_last_device;
use crate::format::{FormatOptions, format_reading_json, format_reading_line};
use crate::style;
use crate::util::{require_device, with_hint};

/// Arguments for the watch command.
pub struct WatchArgs<'a> {
    pub device: Option<String>,
    pub timeout: Duration,
    pub format: OutputFormat,
    pub count: u32,
    pub queue_offline: bool,
    pub output: Option<&'a PathBuf>,
    pub quiet: bool,
    pub opts: &'a FormatOptions,
    pub storage: Arc<StorageFacade>,
}

pub async fn cmd_watch(args: WatchArgs<'_>) -> Result<()> {
    let WatchArgs {
        device,
        timeout,
        format,
        count,
        queue_offline,
        output,
        quiet,
        opts,
        storage,
    } = args;

    let identifier = require_device(device)?;
    let transport = BtleplugTransport::new()
        .await
        .map_err(with_hint)
        .context("Failed to open Bluetooth adapter")?;
    let manager = ConnectivityManager::new(Arc::new(transport), platform_gate());
    let config = HealthConfig::default().with_storage(storage, queue_offline);
    let thresholds = config.thresholds.clone();
    let _context = HealthDataContext::attach(Arc::clone(&manager), config);

    let events = manager.subscribe();
    let spinner = (!quiet).then(|| style::connecting_spinner(&identifier));
    let connected = connect(&manager, &identifier, timeout).await;
    if let Some(sp) = spinner {
        sp.finish_and_clear();
    }
    let device = connected?;

    // Convenience only; a read-only config dir must not stop the watch
    if let Err(e) = update_last_device(device.id(), device.descriptor.name.as_deref()) {
        warn!("Failed to remember device: {}", e);
    }

    if !quiet {
        eprintln!(
            "Watching: {} ({})",
            device.descriptor.display_name(),
            device.id()
        );
        if let Some(level) = device.battery_level {
            eprintln!("Battery: {}", style::format_battery_colored(level, opts.no_color));
        }
        eprintln!("Press Ctrl+C to stop");
        eprintln!("{}", "-".repeat(50));
    }

    let mut out: Box<dyn Write> = match output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(io::stdout()),
    };

    let result = stream_readings(events, count, |reading| {
        let line = match format {
            OutputFormat::Json => format_reading_json(reading, opts)?,
            OutputFormat::Text => format_reading_line(reading, &thresholds, opts),
        };
        out.write_all(line.as_bytes())?;
        out.flush()?;
        Ok(())
    })
    .await;

    manager.disconnect_from_device().await.ok();
    let taken = result?;
    if count > 0 && !quiet {
        eprintln!("Completed {} readings.", taken);
    }
    Ok(())
}

/// Connect with retries, bounded by `timeout` overall.
pub async fn connect(
    manager: &Arc<ConnectivityManager>,
    identifier: &str,
    timeout: Duration,
) -> Result<Arc<ConnectedDevice>> {
    let retry = RetryConfig::for_connect();
    let attempt = with_retry(&retry, "connect", || {
        manager.connect_to_device(identifier)
    });
    match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok(device)) => {
            info!("Connected to {}", identifier);
            Ok(device)
        }
        Ok(Err(e)) => Err(with_hint(e).context(format!("Failed to connect to {}", identifier))),
        Err(_) => {
            // Close the half-open link the dropped attempt left behind
            if let Err(e) = manager.disconnect_from_device().await {
                warn!("Cleanup after connect timeout failed: {}", e);
            }
            bail!(
                "Timed out connecting to {} after {}s",
                identifier,
                timeout.as_secs()
            )
        }
    }
}

/// Feed readings to `sink` until `count` is reached (0 = unlimited),
/// Ctrl+C, or the manager gives up reconnecting. Returns the number handled.
pub async fn stream_readings<F>(mut events: EventReceiver, count: u32, mut sink: F) -> Result<u32>
where
    F: FnMut(&VitalsReading) -> Result<()>,
{
    let mut taken = 0;
    loop {
        if count > 0 && taken >= count {
            return Ok(taken);
        }

        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nShutting down...");
                return Ok(taken);
            }
            event = events.recv() => event,
        };

        match event {
            Ok(DeviceEvent::VitalsReceived { reading }) => {
                sink(&reading)?;
                taken += 1;
            }
            Ok(DeviceEvent::ReconnectScheduled { attempt, delay, .. }) => {
                eprintln!(
                    "Connection lost. Reconnecting in {}s (attempt {})...",
                    delay.as_secs(),
                    attempt
                );
            }
            Ok(DeviceEvent::ReconnectSucceeded { device_id, .. }) => {
                eprintln!("Reconnected to {}", device_id);
            }
            Ok(DeviceEvent::ReconnectFailed { device_id, attempts }) => {
                bail!("Lost {} and could not reconnect after {} attempts", device_id, attempts);
            }
            Ok(_) => {}
            Err(RecvError::Lagged(n)) => warn!("Output fell behind; skipped {} events", n),
            Err(RecvError::Closed) => return Ok(taken),
        }
    }
}
