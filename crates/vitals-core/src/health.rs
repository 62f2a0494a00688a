//! Health data context: derived vitals state for presentation layers.
//!
//! [`HealthDataContext`] subscribes to a [`ConnectivityManager`] once and
//! folds its events into a [`HealthSnapshot`] published over a
//! `tokio::sync::watch` channel. It mirrors connection state but never
//! drives it; lifecycle actions are delegated to the manager.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vitals_store::{ConnectionRecord, StorageFacade};
use vitals_types::{ConnectedDevice, ConnectionState, VitalsReading};

use crate::error::Result;
use crate::events::{DeviceEvent, EventReceiver};
use crate::manager::ConnectivityManager;
use crate::thresholds::{AlertKind, VitalThresholds};

/// Options for the health data context.
#[derive(Clone)]
pub struct HealthConfig {
    /// Readings older than this, relative to the newest one, are dropped.
    pub history_window: Duration,
    /// How long the alert flag stays set after the last violating reading.
    pub alert_duration: Duration,
    pub thresholds: VitalThresholds,
    /// Storage used for offline queueing and connection history.
    pub storage: Option<Arc<StorageFacade>>,
    /// Append every reading to the pending sync queue.
    pub queue_offline: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            history_window: Duration::from_secs(24 * 60 * 60),
            alert_duration: Duration::from_secs(10),
            thresholds: VitalThresholds::default(),
            storage: None,
            queue_offline: false,
        }
    }
}

impl std::fmt::Debug for HealthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthConfig")
            .field("history_window", &self.history_window)
            .field("alert_duration", &self.alert_duration)
            .field("thresholds", &self.thresholds)
            .field("storage", &self.storage.is_some())
            .field("queue_offline", &self.queue_offline)
            .finish()
    }
}

impl HealthConfig {
    /// Queue readings in `storage` for later upload.
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<StorageFacade>, queue_offline: bool) -> Self {
        self.storage = Some(storage);
        self.queue_offline = queue_offline;
        self
    }
}

/// Derived health state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub connection_state: ConnectionState,
    pub device_id: Option<String>,
    /// The most recent (possibly partial) reading.
    pub current_vitals: Option<VitalsReading>,
    /// Readings inside the history window, oldest first.
    pub history: Vec<VitalsReading>,
    pub alert_active: bool,
    /// Violations of the reading that (re)armed the alert.
    pub alerts: Vec<AlertKind>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_updated: Option<OffsetDateTime>,
}

/// Folds manager events into a [`HealthSnapshot`].
pub struct HealthDataContext {
    manager: Arc<ConnectivityManager>,
    config: HealthConfig,
    state: Arc<watch::Sender<HealthSnapshot>>,
    alert_generation: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for HealthDataContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthDataContext")
            .field("config", &self.config)
            .field("snapshot", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl HealthDataContext {
    /// Subscribe to `manager` and start folding its events.
    ///
    /// The subscription lives until the context is dropped or detached.
    pub fn attach(manager: Arc<ConnectivityManager>, config: HealthConfig) -> Arc<Self> {
        let events = manager.subscribe();
        let (state, _) = watch::channel(HealthSnapshot::default());
        let ctx = Arc::new(Self {
            manager,
            config,
            state: Arc::new(state),
            alert_generation: Arc::new(AtomicU64::new(0)),
            cancel: CancellationToken::new(),
        });

        tokio::spawn(Self::run(Arc::downgrade(&ctx), events, ctx.cancel.clone()));
        ctx
    }

    async fn run(ctx: Weak<Self>, mut events: EventReceiver, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(event) => {
                    let Some(ctx) = ctx.upgrade() else { break };
                    ctx.handle_event(&event);
                    ctx.persist(&event).await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Health context lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Health context detached");
    }

    /// Apply one manager event.
    pub fn handle_event(&self, event: &DeviceEvent) {
        match event {
            DeviceEvent::StateChanged { to, .. } => {
                let to = *to;
                self.state.send_modify(|s| s.connection_state = to);
            }
            DeviceEvent::DeviceConnected { device } => self.on_connected(device),
            DeviceEvent::DeviceDisconnected { device_id, .. } => {
                debug!("{} disconnected, clearing alert", device_id);
                self.alert_generation.fetch_add(1, Ordering::SeqCst);
                self.state.send_modify(|s| {
                    s.device_id = None;
                    s.alert_active = false;
                    s.alerts.clear();
                });
            }
            DeviceEvent::VitalsReceived { reading } => self.record_reading(reading.clone()),
            _ => {}
        }
    }

    fn on_connected(&self, device: &ConnectedDevice) {
        let now = OffsetDateTime::now_utc();
        self.state.send_modify(|s| {
            s.device_id = Some(device.id().to_string());
            s.connection_state = ConnectionState::Connected;
            s.last_updated = Some(now);
        });
    }

    /// Store a reading, prune history and evaluate alerts.
    pub fn record_reading(&self, reading: VitalsReading) {
        let alerts = self.config.thresholds.evaluate(&reading);
        let window = time::Duration::try_from(self.config.history_window)
            .unwrap_or(time::Duration::MAX);
        let now = OffsetDateTime::now_utc();

        self.state.send_modify(|s| {
            s.current_vitals = Some(reading.clone());
            s.history.push(reading.clone());
            prune_history(&mut s.history, window);
            s.last_updated = Some(now);
            if !alerts.is_empty() {
                s.alert_active = true;
                s.alerts = alerts.clone();
            }
        });

        if !alerts.is_empty() {
            for alert in &alerts {
                warn!("{}", alert.description());
            }
            self.arm_alert();
        }
    }

    /// Write connection history and queued readings to storage.
    ///
    /// SQLite calls run on the blocking pool; awaiting each one keeps the
    /// queue in arrival order.
    async fn persist(&self, event: &DeviceEvent) {
        let Some(storage) = self.config.storage.clone() else {
            return;
        };

        match event {
            DeviceEvent::DeviceConnected { device } => {
                let record = ConnectionRecord {
                    device_id: device.id().to_string(),
                    device_name: device.descriptor.name.clone(),
                    connected_at: device.connected_at,
                };
                let recorded =
                    tokio::task::spawn_blocking(move || storage.record_connection(record)).await;
                match recorded {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("Failed to record connection: {}", e),
                    Err(e) => warn!("Connection history task failed: {}", e),
                }
            }
            DeviceEvent::VitalsReceived { reading } if self.config.queue_offline => {
                let reading = reading.clone();
                let queued = tokio::task::spawn_blocking(move || {
                    storage.queue_pending_sync(std::slice::from_ref(&reading))
                })
                .await;
                match queued {
                    Ok(Ok(pending)) => debug!("{} readings pending sync", pending),
                    Ok(Err(e)) => warn!("Failed to queue reading: {}", e),
                    Err(e) => warn!("Queue task failed: {}", e),
                }
            }
            _ => {}
        }
    }

    /// Clear the alert `alert_duration` after now unless re-armed meanwhile.
    fn arm_alert(&self) {
        let generation = self.alert_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let current = Arc::clone(&self.alert_generation);
        let state = Arc::clone(&self.state);
        let duration = self.config.alert_duration;

        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if current.load(Ordering::SeqCst) == generation {
                state.send_modify(|s| {
                    s.alert_active = false;
                    s.alerts.clear();
                });
                debug!("Alert cleared");
            }
        });
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> HealthSnapshot {
        self.state.borrow().clone()
    }

    /// Receiver notified on every change.
    pub fn watch(&self) -> watch::Receiver<HealthSnapshot> {
        self.state.subscribe()
    }

    pub fn manager(&self) -> &Arc<ConnectivityManager> {
        &self.manager
    }

    /// Connect through the manager.
    pub async fn connect_to_device(&self, id: &str) -> Result<Arc<ConnectedDevice>> {
        self.manager.connect_to_device(id).await
    }

    /// Disconnect through the manager.
    pub async fn disconnect_from_device(&self) -> Result<()> {
        self.manager.disconnect_from_device().await
    }

    /// Re-stamp the snapshot. The device pushes data, so nothing is fetched.
    pub fn refresh_data(&self) {
        let now = OffsetDateTime::now_utc();
        self.state.send_modify(|s| s.last_updated = Some(now));
        info!("Health data refreshed");
    }

    /// Stop following the manager.
    pub fn detach(&self) {
        self.cancel.cancel();
    }
}

impl Drop for HealthDataContext {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Drop readings older than `window` before the newest one.
fn prune_history(history: &mut Vec<VitalsReading>, window: time::Duration) {
    let Some(newest) = history.iter().map(|r| r.captured_at).max() else {
        return;
    };
    let cutoff = newest.checked_sub(window);
    if let Some(cutoff) = cutoff {
        history.retain(|r| r.captured_at >= cutoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockPermissions, MockTransport};
    use crate::events::DisconnectReason;

    fn context() -> Arc<HealthDataContext> {
        let manager = ConnectivityManager::new(
            Arc::new(MockTransport::new()),
            Arc::new(MockPermissions::granted()),
        );
        HealthDataContext::attach(manager, HealthConfig::default())
    }

    fn at(hours: i64) -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH + time::Duration::hours(hours)
    }

    #[test]
    fn test_prune_keeps_window() {
        let mut history: Vec<_> = [0, 10, 20, 25, 30]
            .iter()
            .map(|h| VitalsReading::builder("d").heart_rate(70).captured_at(at(*h)).build())
            .collect();
        prune_history(&mut history, time::Duration::hours(24));
        let hours: Vec<_> = history.iter().map(|r| r.captured_at).collect();
        assert_eq!(hours, vec![at(10), at(20), at(25), at(30)]);
    }

    #[tokio::test]
    async fn test_reading_replaces_current_vitals() {
        let ctx = context();
        ctx.record_reading(VitalsReading::builder("d").heart_rate(72).build());
        ctx.record_reading(VitalsReading::builder("d").temperature(36.6).build());

        let snap = ctx.snapshot();
        let current = snap.current_vitals.unwrap();
        assert_eq!(current.heart_rate, None);
        assert_eq!(current.temperature, Some(36.6));
        assert_eq!(snap.history.len(), 2);
        assert!(!snap.alert_active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_clears_after_duration() {
        let ctx = context();
        ctx.record_reading(VitalsReading::builder("d").heart_rate(130).build());
        assert!(ctx.snapshot().alert_active);
        assert_eq!(ctx.snapshot().alerts, vec![AlertKind::HeartRateHigh(130)]);

        // A normal reading does not clear the flag early
        ctx.record_reading(VitalsReading::builder("d").heart_rate(70).build());
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(ctx.snapshot().alert_active);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let snap = ctx.snapshot();
        assert!(!snap.alert_active);
        assert!(snap.alerts.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_clears_alert_and_device() {
        let ctx = context();
        ctx.handle_event(&DeviceEvent::StateChanged {
            from: ConnectionState::Connecting,
            to: ConnectionState::Connected,
        });
        ctx.record_reading(VitalsReading::builder("d").oxygen_saturation(90).build());
        ctx.handle_event(&DeviceEvent::DeviceDisconnected {
            device_id: "d".into(),
            reason: DisconnectReason::LinkLost,
        });

        let snap = ctx.snapshot();
        assert!(!snap.alert_active);
        assert!(snap.device_id.is_none());
        assert_eq!(snap.connection_state, ConnectionState::Connected);
        // History survives a disconnect
        assert_eq!(snap.history.len(), 1);
    }

    #[tokio::test]
    async fn test_offline_queue() {
        let storage = Arc::new(StorageFacade::open_in_memory().unwrap());
        let manager = ConnectivityManager::new(
            Arc::new(MockTransport::new()),
            Arc::new(MockPermissions::granted()),
        );
        let ctx = HealthDataContext::attach(
            manager,
            HealthConfig::default().with_storage(Arc::clone(&storage), true),
        );

        for reading in [
            VitalsReading::builder("d").heart_rate(72).build(),
            VitalsReading::builder("d").battery(50).build(),
        ] {
            let event = DeviceEvent::VitalsReceived { reading };
            ctx.handle_event(&event);
            ctx.persist(&event).await;
        }

        let queued = storage.pending_sync().unwrap();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].heart_rate, Some(72));
        assert_eq!(queued[1].battery, Some(50));
        assert_eq!(ctx.snapshot().history.len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_restamps() {
        let ctx = context();
        assert!(ctx.snapshot().last_updated.is_none());
        ctx.refresh_data();
        assert!(ctx.snapshot().last_updated.is_some());
    }
}
