//! Connectivity manager for a single wearable.
//!
//! [`ConnectivityManager`] owns the connection state machine, the scan
//! session, the notification listener and the reconnect loop. It is built
//! once and shared as `Arc<ConnectivityManager>`; observers use
//! [`ConnectivityManager::subscribe`].
//!
//! ```text
//! Disconnected -> Scanning -> Connecting -> Connected -> Disconnecting -> Disconnected
//!                     \______________________________________________/
//!                                   (any step -> Error)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vitals_types::payload::parse_battery;
use vitals_types::{ConnectedDevice, ConnectionState, DeviceDescriptor, uuids};

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::events::{DeviceEvent, DisconnectReason, EventDispatcher, EventReceiver};
use crate::readings::process_notification;
use crate::reconnect::ReconnectPolicy;
use crate::traits::{BleTransport, PermissionGate, TransportEvent};

/// Configuration for the connectivity manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// How long a scan runs before stopping on its own.
    pub scan_timeout: Duration,
    /// Reconnection after link loss.
    pub reconnect: ReconnectPolicy,
    /// Event channel capacity per subscriber.
    pub event_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            scan_timeout: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
            event_capacity: 256,
        }
    }
}

impl ManagerConfig {
    /// Set the default scan timeout.
    #[must_use]
    pub fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set the reconnect policy.
    #[must_use]
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.scan_timeout.is_zero() {
            return Err(Error::invalid_config("scan_timeout must be > 0"));
        }
        if self.event_capacity == 0 {
            return Err(Error::invalid_config("event_capacity must be > 0"));
        }
        if self.reconnect.max_attempts > 0 {
            self.reconnect.validate()?;
        }
        Ok(())
    }
}

/// An open link and the characteristics subscribed on it.
struct LinkSession {
    device_id: String,
    subscribed: Vec<Uuid>,
    cancel: CancellationToken,
}

/// Owns the connection to one wearable.
///
/// Every removal or replacement of the link happens while holding `op_lock`
/// and cancels the session token first, so a listener that observes an
/// uncancelled token under the lock still owns the link.
pub struct ConnectivityManager {
    transport: Arc<dyn BleTransport>,
    permissions: Arc<dyn PermissionGate>,
    config: ManagerConfig,
    events: EventDispatcher,
    state: RwLock<ConnectionState>,
    device: RwLock<Option<Arc<ConnectedDevice>>>,
    scan: Mutex<Option<CancellationToken>>,
    link: Mutex<Option<LinkSession>>,
    /// Device whose connect is between the transport connect and `Connected`.
    connecting: Mutex<Option<String>>,
    pending_reconnect: Mutex<Option<CancellationToken>>,
    reconnect_attempts: AtomicU32,
    op_lock: Mutex<()>,
}

impl std::fmt::Debug for ConnectivityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityManager")
            .field("config", &self.config)
            .field("subscribers", &self.events.receiver_count())
            .finish_non_exhaustive()
    }
}

impl ConnectivityManager {
    /// Create a manager with the default configuration.
    pub fn new(
        transport: Arc<dyn BleTransport>,
        permissions: Arc<dyn PermissionGate>,
    ) -> Arc<Self> {
        Self::with_config(transport, permissions, ManagerConfig::default())
    }

    /// Create a manager with custom configuration.
    pub fn with_config(
        transport: Arc<dyn BleTransport>,
        permissions: Arc<dyn PermissionGate>,
        config: ManagerConfig,
    ) -> Arc<Self> {
        let events = EventDispatcher::new(config.event_capacity.max(1));
        Arc::new(Self {
            transport,
            permissions,
            config,
            events,
            state: RwLock::new(ConnectionState::Disconnected),
            device: RwLock::new(None),
            scan: Mutex::new(None),
            link: Mutex::new(None),
            connecting: Mutex::new(None),
            pending_reconnect: Mutex::new(None),
            reconnect_attempts: AtomicU32::new(0),
            op_lock: Mutex::new(()),
        })
    }

    /// Subscribe to lifecycle and vitals events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// The event dispatcher.
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Snapshot of the connected device, if any.
    pub async fn connected_device(&self) -> Option<Arc<ConnectedDevice>> {
        self.device.read().await.clone()
    }

    /// Reconnect attempts made since the last successful connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Returns true if every required permission is granted.
    pub async fn check_permissions(&self) -> bool {
        self.permissions.check_all_permissions().await.granted
    }

    /// Ask for the required permissions. Returns true if all were granted.
    pub async fn request_permissions(&self) -> bool {
        self.permissions.request_all_permissions().await.granted
    }

    /// Scan for health wearables.
    ///
    /// Emits a [`DeviceEvent::DeviceDiscovered`] for every advertisement and
    /// stops after `timeout` (or the configured default). Calling this while
    /// a scan is running logs a warning and does nothing.
    pub async fn start_scanning(self: &Arc<Self>, timeout: Option<Duration>) -> Result<()> {
        let mut scan = self.scan.lock().await;
        if scan.is_some() {
            warn!("Scan already in progress");
            return Ok(());
        }

        let status = self.permissions.check_all_permissions().await;
        if !status.granted {
            info!("Bluetooth permissions missing, requesting");
            let status = self.permissions.request_all_permissions().await;
            if !status.granted {
                let err = Error::PermissionDenied {
                    missing: status.missing(),
                };
                self.emit_error(None, &err);
                return Err(err);
            }
        }

        self.recover_from_error().await;
        let current = self.state().await;
        if current != ConnectionState::Disconnected {
            return Err(Error::Busy {
                operation: "scan",
                state: current,
            });
        }

        self.set_state(ConnectionState::Scanning).await;
        let stream = match self.transport.start_scan(&uuids::HEALTH_SERVICES).await {
            Ok(stream) => stream,
            Err(e) => {
                self.set_state(ConnectionState::Error).await;
                self.emit_error(None, &e);
                return Err(e);
            }
        };

        let timeout = timeout.unwrap_or(self.config.scan_timeout);
        info!("Scanning for health devices ({:?})", timeout);

        let cancel = CancellationToken::new();
        *scan = Some(cancel.clone());
        drop(scan);

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.run_scan(stream, timeout, cancel).await;
        });
        Ok(())
    }

    async fn run_scan(
        self: Arc<Self>,
        mut stream: BoxStream<'static, DeviceDescriptor>,
        timeout: Duration,
        cancel: CancellationToken,
    ) {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let mut ended = false;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = &mut deadline => {
                    debug!("Scan timeout elapsed");
                    self.stop_scanning().await;
                    return;
                }
                next = stream.next(), if !ended => match next {
                    Some(device) => {
                        debug!("Discovered {} ({:?} dBm)", device.display_name(), device.rssi);
                        self.events.send(DeviceEvent::DeviceDiscovered { device });
                    }
                    None => {
                        debug!("Scan stream ended");
                        ended = true;
                    }
                },
            }
        }
    }

    /// Stop an active scan.
    ///
    /// Safe to call at any time, including after the scan timed out. The
    /// state only returns to `Disconnected` if it is still `Scanning`.
    pub async fn stop_scanning(&self) {
        self.end_scan().await;
        if self
            .transition_if(ConnectionState::Scanning, ConnectionState::Disconnected)
            .await
        {
            info!("Scan stopped");
        }
    }

    /// Cancel the scan session without touching the state.
    async fn end_scan(&self) {
        let session = self.scan.lock().await.take();
        if let Some(cancel) = session {
            cancel.cancel();
            if let Err(e) = self.transport.stop_scan().await {
                warn!("Failed to stop scan: {}", e);
            }
        }
    }

    /// Connect to a device, discover its services and subscribe to vitals.
    ///
    /// Stops an active scan and replaces any existing connection. On failure
    /// the manager moves to `Error` and the error is returned.
    #[tracing::instrument(skip(self))]
    pub async fn connect_to_device(self: &Arc<Self>, id: &str) -> Result<Arc<ConnectedDevice>> {
        let _op = self.op_lock.lock().await;
        if let Some(cancel) = self.pending_reconnect.lock().await.take() {
            debug!("Cancelling pending reconnect");
            cancel.cancel();
        }
        self.recover_from_error().await;

        match self.connect_inner(id).await {
            Ok(device) => Ok(device),
            Err(e) => {
                warn!("Failed to connect to {}: {}", id, e);
                self.set_state(ConnectionState::Error).await;
                self.emit_error(Some(id), &e);
                Err(e)
            }
        }
    }

    /// Connect while holding `op_lock`. Leaves the state for the caller on error.
    async fn connect_inner(self: &Arc<Self>, id: &str) -> Result<Arc<ConnectedDevice>> {
        self.end_scan().await;
        self.abandon_interrupted_connect().await;
        let previous = self.link.lock().await.take();
        if let Some(link) = previous {
            info!("Replacing connection to {}", link.device_id);
            self.teardown(link, DisconnectReason::Superseded).await;
        }

        *self.connecting.lock().await = Some(id.to_string());
        self.set_state(ConnectionState::Connecting).await;
        info!("Connecting to {}", id);
        let result = self.open_link(id).await;
        self.connecting.lock().await.take();
        result
    }

    async fn open_link(self: &Arc<Self>, id: &str) -> Result<Arc<ConnectedDevice>> {
        let descriptor = self.transport.connect(id).await?;

        match self.establish(id, descriptor).await {
            Ok(device) => Ok(device),
            Err(e) => {
                if let Err(cleanup) = self.transport.disconnect(id).await {
                    debug!("Cleanup after failed connect: {}", cleanup);
                }
                Err(e)
            }
        }
    }

    /// Close a link left behind by a connect whose future was dropped.
    ///
    /// Must be called with `op_lock` held; a live connect holds it too, so
    /// anything left in `connecting` here belongs to an abandoned attempt.
    async fn abandon_interrupted_connect(&self) -> bool {
        let Some(id) = self.connecting.lock().await.take() else {
            return false;
        };
        warn!("Cleaning up interrupted connect to {}", id);
        if let Err(e) = self.transport.disconnect(&id).await {
            debug!("Cleanup after interrupted connect: {}", e);
        }
        self.transition_if(ConnectionState::Connecting, ConnectionState::Disconnected)
            .await;
        true
    }

    async fn establish(
        self: &Arc<Self>,
        id: &str,
        descriptor: DeviceDescriptor,
    ) -> Result<Arc<ConnectedDevice>> {
        let discovered = self.transport.discover_services(id).await.map_err(|e| {
            Error::connection_failed(
                Some(id.to_string()),
                ConnectionFailureReason::ServiceDiscovery(e.to_string()),
            )
        })?;
        debug!(
            "Discovered {} services, {} characteristics",
            discovered.services.len(),
            discovered.characteristics.len()
        );

        let now = OffsetDateTime::now_utc();
        let mut snapshot = ConnectedDevice::new(
            descriptor,
            discovered.services,
            discovered.characteristics,
            now,
        );

        if snapshot
            .characteristic(uuids::BATTERY_LEVEL)
            .is_some_and(|c| c.properties.read)
        {
            match self.transport.read(id, uuids::BATTERY_LEVEL).await {
                Ok(value) => match parse_battery(&value) {
                    Ok(level) => snapshot = snapshot.with_battery(level, now),
                    Err(e) => warn!("Ignoring battery value from {}: {}", id, e),
                },
                Err(e) => debug!("Battery read failed: {}", e),
            }
        }

        // Open the event stream before subscribing so no notification is missed
        let events = self.transport.events(id).await?;

        let mut subscribed = Vec::new();
        for characteristic in snapshot.subscribable_vitals() {
            self.transport
                .subscribe(id, characteristic)
                .await
                .map_err(|e| {
                    Error::connection_failed(
                        Some(id.to_string()),
                        ConnectionFailureReason::Subscription(format!("{characteristic}: {e}")),
                    )
                })?;
            subscribed.push(characteristic);
        }
        if subscribed.is_empty() {
            warn!("{} exposes no vitals characteristics", id);
        }

        let snapshot = Arc::new(snapshot);
        *self.device.write().await = Some(Arc::clone(&snapshot));
        self.reconnect_attempts.store(0, Ordering::SeqCst);

        let cancel = CancellationToken::new();
        *self.link.lock().await = Some(LinkSession {
            device_id: id.to_string(),
            subscribed,
            cancel: cancel.clone(),
        });

        self.set_state(ConnectionState::Connected).await;
        self.events.send(DeviceEvent::DeviceConnected {
            device: Arc::clone(&snapshot),
        });
        info!(
            "Connected to {} ({} subscriptions)",
            snapshot.descriptor.display_name(),
            snapshot.subscribable_vitals().len()
        );

        let manager = Arc::clone(self);
        tokio::spawn(manager.run_link(id.to_string(), events, cancel));

        Ok(snapshot)
    }

    /// Disconnect from the current device.
    ///
    /// Does nothing if no device is connected, apart from clearing an
    /// `Error` state. Also cancels a pending reconnect.
    #[tracing::instrument(skip(self))]
    pub async fn disconnect_from_device(&self) -> Result<()> {
        let _op = self.op_lock.lock().await;
        if let Some(cancel) = self.pending_reconnect.lock().await.take() {
            info!("Reconnect cancelled");
            cancel.cancel();
        }

        let link = self.link.lock().await.take();
        let Some(link) = link else {
            if !self.abandon_interrupted_connect().await {
                debug!("No device connected");
            }
            self.recover_from_error().await;
            return Ok(());
        };

        self.set_state(ConnectionState::Disconnecting).await;
        let device_id = link.device_id.clone();
        self.teardown(link, DisconnectReason::UserRequested).await;
        self.set_state(ConnectionState::Disconnected).await;
        info!("Disconnected from {}", device_id);
        Ok(())
    }

    /// Unsubscribe, close the link, clear the snapshot and announce it.
    async fn teardown(&self, link: LinkSession, reason: DisconnectReason) {
        link.cancel.cancel();

        for characteristic in &link.subscribed {
            if let Err(e) = self.transport.unsubscribe(&link.device_id, *characteristic).await {
                warn!("Failed to unsubscribe {}: {}", characteristic, e);
            }
        }
        if let Err(e) = self.transport.disconnect(&link.device_id).await {
            warn!("Failed to disconnect {}: {}", link.device_id, e);
        }

        *self.device.write().await = None;
        self.events.send(DeviceEvent::DeviceDisconnected {
            device_id: link.device_id,
            reason,
        });
    }

    async fn run_link(
        self: Arc<Self>,
        device_id: String,
        mut events: BoxStream<'static, TransportEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                event = events.next() => match event {
                    Some(TransportEvent::Notification { characteristic, value }) => {
                        self.handle_notification(characteristic, &value).await;
                    }
                    Some(TransportEvent::Disconnected) | None => break,
                },
            }
        }
        self.handle_link_loss(device_id, cancel).await;
    }

    async fn handle_notification(&self, characteristic: Uuid, value: &[u8]) {
        let at = OffsetDateTime::now_utc();
        let reading = {
            let mut device = self.device.write().await;
            let Some(current) = device.as_ref() else {
                return;
            };
            let outcome = process_notification(current, characteristic, value, at);
            *device = Some(Arc::new(outcome.snapshot));
            outcome.reading
        };

        if let Some(reading) = reading
            && self.state().await == ConnectionState::Connected
        {
            self.events.send(DeviceEvent::VitalsReceived { reading });
        }
    }

    /// React to a dropped link: announce it, then run the reconnect loop.
    fn handle_link_loss(
        self: Arc<Self>,
        device_id: String,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            {
                let _op = self.op_lock.lock().await;
                if cancel.is_cancelled() {
                    return;
                }
                self.link.lock().await.take();
                *self.device.write().await = None;
                warn!("Link to {} lost", device_id);
                self.set_state(ConnectionState::Disconnected).await;
                self.events.send(DeviceEvent::DeviceDisconnected {
                    device_id: device_id.clone(),
                    reason: DisconnectReason::LinkLost,
                });
                *self.pending_reconnect.lock().await = Some(cancel.clone());
            }
            self.reconnect(&device_id, &cancel).await;
        })
    }

    async fn reconnect(self: &Arc<Self>, device_id: &str, cancel: &CancellationToken) {
        let policy = self.config.reconnect.clone();

        for (attempt, delay) in policy.schedule() {
            self.reconnect_attempts.store(attempt, Ordering::SeqCst);
            info!(
                "Reconnecting to {} in {:?} (attempt {}/{})",
                device_id, delay, attempt, policy.max_attempts
            );
            self.events.send(DeviceEvent::ReconnectScheduled {
                device_id: device_id.to_string(),
                attempt,
                delay,
            });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let _op = self.op_lock.lock().await;
            if cancel.is_cancelled() {
                return;
            }
            match self.connect_inner(device_id).await {
                Ok(_) => {
                    self.pending_reconnect.lock().await.take();
                    info!("Reconnected to {} after {} attempt(s)", device_id, attempt);
                    self.events.send(DeviceEvent::ReconnectSucceeded {
                        device_id: device_id.to_string(),
                        attempts: attempt,
                    });
                    return;
                }
                Err(e) => {
                    warn!("Reconnect attempt {} failed: {}", attempt, e);
                    self.set_state(ConnectionState::Disconnected).await;
                }
            }
        }

        let _op = self.op_lock.lock().await;
        if cancel.is_cancelled() {
            return;
        }
        self.pending_reconnect.lock().await.take();
        warn!(
            "Giving up on {} after {} attempt(s)",
            device_id, policy.max_attempts
        );
        self.events.send(DeviceEvent::ReconnectFailed {
            device_id: device_id.to_string(),
            attempts: policy.max_attempts,
        });
    }

    /// Leave `Error` for `Disconnected` before starting a new operation.
    async fn recover_from_error(&self) {
        if self
            .transition_if(ConnectionState::Error, ConnectionState::Disconnected)
            .await
        {
            debug!("Recovered from error state");
        }
    }

    async fn set_state(&self, next: ConnectionState) {
        let from = {
            let mut state = self.state.write().await;
            let from = *state;
            if from == next {
                return;
            }
            *state = next;
            from
        };
        if !from.can_transition_to(next) {
            warn!("Unexpected state transition {} -> {}", from, next);
        }
        debug!("State {} -> {}", from, next);
        self.events.send(DeviceEvent::StateChanged { from, to: next });
    }

    /// Move to `next` only if the state is still `expected`.
    async fn transition_if(&self, expected: ConnectionState, next: ConnectionState) -> bool {
        {
            let mut state = self.state.write().await;
            if *state != expected {
                return false;
            }
            *state = next;
        }
        debug!("State {} -> {}", expected, next);
        self.events.send(DeviceEvent::StateChanged {
            from: expected,
            to: next,
        });
        true
    }

    fn emit_error(&self, device_id: Option<&str>, error: &Error) {
        self.events.send(DeviceEvent::Error {
            device_id: device_id.map(str::to_string),
            error: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockPeripheral, MockPermissions, MockTransport};

    fn manager(transport: MockTransport) -> Arc<ConnectivityManager> {
        ConnectivityManager::new(Arc::new(transport), Arc::new(MockPermissions::granted()))
    }

    #[test]
    fn test_config_validation() {
        assert!(ManagerConfig::default().validate().is_ok());
        assert!(
            ManagerConfig::default()
                .scan_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            ManagerConfig::default()
                .reconnect(ReconnectPolicy::disabled().base_delay(Duration::ZERO))
                .validate()
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_initial_state() {
        let manager = manager(MockTransport::new());
        assert_eq!(manager.state().await, ConnectionState::Disconnected);
        assert!(manager.connected_device().await.is_none());
        assert_eq!(manager.reconnect_attempts(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_when_idle_is_noop() {
        let manager = manager(MockTransport::new());
        let mut rx = manager.subscribe();
        manager.disconnect_from_device().await.unwrap();
        assert_eq!(manager.state().await, ConnectionState::Disconnected);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connect_unknown_device_enters_error() {
        let manager = manager(MockTransport::new());
        let err = manager.connect_to_device("missing").await.unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound(_)));
        assert_eq!(manager.state().await, ConnectionState::Error);

        // The next operation cleans up the error state
        manager.disconnect_from_device().await.unwrap();
        assert_eq!(manager.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_scan_rejected_while_connected() {
        let transport = MockTransport::new();
        transport.add_device(MockPeripheral::vitals_band("band-1"));
        let manager = manager(transport);
        manager.connect_to_device("band-1").await.unwrap();

        let err = manager.start_scanning(None).await.unwrap_err();
        assert!(matches!(err, Error::Busy { .. }));
        assert_eq!(manager.state().await, ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_connect_is_cleaned_up() {
        let transport = Arc::new(MockTransport::new());
        transport.add_device(MockPeripheral::vitals_band("band-1"));
        transport.set_discovery_delay(Some(Duration::from_secs(60)));
        let manager =
            ConnectivityManager::new(transport.clone(), Arc::new(MockPermissions::granted()));

        let attempt = manager.connect_to_device("band-1");
        assert!(tokio::time::timeout(Duration::from_secs(5), attempt).await.is_err());
        assert_eq!(manager.state().await, ConnectionState::Connecting);
        assert!(transport.is_connected("band-1"));

        manager.disconnect_from_device().await.unwrap();
        assert_eq!(manager.state().await, ConnectionState::Disconnected);
        assert!(!transport.is_connected("band-1"));

        // A later connect starts from a clean slate
        transport.set_discovery_delay(None);
        manager.connect_to_device("band-1").await.unwrap();
        assert_eq!(manager.state().await, ConnectionState::Connected);
    }
}
