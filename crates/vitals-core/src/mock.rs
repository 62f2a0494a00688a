//! Scripted transport and permission gate for testing.
//!
//! [`MockTransport`] implements [`BleTransport`] without hardware. Tests
//! register peripherals, then push notifications or drop the link to drive
//! the manager.
//!
//! # Features
//!
//! - **Failure injection**: fail the next N connects, every connect, or service discovery
//! - **Advertising**: peripherals are advertised once per scan; more can be pushed with
//!   [`MockTransport::advertise`]
//! - **Inspection**: subscriptions, scan state and call counts are observable

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use futures::stream::BoxStream;
use uuid::Uuid;

use vitals_types::{
    CharacteristicInfo, CharacteristicProperties, DeviceDescriptor, ServiceInfo, uuids,
};

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::permissions::REQUIRED_PERMISSIONS;
use crate::traits::{
    BleTransport, DiscoveredServices, PermissionGate, PermissionStatus, TransportEvent,
};

/// A peripheral known to the mock transport.
#[derive(Debug, Clone)]
pub struct MockPeripheral {
    pub descriptor: DeviceDescriptor,
    pub services: DiscoveredServices,
    pub battery: Option<u8>,
}

impl MockPeripheral {
    /// A peripheral with no services.
    pub fn new(descriptor: DeviceDescriptor) -> Self {
        Self {
            descriptor,
            services: DiscoveredServices {
                services: Vec::new(),
                characteristics: Vec::new(),
            },
            battery: None,
        }
    }

    /// A band exposing every vitals characteristic with notify, plus a
    /// readable battery level at 80%.
    pub fn vitals_band(id: &str) -> Self {
        let notify = CharacteristicProperties {
            notify: true,
            ..Default::default()
        };
        let battery = CharacteristicProperties {
            read: true,
            notify: true,
            ..Default::default()
        };
        let pairs = [
            (uuids::HEART_RATE_SERVICE, uuids::HEART_RATE_MEASUREMENT, notify),
            (uuids::BLOOD_PRESSURE_SERVICE, uuids::BLOOD_PRESSURE_MEASUREMENT, notify),
            (uuids::HEALTH_THERMOMETER_SERVICE, uuids::TEMPERATURE_MEASUREMENT, notify),
            (uuids::PULSE_OXIMETER_SERVICE, uuids::OXYGEN_SATURATION_MEASUREMENT, notify),
            (uuids::BATTERY_SERVICE, uuids::BATTERY_LEVEL, battery),
        ];

        Self {
            descriptor: DeviceDescriptor::new(id)
                .with_name(format!("Vitals Band {id}"))
                .with_rssi(-55)
                .with_services([uuids::HEART_RATE_SERVICE, uuids::BATTERY_SERVICE]),
            services: DiscoveredServices {
                services: pairs
                    .iter()
                    .map(|(service, _, _)| ServiceInfo {
                        uuid: *service,
                        primary: true,
                    })
                    .collect(),
                characteristics: pairs
                    .iter()
                    .map(|(service, characteristic, props)| {
                        CharacteristicInfo::new(*characteristic, *service, *props)
                    })
                    .collect(),
            },
            battery: Some(80),
        }
    }

    /// Set the reported battery level.
    #[must_use]
    pub fn with_battery(mut self, level: u8) -> Self {
        self.battery = Some(level);
        self
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A scripted BLE transport.
#[derive(Default)]
pub struct MockTransport {
    peripherals: Mutex<HashMap<String, MockPeripheral>>,
    connected: Mutex<HashSet<String>>,
    links: Mutex<HashMap<String, mpsc::UnboundedSender<TransportEvent>>>,
    subscriptions: Mutex<HashMap<String, Vec<Uuid>>>,
    scan: Mutex<Option<mpsc::UnboundedSender<DeviceDescriptor>>>,
    /// Number of connects to fail before succeeding.
    remaining_connect_failures: AtomicU32,
    unreachable: AtomicBool,
    fail_discovery: AtomicBool,
    discovery_delay: Mutex<Option<Duration>>,
    connect_count: AtomicU32,
    stop_scan_count: AtomicU32,
    unsubscribe_count: AtomicU32,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("peripherals", &lock(&self.peripherals).len())
            .field("connected", &*lock(&self.connected))
            .finish()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peripheral.
    pub fn add_device(&self, peripheral: MockPeripheral) {
        lock(&self.peripherals).insert(peripheral.descriptor.id.clone(), peripheral);
    }

    /// Push an advertisement into the running scan. Returns false if not scanning.
    pub fn advertise(&self, descriptor: DeviceDescriptor) -> bool {
        lock(&self.scan)
            .as_ref()
            .is_some_and(|tx| tx.unbounded_send(descriptor).is_ok())
    }

    /// Deliver a notification on an open link. Returns false if there is none.
    pub fn notify(&self, id: &str, characteristic: Uuid, value: &[u8]) -> bool {
        lock(&self.links).get(id).is_some_and(|tx| {
            tx.unbounded_send(TransportEvent::Notification {
                characteristic,
                value: value.to_vec(),
            })
            .is_ok()
        })
    }

    /// Simulate the peripheral dropping the link.
    pub fn drop_link(&self, id: &str) -> bool {
        lock(&self.connected).remove(id);
        lock(&self.subscriptions).remove(id);
        match lock(&self.links).remove(id) {
            Some(tx) => tx.unbounded_send(TransportEvent::Disconnected).is_ok(),
            None => false,
        }
    }

    /// Fail the next `count` connects with an out-of-range error.
    pub fn fail_next_connects(&self, count: u32) {
        self.remaining_connect_failures.store(count, Ordering::SeqCst);
    }

    /// Fail every connect until reset.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Fail service discovery until reset.
    pub fn set_fail_discovery(&self, fail: bool) {
        self.fail_discovery.store(fail, Ordering::SeqCst);
    }

    /// Stall service discovery for `delay`, leaving the link half open.
    pub fn set_discovery_delay(&self, delay: Option<Duration>) {
        *lock(&self.discovery_delay) = delay;
    }

    pub fn is_scanning(&self) -> bool {
        lock(&self.scan).is_some()
    }

    pub fn is_connected(&self, id: &str) -> bool {
        lock(&self.connected).contains(id)
    }

    /// Characteristics currently subscribed on `id`.
    pub fn subscriptions(&self, id: &str) -> Vec<Uuid> {
        lock(&self.subscriptions).get(id).cloned().unwrap_or_default()
    }

    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::SeqCst)
    }

    pub fn stop_scan_count(&self) -> u32 {
        self.stop_scan_count.load(Ordering::SeqCst)
    }

    pub fn unsubscribe_count(&self) -> u32 {
        self.unsubscribe_count.load(Ordering::SeqCst)
    }

    fn check_connected(&self, id: &str) -> Result<()> {
        if self.is_connected(id) {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    fn take_connect_failure(&self) -> bool {
        if self.unreachable.load(Ordering::SeqCst) {
            return true;
        }
        self.remaining_connect_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl BleTransport for MockTransport {
    async fn start_scan(&self, services: &[Uuid]) -> Result<BoxStream<'static, DeviceDescriptor>> {
        let (tx, rx) = mpsc::unbounded();
        for peripheral in lock(&self.peripherals).values() {
            let advertised = &peripheral.descriptor.service_uuids;
            if services.is_empty() || advertised.iter().any(|uuid| services.contains(uuid)) {
                let _ = tx.unbounded_send(peripheral.descriptor.clone());
            }
        }
        *lock(&self.scan) = Some(tx);
        Ok(rx.boxed())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.stop_scan_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.scan).take();
        Ok(())
    }

    async fn connect(&self, id: &str) -> Result<DeviceDescriptor> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        let descriptor = lock(&self.peripherals)
            .get(id)
            .map(|p| p.descriptor.clone())
            .ok_or_else(|| Error::device_not_found(id))?;
        if self.take_connect_failure() {
            return Err(Error::connection_failed(
                Some(id.to_string()),
                ConnectionFailureReason::OutOfRange,
            ));
        }
        lock(&self.connected).insert(id.to_string());
        Ok(descriptor)
    }

    async fn discover_services(&self, id: &str) -> Result<DiscoveredServices> {
        self.check_connected(id)?;
        let delay = *lock(&self.discovery_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_discovery.load(Ordering::SeqCst) {
            return Err(Error::InvalidData("GATT discovery failed".into()));
        }
        lock(&self.peripherals)
            .get(id)
            .map(|p| p.services.clone())
            .ok_or_else(|| Error::device_not_found(id))
    }

    async fn read(&self, id: &str, characteristic: Uuid) -> Result<Vec<u8>> {
        self.check_connected(id)?;
        let battery = lock(&self.peripherals).get(id).and_then(|p| p.battery);
        match (characteristic, battery) {
            (uuids::BATTERY_LEVEL, Some(level)) => Ok(vec![level]),
            _ => Err(Error::characteristic_not_found(characteristic)),
        }
    }

    async fn subscribe(&self, id: &str, characteristic: Uuid) -> Result<()> {
        self.check_connected(id)?;
        lock(&self.subscriptions)
            .entry(id.to_string())
            .or_default()
            .push(characteristic);
        Ok(())
    }

    async fn unsubscribe(&self, id: &str, characteristic: Uuid) -> Result<()> {
        self.unsubscribe_count.fetch_add(1, Ordering::SeqCst);
        if let Some(subs) = lock(&self.subscriptions).get_mut(id) {
            subs.retain(|uuid| *uuid != characteristic);
        }
        Ok(())
    }

    async fn events(&self, id: &str) -> Result<BoxStream<'static, TransportEvent>> {
        self.check_connected(id)?;
        let (tx, rx) = mpsc::unbounded();
        lock(&self.links).insert(id.to_string(), tx);
        Ok(rx.boxed())
    }

    async fn disconnect(&self, id: &str) -> Result<()> {
        lock(&self.connected).remove(id);
        lock(&self.links).remove(id);
        lock(&self.subscriptions).remove(id);
        Ok(())
    }
}

/// A permission gate with scripted answers.
#[derive(Debug, Default)]
pub struct MockPermissions {
    granted: AtomicBool,
    grant_on_request: AtomicBool,
    request_count: AtomicU32,
}

impl MockPermissions {
    /// Everything already granted.
    pub fn granted() -> Self {
        Self {
            granted: AtomicBool::new(true),
            ..Default::default()
        }
    }

    /// Denied, and requests are refused.
    pub fn denied() -> Self {
        Self::default()
    }

    /// Denied until requested.
    pub fn grant_on_request() -> Self {
        Self {
            grant_on_request: AtomicBool::new(true),
            ..Default::default()
        }
    }

    pub fn request_count(&self) -> u32 {
        self.request_count.load(Ordering::SeqCst)
    }

    fn status(&self) -> PermissionStatus {
        let granted = self.granted.load(Ordering::SeqCst);
        let permissions: BTreeMap<String, bool> = REQUIRED_PERMISSIONS
            .iter()
            .map(|name| (name.to_string(), granted))
            .collect();
        PermissionStatus::from_permissions(permissions)
    }
}

#[async_trait]
impl PermissionGate for MockPermissions {
    async fn check_all_permissions(&self) -> PermissionStatus {
        self.status()
    }

    async fn request_all_permissions(&self) -> PermissionStatus {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        if self.grant_on_request.load(Ordering::SeqCst) {
            self.granted.store(true, Ordering::SeqCst);
        }
        self.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scan_filters_by_service() {
        let transport = MockTransport::new();
        transport.add_device(MockPeripheral::vitals_band("band-1"));
        transport.add_device(MockPeripheral::new(DeviceDescriptor::new("speaker")));

        let stream = transport.start_scan(&uuids::HEALTH_SERVICES).await.unwrap();
        assert!(transport.is_scanning());
        transport.stop_scan().await.unwrap();

        let seen: Vec<_> = stream.collect().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id, "band-1");
    }

    #[tokio::test]
    async fn test_transient_connect_failures() {
        let transport = MockTransport::new();
        transport.add_device(MockPeripheral::vitals_band("band-1"));
        transport.fail_next_connects(2);

        assert!(transport.connect("band-1").await.is_err());
        assert!(transport.connect("band-1").await.is_err());
        assert!(transport.connect("band-1").await.is_ok());
        assert_eq!(transport.connect_count(), 3);
    }

    #[tokio::test]
    async fn test_drop_link_ends_event_stream() {
        let transport = MockTransport::new();
        transport.add_device(MockPeripheral::vitals_band("band-1"));
        transport.connect("band-1").await.unwrap();
        let mut events = transport.events("band-1").await.unwrap();

        assert!(transport.notify("band-1", uuids::BATTERY_LEVEL, &[50]));
        assert!(transport.drop_link("band-1"));

        assert!(matches!(
            events.next().await,
            Some(TransportEvent::Notification { .. })
        ));
        assert_eq!(events.next().await, Some(TransportEvent::Disconnected));
        assert_eq!(events.next().await, None);
        assert!(!transport.is_connected("band-1"));
    }

    #[tokio::test]
    async fn test_permissions_grant_on_request() {
        let gate = MockPermissions::grant_on_request();
        assert!(!gate.check_all_permissions().await.granted);
        assert!(gate.request_all_permissions().await.granted);
        assert!(gate.check_all_permissions().await.granted);
        assert_eq!(gate.request_count(), 1);

        let gate = MockPermissions::denied();
        let status = gate.request_all_permissions().await;
        assert!(!status.granted);
        assert_eq!(status.missing().len(), REQUIRED_PERMISSIONS.len());
    }
}
