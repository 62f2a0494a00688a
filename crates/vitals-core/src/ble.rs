//! [`BleTransport`] on top of btleplug.
//!
//! Peripherals are addressed by the identifier from
//! [`create_identifier`]: the MAC address where the platform exposes one,
//! otherwise the formatted peripheral ID (macOS).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{
    CentralEvent, CharPropFlags, Central, Characteristic, Manager as _, Peripheral as _,
    PeripheralProperties, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use futures::stream::{self, BoxStream, Stream};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use vitals_types::{CharacteristicInfo, CharacteristicProperties, DeviceDescriptor, ServiceInfo};

use crate::error::{ConnectionFailureReason, DeviceNotFoundReason, Error, Result};
use crate::traits::{BleTransport, DiscoveredServices, TransportEvent};
use crate::util::{create_identifier, format_peripheral_id};

type PeripheralCache = Arc<RwLock<HashMap<String, Peripheral>>>;

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters
        .into_iter()
        .next()
        .ok_or(Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter))
}

/// Transport backed by the system Bluetooth stack.
#[derive(Debug, Clone)]
pub struct BtleplugTransport {
    adapter: Adapter,
    peripherals: PeripheralCache,
}

impl BtleplugTransport {
    /// Use the first available adapter.
    pub async fn new() -> Result<Self> {
        Ok(Self::with_adapter(get_adapter().await?))
    }

    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            peripherals: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Resolve an identifier to a peripheral, searching the adapter on a miss.
    async fn peripheral(&self, id: &str) -> Result<Peripheral> {
        if let Some(peripheral) = self.peripherals.read().await.get(id) {
            return Ok(peripheral.clone());
        }

        let wanted = id.to_lowercase();
        for peripheral in self.adapter.peripherals().await? {
            let address = match peripheral.properties().await {
                Ok(Some(props)) => props.address.to_string(),
                _ => continue,
            };
            let identifier = create_identifier(&address, &peripheral.id());
            if identifier.to_lowercase() == wanted
                || format_peripheral_id(&peripheral.id()).to_lowercase() == wanted
            {
                self.peripherals
                    .write()
                    .await
                    .insert(id.to_string(), peripheral.clone());
                return Ok(peripheral);
            }
        }
        Err(Error::device_not_found(id))
    }

    async fn characteristic(&self, id: &str, uuid: Uuid) -> Result<(Peripheral, Characteristic)> {
        let peripheral = self.peripheral(id).await?;
        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| Error::characteristic_not_found(uuid))?;
        Ok((peripheral, characteristic))
    }
}

fn descriptor_from(peripheral: &Peripheral, props: &PeripheralProperties) -> DeviceDescriptor {
    let mut descriptor =
        DeviceDescriptor::new(create_identifier(&props.address.to_string(), &peripheral.id()))
            .with_services(props.services.iter().copied());
    if let Some(name) = &props.local_name {
        descriptor = descriptor.with_name(name.clone());
    }
    if let Some(rssi) = props.rssi {
        descriptor = descriptor.with_rssi(rssi);
    }
    descriptor
}

fn properties_from(flags: CharPropFlags) -> CharacteristicProperties {
    CharacteristicProperties {
        read: flags.contains(CharPropFlags::READ),
        write: flags.intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE),
        notify: flags.contains(CharPropFlags::NOTIFY),
        indicate: flags.contains(CharPropFlags::INDICATE),
    }
}

#[async_trait]
impl BleTransport for BtleplugTransport {
    async fn start_scan(&self, services: &[Uuid]) -> Result<BoxStream<'static, DeviceDescriptor>> {
        let events = self.adapter.events().await?;
        self.adapter
            .start_scan(ScanFilter {
                services: services.to_vec(),
            })
            .await?;
        info!("Adapter scan started");

        let adapter = self.adapter.clone();
        let cache = Arc::clone(&self.peripherals);
        let services = services.to_vec();

        let stream = events.filter_map(move |event| {
            let adapter = adapter.clone();
            let cache = Arc::clone(&cache);
            let services = services.clone();
            async move {
                let (CentralEvent::DeviceDiscovered(pid) | CentralEvent::DeviceUpdated(pid)) = event
                else {
                    return None;
                };
                let peripheral = adapter.peripheral(&pid).await.ok()?;
                let props = peripheral.properties().await.ok()??;
                // Not every backend honours the scan filter
                if !services.is_empty() && !props.services.iter().any(|s| services.contains(s)) {
                    return None;
                }
                let descriptor = descriptor_from(&peripheral, &props);
                cache
                    .write()
                    .await
                    .insert(descriptor.id.clone(), peripheral);
                Some(descriptor)
            }
        });
        Ok(stream.boxed())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn connect(&self, id: &str) -> Result<DeviceDescriptor> {
        let peripheral = self.peripheral(id).await?;
        peripheral.connect().await.map_err(|e| {
            Error::connection_failed(
                Some(id.to_string()),
                ConnectionFailureReason::BleError(e.to_string()),
            )
        })?;
        debug!("Link up to {}", id);

        let descriptor = match peripheral.properties().await? {
            Some(props) => {
                let mut descriptor = descriptor_from(&peripheral, &props);
                // Keep the identifier the caller used
                descriptor.id = id.to_string();
                descriptor
            }
            None => DeviceDescriptor::new(id),
        };
        Ok(descriptor)
    }

    async fn discover_services(&self, id: &str) -> Result<DiscoveredServices> {
        let peripheral = self.peripheral(id).await?;
        peripheral.discover_services().await?;

        let mut discovered = DiscoveredServices {
            services: Vec::new(),
            characteristics: Vec::new(),
        };
        for service in peripheral.services() {
            debug!("  Service: {}", service.uuid);
            discovered.services.push(ServiceInfo {
                uuid: service.uuid,
                primary: service.primary,
            });
            for characteristic in &service.characteristics {
                debug!("    Characteristic: {}", characteristic.uuid);
                discovered.characteristics.push(CharacteristicInfo::new(
                    characteristic.uuid,
                    service.uuid,
                    properties_from(characteristic.properties),
                ));
            }
        }
        Ok(discovered)
    }

    async fn read(&self, id: &str, characteristic: Uuid) -> Result<Vec<u8>> {
        let (peripheral, characteristic) = self.characteristic(id, characteristic).await?;
        Ok(peripheral.read(&characteristic).await?)
    }

    async fn subscribe(&self, id: &str, characteristic: Uuid) -> Result<()> {
        let (peripheral, characteristic) = self.characteristic(id, characteristic).await?;
        peripheral.subscribe(&characteristic).await?;
        Ok(())
    }

    async fn unsubscribe(&self, id: &str, characteristic: Uuid) -> Result<()> {
        let (peripheral, characteristic) = self.characteristic(id, characteristic).await?;
        peripheral.unsubscribe(&characteristic).await?;
        Ok(())
    }

    async fn events(&self, id: &str) -> Result<BoxStream<'static, TransportEvent>> {
        let peripheral = self.peripheral(id).await?;
        let peripheral_id = peripheral.id();

        let notifications = peripheral.notifications().await?.map(|n| {
            TransportEvent::Notification {
                characteristic: n.uuid,
                value: n.value,
            }
        });
        let link_loss = self.adapter.events().await?.filter_map(move |event| {
            let lost =
                matches!(&event, CentralEvent::DeviceDisconnected(pid) if *pid == peripheral_id);
            async move { lost.then_some(TransportEvent::Disconnected) }
        });

        Ok(link_events(notifications, link_loss))
    }

    async fn disconnect(&self, id: &str) -> Result<()> {
        let peripheral = self.peripheral(id).await?;
        peripheral.disconnect().await?;
        debug!("Link down to {}", id);
        Ok(())
    }
}

/// Merge notifications with adapter link-loss events.
///
/// The adapter stream never ends, so the end of the notification stream is
/// turned into an explicit `Disconnected`.
fn link_events<N, L>(notifications: N, link_loss: L) -> BoxStream<'static, TransportEvent>
where
    N: Stream<Item = TransportEvent> + Send + 'static,
    L: Stream<Item = TransportEvent> + Send + 'static,
{
    let notifications = notifications.chain(stream::once(async { TransportEvent::Disconnected }));
    stream::select(notifications, link_loss).boxed()
}
