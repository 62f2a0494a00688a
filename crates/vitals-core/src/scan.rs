//! Subscriber-side view of scan results.
//!
//! The manager emits a `DeviceDiscovered` event for every advertisement
//! packet, so the same peripheral shows up many times per scan.
//! [`DiscoveryList`] folds those events into one entry per device id.

use std::collections::HashMap;

use vitals_types::{ConnectionState, DeviceDescriptor};

use crate::events::DeviceEvent;
use crate::util::identifier_matches;

/// Discovered devices, deduplicated by id.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryList {
    devices: HashMap<String, DeviceDescriptor>,
    order: Vec<String>,
}

impl DiscoveryList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a descriptor, replacing any earlier one with the same id.
    ///
    /// Returns true if the id was not seen before.
    pub fn insert(&mut self, device: DeviceDescriptor) -> bool {
        let id = device.id.clone();
        let is_new = self.devices.insert(id.clone(), device).is_none();
        if is_new {
            self.order.push(id);
        }
        is_new
    }

    /// Fold a manager event into the list.
    ///
    /// A transition into `Scanning` starts a new session and clears the list.
    /// Returns the descriptor if the event introduced a new device.
    pub fn apply(&mut self, event: &DeviceEvent) -> Option<&DeviceDescriptor> {
        match event {
            DeviceEvent::StateChanged {
                to: ConnectionState::Scanning,
                ..
            } => {
                self.clear();
                None
            }
            DeviceEvent::DeviceDiscovered { device } => {
                if self.insert(device.clone()) {
                    self.devices.get(&device.id)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Devices in first-seen order.
    pub fn devices(&self) -> Vec<&DeviceDescriptor> {
        self.order
            .iter()
            .filter_map(|id| self.devices.get(id))
            .collect()
    }

    /// Devices sorted by signal strength, strongest first.
    pub fn by_signal(&self) -> Vec<&DeviceDescriptor> {
        let mut devices = self.devices();
        devices.sort_by_key(|d| std::cmp::Reverse(d.rssi.unwrap_or(i16::MIN)));
        devices
    }

    /// First device whose id or name matches `query`.
    pub fn find(&self, query: &str) -> Option<&DeviceDescriptor> {
        self.devices()
            .into_iter()
            .find(|d| identifier_matches(query, d))
    }

    pub fn get(&self, id: &str) -> Option<&DeviceDescriptor> {
        self.devices.get(id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn clear(&mut self) {
        self.devices.clear();
        self.order.clear();
    }
}
