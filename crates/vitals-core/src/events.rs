//! Event bus for connection lifecycle and vitals notifications.
//!
//! Every subscriber gets its own receiver and sees events in emission order.
//! A slow subscriber that falls more than the channel capacity behind
//! receives `RecvError::Lagged` and skips ahead; it never blocks the manager.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use vitals_types::{ConnectedDevice, ConnectionState, DeviceDescriptor, VitalsReading};

/// Events emitted by the connectivity manager.
///
/// All events are serializable for logging, persistence, and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum DeviceEvent {
    /// The connection state changed.
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    /// An advertisement from a health device was seen. Repeats per packet.
    DeviceDiscovered { device: DeviceDescriptor },
    /// Connected, discovered and subscribed.
    DeviceConnected { device: Arc<ConnectedDevice> },
    /// The connected device went away.
    DeviceDisconnected {
        device_id: String,
        reason: DisconnectReason,
    },
    /// A notification was decoded into a (partial) reading.
    VitalsReceived { reading: VitalsReading },
    /// An operation failed.
    Error {
        device_id: Option<String>,
        error: String,
    },
    /// A reconnect attempt will start after `delay`.
    ReconnectScheduled {
        device_id: String,
        attempt: u32,
        delay: Duration,
    },
    /// A reconnect attempt restored the connection.
    ReconnectSucceeded { device_id: String, attempts: u32 },
    /// All reconnect attempts failed; the manager is `Disconnected`.
    ReconnectFailed { device_id: String, attempts: u32 },
}

impl DeviceEvent {
    /// The device this event refers to, if any.
    pub fn device_id(&self) -> Option<&str> {
        match self {
            Self::StateChanged { .. } => None,
            Self::DeviceDiscovered { device } => Some(&device.id),
            Self::DeviceConnected { device } => Some(device.id()),
            Self::VitalsReceived { reading } => Some(&reading.device_id),
            Self::Error { device_id, .. } => device_id.as_deref(),
            Self::DeviceDisconnected { device_id, .. }
            | Self::ReconnectScheduled { device_id, .. }
            | Self::ReconnectSucceeded { device_id, .. }
            | Self::ReconnectFailed { device_id, .. } => Some(device_id),
        }
    }
}

/// Reason for disconnection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum DisconnectReason {
    /// Normal disconnection requested by the user.
    UserRequested,
    /// A new connect replaced this connection.
    Superseded,
    /// The transport reported the link dropped.
    LinkLost,
}

/// Sender for device events.
pub type EventSender = broadcast::Sender<DeviceEvent>;

/// Receiver for device events.
pub type EventReceiver = broadcast::Receiver<DeviceEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: DeviceEvent) {
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(256)
    }
}
