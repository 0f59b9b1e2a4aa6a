//! Device bus abstraction.
//!
//! The alarm pipeline consumes two things from the bus: the device list
//! (queried on demand) and raw transition events (pushed over a channel
//! whenever a command is sent to a device). `DeviceBus` is the seam where a
//! native binding would plug in; the shipped implementation is [`MockBus`].

use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

mod mock;

pub use mock::MockBus;

/// Identifier of a device on the home-automation bus.
///
/// Stable across repeated queries for the lifetime of the bus connection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A device as reported by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,

    /// Whether the last command sent to the device was "turn on".
    pub on: bool,
}

/// A raw state-transition event: some command was just sent to a device.
///
/// The bus does not say what the command was; the receiver queries the
/// device to find out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceEvent {
    pub device_id: DeviceId,
}

pub type DeviceEventSender = mpsc::Sender<DeviceEvent>;
pub type DeviceEventReceiver = mpsc::Receiver<DeviceEvent>;

/// Capacity for the bus→engine event channel.
const DEVICE_EVENT_CHANNEL_SIZE: usize = 256;

/// Create the channel a bus implementation emits transition events into.
pub fn device_event_channel() -> (DeviceEventSender, DeviceEventReceiver) {
    mpsc::channel(DEVICE_EVENT_CHANNEL_SIZE)
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("device bus query failed: {0}")]
    Query(String),

    #[error("unknown device {0}")]
    UnknownDevice(DeviceId),
}

/// Trait for device bus operations.
///
/// Implementations emit a [`DeviceEvent`] on the sender they were
/// constructed with whenever a command is sent to one of their devices.
#[async_trait]
pub trait DeviceBus: Send + Sync {
    /// List every device known to the bus.
    async fn devices(&self) -> Result<Vec<Device>, BusError>;

    /// Look up a single device by id. `Ok(None)` when the bus does not know
    /// the id.
    async fn device(&self, id: DeviceId) -> Result<Option<Device>, BusError> {
        Ok(self.devices().await?.into_iter().find(|d| d.id == id))
    }
}
