//! Mock device bus for development and tests.
//!
//! Presents a fixed set of synthetic switches. `turn_on`/`turn_off` update
//! the remembered last command and emit a transition event, which is exactly
//! what a native bus binding does when hardware sends a command.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;

use super::BusError;
use super::Device;
use super::DeviceBus;
use super::DeviceEvent;
use super::DeviceEventSender;
use super::DeviceId;

pub struct MockBus {
    devices: RwLock<Vec<Device>>,
    events: DeviceEventSender,
}

impl MockBus {
    /// Create a mock bus with `num_devices` switches, all initially off.
    pub fn new(num_devices: u32, events: DeviceEventSender) -> Self {
        let devices = (1..=num_devices)
            .map(|i| Device {
                id: DeviceId(i),
                name: format!("Mock Device {i}"),
                on: false,
            })
            .collect();
        Self {
            devices: RwLock::new(devices),
            events,
        }
    }

    /// Send a "turn on" command to a device.
    pub async fn turn_on(&self, id: DeviceId) -> Result<(), BusError> {
        self.send_command(id, true).await
    }

    /// Send a "turn off" command to a device.
    pub async fn turn_off(&self, id: DeviceId) -> Result<(), BusError> {
        self.send_command(id, false).await
    }

    async fn send_command(&self, id: DeviceId, on: bool) -> Result<(), BusError> {
        {
            let mut devices = self.devices.write().await;
            let device = devices
                .iter_mut()
                .find(|d| d.id == id)
                .ok_or(BusError::UnknownDevice(id))?;
            device.on = on;
        }

        // The bus reports every sent command, on and off alike.
        if self.events.send(DeviceEvent { device_id: id }).await.is_err() {
            warn!("no receiver for device event, dropping");
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceBus for MockBus {
    async fn devices(&self) -> Result<Vec<Device>, BusError> {
        Ok(self.devices.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::device_event_channel;

    #[tokio::test]
    async fn test_lists_synthetic_devices() {
        let (tx, _rx) = device_event_channel();
        let bus = MockBus::new(3, tx);

        let devices = bus.devices().await.unwrap();
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[0].id, DeviceId(1));
        assert_eq!(devices[0].name, "Mock Device 1");
        assert!(!devices[0].on);
    }

    #[tokio::test]
    async fn test_turn_on_emits_event_and_updates_state() {
        let (tx, mut rx) = device_event_channel();
        let bus = MockBus::new(2, tx);

        bus.turn_on(DeviceId(2)).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.device_id, DeviceId(2));

        let device = bus.device(DeviceId(2)).await.unwrap().unwrap();
        assert!(device.on);
    }

    #[tokio::test]
    async fn test_turn_off_also_emits_event() {
        let (tx, mut rx) = device_event_channel();
        let bus = MockBus::new(1, tx);

        bus.turn_on(DeviceId(1)).await.unwrap();
        bus.turn_off(DeviceId(1)).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().device_id, DeviceId(1));
        assert_eq!(rx.recv().await.unwrap().device_id, DeviceId(1));
        assert!(!bus.device(DeviceId(1)).await.unwrap().unwrap().on);
    }

    #[tokio::test]
    async fn test_unknown_device_is_an_error() {
        let (tx, _rx) = device_event_channel();
        let bus = MockBus::new(1, tx);

        assert!(matches!(
            bus.turn_on(DeviceId(9)).await,
            Err(BusError::UnknownDevice(DeviceId(9)))
        ));
        assert!(bus.device(DeviceId(9)).await.unwrap().is_none());
    }
}
