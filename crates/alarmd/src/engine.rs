//! The event loop tying the device bus to the alarm policy.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;

use crate::alarm::AlarmPolicy;
use crate::bus::DeviceBus;
use crate::bus::DeviceEvent;
use crate::bus::DeviceEventReceiver;

/// alarmd engine
///
/// Receives raw transition events from the device bus, resolves the device,
/// and runs each transition through the alarm policy. No error in here is
/// fatal: a failed lookup drops that transition and the loop keeps serving
/// subsequent events.
pub struct Engine {
    bus: Arc<dyn DeviceBus>,
    policy: Arc<Mutex<AlarmPolicy>>,
    events: DeviceEventReceiver,
}

impl Engine {
    pub fn new(
        bus: Arc<dyn DeviceBus>,
        policy: Arc<Mutex<AlarmPolicy>>,
        events: DeviceEventReceiver,
    ) -> Self {
        Self {
            bus,
            policy,
            events,
        }
    }

    /// Run the engine's main event loop until the bus closes its channel.
    pub async fn run(mut self) {
        info!("alarm engine starting");
        while let Some(event) = self.events.recv().await {
            self.handle_event(event).await;
        }
        info!("alarm engine shutting down");
    }

    async fn handle_event(&self, event: DeviceEvent) {
        let id = event.device_id;

        // Cheap membership check before the bus query; most devices on the
        // bus are not alarm triggers.
        if !self.policy.lock().await.is_trigger_source(id) {
            trace!("device {id} is not a trigger source, ignoring event");
            return;
        }

        let device = match self.bus.device(id).await {
            Ok(Some(device)) => device,
            Ok(None) => {
                error!("could not find alarm device with id {id}");
                return;
            }
            Err(e) => {
                error!("could not query alarm device with id {id}: {e}");
                return;
            }
        };

        if device.on {
            info!("alarm device with id {id} turned on");
        } else {
            info!("alarm device with id {id} turned off");
        }

        // The policy lock is held across the whole evaluation, suppression
        // check included, so two evaluations of the same source never
        // interleave.
        let decision = self
            .policy
            .lock()
            .await
            .evaluate_transition(&device, Utc::now())
            .await;
        debug!("evaluated transition for device {id}: {decision:?}");
    }
}
