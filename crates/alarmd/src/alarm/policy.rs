use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use tracing::debug;
use tracing::info;

use super::Alert;
use super::DuplicateFilter;
use super::SuppressionCheck;
use crate::bus::Device;
use crate::bus::DeviceId;
use crate::config::AlarmConfig;
use crate::config::TriggerSourceConfig;
use crate::notify::Notifier;

/// A monitored device whose "on" transition is eligible to raise an alarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerSource {
    pub device_id: DeviceId,

    /// Timestamp of the most recent accepted "on" event; `None` until the
    /// first trigger. Updated only by the duplicate filter.
    pub last_on: Option<DateTime<Utc>>,
}

impl TriggerSource {
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            last_on: None,
        }
    }
}

/// Outcome of evaluating one raw device-state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The device is not a registered trigger source
    NotTrigger,
    /// The transition was not a "turn on"
    DeviceOff,
    /// The alarm subsystem is globally disabled
    Disabled,
    /// A duplicate inside the filter window
    Duplicate,
    /// Vetoed by the suppression command
    Suppressed,
    /// Alert dispatched to every channel
    Fired,
}

/// The orchestrating state machine of the alarm pipeline.
///
/// Holds the enable flag, the registered trigger sources and the gates
/// (duplicate filter, suppression check). Each incoming transition runs
/// through the gates in a fixed order; a pass fans the alert out to every
/// notification channel.
pub struct AlarmPolicy {
    enabled: bool,
    sources: BTreeMap<DeviceId, TriggerSource>,
    filter: DuplicateFilter,
    suppression: SuppressionCheck,
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl AlarmPolicy {
    pub fn new(config: &AlarmConfig, notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        let sources = config
            .device_ids()
            .into_iter()
            .map(|id| (id, TriggerSource::new(id)))
            .collect();
        Self {
            enabled: config.enabled,
            sources,
            filter: DuplicateFilter::new(config.filter_seconds),
            suppression: SuppressionCheck::new(config.suppress_command.clone()),
            notifiers,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        info!("setting alarm enabled to: {enabled}");
        self.enabled = enabled;
    }

    /// Register a device as a trigger source.
    ///
    /// Idempotent: returns false and leaves the existing entry (and its
    /// window state) untouched when the id is already registered.
    pub fn add_trigger_source(&mut self, device_id: DeviceId) -> bool {
        if self.sources.contains_key(&device_id) {
            debug!("device {device_id} is already a trigger source");
            return false;
        }
        info!("adding alarm trigger for device {device_id}");
        self.sources.insert(device_id, TriggerSource::new(device_id));
        true
    }

    /// Remove a trigger source; returns whether an entry was removed.
    pub fn remove_trigger_source(&mut self, device_id: DeviceId) -> bool {
        info!("removing alarm trigger for device {device_id}");
        self.sources.remove(&device_id).is_some()
    }

    pub fn is_trigger_source(&self, device_id: DeviceId) -> bool {
        self.sources.contains_key(&device_id)
    }

    pub fn trigger_source(&self, device_id: DeviceId) -> Option<&TriggerSource> {
        self.sources.get(&device_id)
    }

    pub fn trigger_sources(&self) -> impl Iterator<Item = &TriggerSource> {
        self.sources.values()
    }

    pub fn suppress_command(&self) -> Option<&str> {
        self.suppression.command()
    }

    pub fn set_suppress_command(&mut self, command: Option<String>) {
        self.suppression.set_command(command);
    }

    /// Snapshot of the policy state, for configuration persistence.
    pub fn to_config(&self) -> AlarmConfig {
        AlarmConfig {
            enabled: self.enabled,
            trigger_sources: self
                .sources
                .keys()
                .map(|&device_id| TriggerSourceConfig { device_id })
                .collect(),
            suppress_command: self.suppression.command().map(str::to_string),
            filter_seconds: self.filter.window_seconds(),
        }
    }

    /// Evaluate one raw device-state transition.
    ///
    /// Gates run in a fixed order: trigger membership, device state, global
    /// enablement, duplicate filter, suppression check. Enablement is
    /// checked before the duplicate filter so the filter window is never
    /// touched while the subsystem is off.
    pub async fn evaluate_transition(&mut self, device: &Device, now: DateTime<Utc>) -> Decision {
        if !self.is_trigger_source(device.id) {
            return Decision::NotTrigger;
        }
        if !device.on {
            debug!("alarm device {} turned off, ignoring", device.id);
            return Decision::DeviceOff;
        }
        if !self.enabled {
            info!("alarm disabled, ignoring");
            return Decision::Disabled;
        }

        let Some(source) = self.sources.get_mut(&device.id) else {
            return Decision::NotTrigger;
        };
        if self.filter.is_duplicate(source, now) {
            info!("duplicate alarm event for device {}, ignoring", device.id);
            return Decision::Duplicate;
        }

        if self.suppression.is_suppressed().await {
            return Decision::Suppressed;
        }

        self.dispatch(Alert::for_device(device, now));
        Decision::Fired
    }

    /// Fan an alert out to every channel.
    ///
    /// Each delivery runs in its own task; no channel waits for another and
    /// no failure rolls anything back.
    fn dispatch(&self, alert: Alert) {
        info!("sending alarm");
        for notifier in &self.notifiers {
            let notifier = Arc::clone(notifier);
            let alert = alert.clone();
            tokio::spawn(async move {
                notifier.send_notification(&alert).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use super::*;
    use crate::notify::testing::RecordingNotifier;

    fn device(id: u32, on: bool) -> Device {
        Device {
            id: DeviceId(id),
            name: format!("Mock Device {id}"),
            on,
        }
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).unwrap()
    }

    fn armed_config(device_ids: &[u32]) -> AlarmConfig {
        AlarmConfig {
            enabled: true,
            trigger_sources: device_ids
                .iter()
                .map(|&id| TriggerSourceConfig {
                    device_id: DeviceId(id),
                })
                .collect(),
            suppress_command: None,
            filter_seconds: 5,
        }
    }

    fn policy_with_recorder(
        config: &AlarmConfig,
    ) -> (AlarmPolicy, mpsc::UnboundedReceiver<Alert>) {
        let (recorder, rx) = RecordingNotifier::pair(true);
        (AlarmPolicy::new(config, vec![Arc::new(recorder)]), rx)
    }

    async fn expect_alert(rx: &mut mpsc::UnboundedReceiver<Alert>) -> Alert {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for alert")
            .expect("alert channel closed")
    }

    #[tokio::test]
    async fn test_unregistered_device_is_not_a_trigger() {
        let (mut policy, mut rx) = policy_with_recorder(&armed_config(&[3]));

        let decision = policy.evaluate_transition(&device(9, true), at(0)).await;
        assert_eq!(decision, Decision::NotTrigger);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_device_off_is_ignored() {
        let (mut policy, mut rx) = policy_with_recorder(&armed_config(&[3]));

        let decision = policy.evaluate_transition(&device(3, false), at(0)).await;
        assert_eq!(decision, Decision::DeviceOff);
        assert!(rx.try_recv().is_err());
        // An off transition must not touch the filter window.
        assert_eq!(policy.trigger_source(DeviceId(3)).unwrap().last_on, None);
    }

    #[tokio::test]
    async fn test_fires_then_filters_then_fires_again() {
        let (mut policy, mut rx) = policy_with_recorder(&armed_config(&[3]));

        // window=5s: t=0 fires, t=2 duplicate, t=6 fires again
        assert_eq!(
            policy.evaluate_transition(&device(3, true), at(0)).await,
            Decision::Fired
        );
        expect_alert(&mut rx).await;

        assert_eq!(
            policy.evaluate_transition(&device(3, true), at(2)).await,
            Decision::Duplicate
        );
        assert!(rx.try_recv().is_err());

        assert_eq!(
            policy.evaluate_transition(&device(3, true), at(6)).await,
            Decision::Fired
        );
        expect_alert(&mut rx).await;
    }

    #[tokio::test]
    async fn test_windows_are_per_trigger_source() {
        let (mut policy, mut rx) = policy_with_recorder(&armed_config(&[1, 2]));

        assert_eq!(
            policy.evaluate_transition(&device(1, true), at(0)).await,
            Decision::Fired
        );
        // Device 1's window must not mask device 2.
        assert_eq!(
            policy.evaluate_transition(&device(2, true), at(1)).await,
            Decision::Fired
        );
        expect_alert(&mut rx).await;
        expect_alert(&mut rx).await;
    }

    #[tokio::test]
    async fn test_disabled_policy_ignores_everything() {
        let (mut policy, mut rx) = policy_with_recorder(&armed_config(&[3]));
        policy.set_enabled(false);

        assert_eq!(
            policy.evaluate_transition(&device(3, true), at(0)).await,
            Decision::Disabled
        );
        assert_eq!(
            policy.evaluate_transition(&device(3, true), at(10)).await,
            Decision::Disabled
        );
        assert!(rx.try_recv().is_err());
        // Disabled evaluations must not touch the filter window either.
        assert_eq!(policy.trigger_source(DeviceId(3)).unwrap().last_on, None);
    }

    #[tokio::test]
    async fn test_suppression_command_success_silences_the_alarm() {
        let mut config = armed_config(&[3]);
        config.suppress_command = Some("true".to_string());
        let (mut policy, mut rx) = policy_with_recorder(&config);

        assert_eq!(
            policy.evaluate_transition(&device(3, true), at(0)).await,
            Decision::Suppressed
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_suppression_command_failure_lets_the_alarm_fire() {
        let mut config = armed_config(&[3]);
        config.suppress_command = Some("false".to_string());
        let (mut policy, mut rx) = policy_with_recorder(&config);

        assert_eq!(
            policy.evaluate_transition(&device(3, true), at(0)).await,
            Decision::Fired
        );
        expect_alert(&mut rx).await;
    }

    #[tokio::test]
    async fn test_unrunnable_suppression_command_lets_the_alarm_fire() {
        let mut config = armed_config(&[3]);
        config.suppress_command = Some("/nonexistent/alarmd-veto".to_string());
        let (mut policy, mut rx) = policy_with_recorder(&config);

        assert_eq!(
            policy.evaluate_transition(&device(3, true), at(0)).await,
            Decision::Fired
        );
        expect_alert(&mut rx).await;
    }

    #[tokio::test]
    async fn test_invalid_channel_skips_while_valid_channel_delivers() {
        let (broken, mut broken_rx) = RecordingNotifier::pair(false);
        let (working, mut working_rx) = RecordingNotifier::pair(true);
        let mut policy = AlarmPolicy::new(
            &armed_config(&[3]),
            vec![Arc::new(broken), Arc::new(working)],
        );

        assert_eq!(
            policy.evaluate_transition(&device(3, true), at(0)).await,
            Decision::Fired
        );
        let alert = expect_alert(&mut working_rx).await;
        assert!(alert.body.contains("Mock Device 3"));
        assert!(broken_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_trigger_source_round_trip() {
        let (mut policy, _rx) = policy_with_recorder(&armed_config(&[]));

        assert!(policy.add_trigger_source(DeviceId(7)));
        assert!(policy.is_trigger_source(DeviceId(7)));
        // Re-adding is a no-op.
        assert!(!policy.add_trigger_source(DeviceId(7)));
        assert_eq!(policy.trigger_sources().count(), 1);

        assert!(policy.remove_trigger_source(DeviceId(7)));
        assert!(!policy.is_trigger_source(DeviceId(7)));
        assert!(!policy.remove_trigger_source(DeviceId(7)));
    }

    #[tokio::test]
    async fn test_config_snapshot_reflects_live_state() {
        let (mut policy, _rx) = policy_with_recorder(&armed_config(&[3]));
        policy.add_trigger_source(DeviceId(7));
        policy.set_suppress_command(Some("check-presence".to_string()));

        let config = policy.to_config();
        assert!(config.enabled);
        assert_eq!(config.trigger_sources.len(), 2);
        assert_eq!(config.suppress_command.as_deref(), Some("check-presence"));
        assert_eq!(config.filter_seconds, 5);
    }
}
