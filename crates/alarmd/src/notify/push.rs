//! Push notification channel.
//!
//! Delivers alerts to an HTTP push-notification service as a form POST with
//! the account's API key. One long-lived client is reused for every send.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::Notifier;
use super::NotifyError;
use crate::alarm::Alert;
use crate::config::PushConfig;

const DEFAULT_PUSH_URL: &str = "https://www.notifymyandroid.com/publicapi/notify";

pub struct PushChannel {
    url: String,
    client: reqwest::Client,
    settings: RwLock<PushConfig>,
}

impl PushChannel {
    pub fn new(config: PushConfig) -> Self {
        Self::with_url(DEFAULT_PUSH_URL, config)
    }

    pub fn with_url(url: impl Into<String>, config: PushConfig) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            settings: RwLock::new(config),
        }
    }

    pub async fn api_key(&self) -> String {
        self.settings.read().await.api_key.clone()
    }

    pub async fn set_api_key(&self, api_key: String) {
        info!("setting push API key");
        self.settings.write().await.api_key = api_key;
    }

    /// Snapshot of the current settings, for configuration persistence.
    pub async fn config(&self) -> PushConfig {
        self.settings.read().await.clone()
    }

    async fn deliver(&self, api_key: &str, alert: &Alert) -> Result<(), NotifyError> {
        self.client
            .post(&self.url)
            .form(&[
                ("apikey", api_key),
                ("application", alert.title.as_str()),
                ("event", alert.subject.as_str()),
                ("description", alert.body.as_str()),
                ("priority", "0"),
            ])
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for PushChannel {
    fn name(&self) -> &'static str {
        "push"
    }

    async fn enabled(&self) -> bool {
        self.settings.read().await.enabled
    }

    async fn set_enabled(&self, enabled: bool) {
        info!("setting push notifications enabled to: {enabled}");
        self.settings.write().await.enabled = enabled;
    }

    async fn is_valid_configuration(&self) -> bool {
        let settings = self.settings.read().await;
        if !settings.enabled {
            debug!("push notifications disabled, will not send push notification");
            return false;
        }
        if settings.api_key.is_empty() {
            warn!("no push API key configured, can not send push notification");
            return false;
        }
        true
    }

    async fn send_notification(&self, alert: &Alert) {
        if !self.is_valid_configuration().await {
            return;
        }
        let api_key = self.api_key().await;
        match self.deliver(&api_key, alert).await {
            Ok(()) => info!("sent push notification"),
            Err(e) => error!("could not send push notification: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;
    use crate::bus::Device;
    use crate::bus::DeviceId;

    fn alert() -> Alert {
        Alert::for_device(
            &Device {
                id: DeviceId(1),
                name: "Mock Device 1".to_string(),
                on: true,
            },
            DateTime::from_timestamp(0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_disabled_channel_is_invalid() {
        let channel = PushChannel::new(PushConfig {
            enabled: false,
            api_key: "key".to_string(),
        });
        assert!(!channel.is_valid_configuration().await);
    }

    #[tokio::test]
    async fn test_missing_api_key_is_invalid() {
        let channel = PushChannel::new(PushConfig {
            enabled: true,
            api_key: String::new(),
        });
        assert!(!channel.is_valid_configuration().await);
    }

    #[tokio::test]
    async fn test_enabled_with_key_is_valid() {
        let channel = PushChannel::new(PushConfig {
            enabled: true,
            api_key: "key".to_string(),
        });
        assert!(channel.is_valid_configuration().await);
    }

    #[tokio::test]
    async fn test_invalid_configuration_send_is_a_no_op() {
        // Unroutable URL: a send attempt would fail loudly, a no-op won't.
        let channel = PushChannel::with_url(
            "http://127.0.0.1:1/notify",
            PushConfig {
                enabled: true,
                api_key: String::new(),
            },
        );
        channel.send_notification(&alert()).await;
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let channel = PushChannel::with_url(
            "http://127.0.0.1:1/notify",
            PushConfig {
                enabled: true,
                api_key: "key".to_string(),
            },
        );
        // Connection refused; must log and return, not panic or propagate.
        channel.send_notification(&alert()).await;
    }
}
