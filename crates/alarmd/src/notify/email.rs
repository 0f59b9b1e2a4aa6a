//! Email notification channel.
//!
//! Delivers alerts over SMTP. The transport is built lazily from the
//! configured SMTP settings, cached for reuse across sends, and discarded
//! whenever those settings change.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::AsyncSmtpTransport;
use lettre::AsyncTransport;
use lettre::Message;
use lettre::Tokio1Executor;
use tokio::sync::Mutex;
use tokio::sync::RwLock;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::Notifier;
use super::NotifyError;
use crate::alarm::Alert;
use crate::config::EmailConfig;
use crate::config::SmtpConfig;

pub struct EmailChannel {
    settings: RwLock<EmailConfig>,

    /// Cached transport, rebuilt after any SMTP settings change
    transport: Mutex<Option<AsyncSmtpTransport<Tokio1Executor>>>,
}

impl EmailChannel {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            settings: RwLock::new(config),
            transport: Mutex::new(None),
        }
    }

    pub async fn email_address(&self) -> String {
        self.settings.read().await.email_address.clone()
    }

    pub async fn set_email_address(&self, email_address: String) {
        info!("setting email notification address to: {email_address}");
        self.settings.write().await.email_address = email_address;
    }

    pub async fn set_smtp(&self, smtp: Option<SmtpConfig>) {
        self.settings.write().await.smtp = smtp;
        // Stale transport would keep using the old server.
        *self.transport.lock().await = None;
    }

    /// Snapshot of the current settings, for configuration persistence.
    pub async fn config(&self) -> EmailConfig {
        self.settings.read().await.clone()
    }

    async fn transport(
        &self,
        smtp: &SmtpConfig,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, NotifyError> {
        let mut cached = self.transport.lock().await;
        if let Some(transport) = cached.as_ref() {
            return Ok(transport.clone());
        }

        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)?.port(smtp.port);
        if !smtp.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                smtp.username.clone(),
                smtp.password.clone(),
            ));
        }

        let transport = builder.build();
        *cached = Some(transport.clone());
        Ok(transport)
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), NotifyError> {
        let (to, smtp) = {
            let settings = self.settings.read().await;
            let Some(smtp) = settings.smtp.clone() else {
                return Ok(());
            };
            (settings.email_address.clone(), smtp)
        };

        let message = Message::builder()
            .from(Mailbox::new(
                Some(alert.title.clone()),
                smtp.from_address.parse()?,
            ))
            .to(to.parse::<Mailbox>()?)
            .subject(alert.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(alert.body.clone())?;

        self.transport(&smtp).await?.send(message).await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn enabled(&self) -> bool {
        self.settings.read().await.enabled
    }

    async fn set_enabled(&self, enabled: bool) {
        info!("setting email notifications enabled to: {enabled}");
        self.settings.write().await.enabled = enabled;
    }

    async fn is_valid_configuration(&self) -> bool {
        let settings = self.settings.read().await;
        if !settings.enabled {
            debug!("email notifications disabled, will not send email notification");
            return false;
        }
        if settings.email_address.is_empty() {
            warn!("no email address configured, can not send email notification");
            return false;
        }
        if settings.smtp.is_none() {
            warn!("no SMTP settings configured, can not send email notification");
            return false;
        }
        true
    }

    async fn send_notification(&self, alert: &Alert) {
        if !self.is_valid_configuration().await {
            return;
        }
        match self.deliver(alert).await {
            Ok(()) => info!("sent email notification"),
            Err(e) => error!("could not send email notification: {e}"),
        }
    }
}
