//! Notification channels.
//!
//! Each channel is independently enabled and independently validity-checked.
//! Delivery is fire-and-forget from the policy's perspective: an invalid
//! configuration degrades the channel to a logged no-op, and a delivery
//! failure on one channel never affects the others.

use async_trait::async_trait;
use thiserror::Error;

use crate::alarm::Alert;

mod email;
mod push;

pub use email::EmailChannel;
pub use push::PushChannel;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("push delivery failed: {0}")]
    Push(#[from] reqwest::Error),

    #[error("smtp delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("could not build mail: {0}")]
    Mail(#[from] lettre::error::Error),

    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),
}

/// Common capability of every notification channel.
///
/// New channel types are added by implementing this trait, not by branching
/// on type tags in the dispatch path.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn enabled(&self) -> bool;

    async fn set_enabled(&self, enabled: bool);

    /// Enabled and all channel-specific delivery parameters present.
    async fn is_valid_configuration(&self) -> bool;

    /// Deliver `alert` on this channel.
    ///
    /// A no-op when the configuration is invalid. Never propagates delivery
    /// errors; they are logged and swallowed.
    async fn send_notification(&self, alert: &Alert);
}
