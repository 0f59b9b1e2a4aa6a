use chrono::DateTime;
use chrono::Utc;

use crate::bus::Device;

/// Application identity, used as the alert title and mail sender name.
pub const APP_NAME: &str = "Alarmd";

/// A single alarm notification.
///
/// Built once per accepted transition and consumed by every channel
/// independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    /// Application identity
    pub title: String,

    /// Category label, e.g. "Alarm"
    pub subject: String,

    /// Human-readable description including device identity and timestamp
    pub body: String,
}

impl Alert {
    /// Build the alert for a device that just turned on.
    pub fn for_device(device: &Device, at: DateTime<Utc>) -> Self {
        Self {
            title: APP_NAME.to_string(),
            subject: "Alarm".to_string(),
            body: format!(
                "{}: Device \"{}\" with id {} just turned on.",
                at.format("%Y-%m-%d %H:%M:%S"),
                device.name,
                device.id,
            ),
        }
    }
}
