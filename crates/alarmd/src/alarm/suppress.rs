use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;
use tracing::error;
use tracing::info;

/// External veto check.
///
/// When a command is configured it is run through the shell with no
/// arguments; a success exit means "suppressed" and the alarm is silenced.
/// Any other outcome, including a failure to run the command at all, means
/// the alarm proceeds.
#[derive(Debug, Clone, Default)]
pub struct SuppressionCheck {
    command: Option<String>,
}

impl SuppressionCheck {
    pub fn new(command: Option<String>) -> Self {
        // An empty string counts as "no command configured".
        Self {
            command: command.filter(|c| !c.trim().is_empty()),
        }
    }

    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    pub fn set_command(&mut self, command: Option<String>) {
        self.command = command.filter(|c| !c.trim().is_empty());
    }

    pub async fn is_suppressed(&self) -> bool {
        let Some(command) = &self.command else {
            return false;
        };

        info!("running suppression command: {command}");
        let status = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => {
                info!("alarm suppressed by command");
                true
            }
            Ok(status) => {
                debug!("suppression command exited with {status}, not suppressing");
                false
            }
            Err(e) => {
                error!("could not run suppression command: {e}");
                false
            }
        }
    }
}
