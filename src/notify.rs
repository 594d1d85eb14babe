//! Best-effort user notifications.

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, title: &str, message: &str) -> Result<()>;
}

/// Deliver and swallow any failure into a log line.
pub async fn notify(sink: &dyn NotificationSink, title: &str, message: &str) {
    if let Err(e) = sink.deliver(title, message).await {
        warn!(%title, %message, error = %e, "Notification not delivered");
    }
}

/// Only logs.
pub struct LogNotifier;

#[async_trait::async_trait]
impl NotificationSink for LogNotifier {
    async fn deliver(&self, title: &str, message: &str) -> Result<()> {
        info!(%title, %message, "Notification");
        Ok(())
    }
}

/// Desktop notifications through `notify-send`.
pub struct DesktopNotifier {
    program: String,
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self {
            program: "notify-send".to_string(),
        }
    }
}

#[async_trait::async_trait]
impl NotificationSink for DesktopNotifier {
    async fn deliver(&self, title: &str, message: &str) -> Result<()> {
        let status = tokio::process::Command::new(&self.program)
            .arg("--app-name=slotcatcher")
            .arg(title)
            .arg(message)
            .status()
            .await
            .with_context(|| format!("failed to run {}", self.program))?;
        if !status.success() {
            bail!("{} exited with {}", self.program, status);
        }
        Ok(())
    }
}

/// Records deliveries in memory.
#[cfg(any(test, feature = "test-support"))]
#[derive(Default)]
pub struct RecordingNotifier {
    delivered: std::sync::Mutex<Vec<(String, String)>>,
    fail: bool,
}

#[cfg(any(test, feature = "test-support"))]
impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every delivery fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn delivered(&self) -> Vec<(String, String)> {
        self.delivered
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait::async_trait]
impl NotificationSink for RecordingNotifier {
    async fn deliver(&self, title: &str, message: &str) -> Result<()> {
        if self.fail {
            bail!("notification daemon unavailable");
        }
        self.delivered
            .lock()
            .map_err(|_| anyhow::anyhow!("notifier poisoned"))?
            .push((title.to_string(), message.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let sink = RecordingNotifier::failing();
        notify(&sink, "Booked", "ok").await;
        assert!(sink.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let sink = DesktopNotifier {
            program: "definitely-not-a-notifier-binary".into(),
        };
        assert!(sink.deliver("t", "m").await.is_err());
    }
}
