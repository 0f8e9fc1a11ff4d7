use super::{Notification, NotificationChannel, Severity};
use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

pub struct LogNotifier;

#[async_trait]
impl NotificationChannel for LogNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        let message = notification.message();
        match notification.severity() {
            Severity::Positive => info!(notification = %message, "Notify"),
            Severity::Negative => warn!(notification = %message, "Notify"),
        }
        Ok(())
    }
}
