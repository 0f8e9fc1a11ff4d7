use super::{Notification, NotificationChannel};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Forwards notifications to a receiver, e.g. a front-end event loop.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationChannel for ChannelNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        self.tx
            .send(notification)
            .map_err(|_| anyhow!("notification receiver dropped"))
    }
}
