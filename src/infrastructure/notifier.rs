use crate::domain::notification::Notification;
use crate::domain::ports::Notifier;
use crate::error::{BookingError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Writes each push to the log instead of delivering it.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: Notification) -> Result<()> {
        info!(
            device = %notification.device_token,
            kind = ?notification.kind,
            title = %notification.title,
            "push notification"
        );
        Ok(())
    }
}

/// Keeps every push it is handed, for inspection.
///
/// Tokens listed as unreachable fail delivery, like an expired device would.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    sent: Arc<RwLock<Vec<Notification>>>,
    unreachable: Arc<RwLock<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn mark_unreachable(&self, device_token: impl Into<String>) {
        self.unreachable.write().await.push(device_token.into());
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: Notification) -> Result<()> {
        if self
            .unreachable
            .read()
            .await
            .contains(&notification.device_token)
        {
            return Err(BookingError::ExternalServiceFailure(format!(
                "device {} unreachable",
                notification.device_token
            )));
        }
        self.sent.write().await.push(notification);
        Ok(())
    }
}
