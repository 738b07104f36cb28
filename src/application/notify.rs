use crate::domain::ids::UserId;
use crate::domain::notification::Notification;
use crate::domain::ports::{Notifier, UnitOfWork};
use crate::error::Result;
use tracing::warn;

/// Sends pushes one by one. Delivery failures are logged and swallowed.
///
/// Only call this after the unit of work that produced the notifications has
/// committed and been dropped.
pub(crate) async fn deliver(notifier: &dyn Notifier, notifications: Vec<Notification>) -> usize {
    let mut delivered = 0;
    for notification in notifications {
        let kind = notification.kind;
        let device = notification.device_token.clone();
        match notifier.send(notification).await {
            Ok(()) => delivered += 1,
            Err(err) => warn!(error = %err, device = %device, kind = ?kind, "push delivery failed"),
        }
    }
    delivered
}

/// The user's device token, if they registered one.
pub(crate) async fn token_of(uow: &mut dyn UnitOfWork, user_id: UserId) -> Result<Option<String>> {
    Ok(uow
        .device_token(user_id)
        .await?
        .filter(|token| !token.is_empty()))
}
