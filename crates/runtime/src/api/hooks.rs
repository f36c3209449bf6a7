//! Callback capability handed to the host and to notification sources.

use async_trait::async_trait;

use super::errors::Result;
use super::outcomes::NotificationOutcome;
use crate::detector::ChangeEvent;
use crate::remote::Notification;

/// What the engine exposes to the code that observes the outside world.
///
/// The host calls [`SyncHooks::on_local_change`] from its event listeners;
/// a notification source (the built-in listener, or a host that receives
/// notifications another way) calls [`SyncHooks::on_remote_notification`].
#[async_trait]
pub trait SyncHooks: Send + Sync {
    /// Non-blocking; returns whether the change was forwarded.
    fn on_local_change(&self, event: ChangeEvent) -> bool;

    async fn on_remote_notification(&self, notification: Notification)
    -> Result<NotificationOutcome>;
}
