//! Background task feeding remote notifications to the engine.

use std::sync::Arc;

use inventory_core::WriterId;
use tracing::{debug, info, trace, warn};

use crate::api::{SyncError, SyncHooks};
use crate::remote::{Backoff, NotificationChannel, Sleeper, Subscription};

/// Keeps a subscription open and forwards every foreign notification to the
/// engine's hooks. A lost subscription is reopened with backoff; the loop
/// ends only when the engine stops accepting commands.
pub(crate) struct NotificationListener {
    channel: Arc<dyn NotificationChannel>,
    hooks: Arc<dyn SyncHooks>,
    writer: WriterId,
    backoff: Backoff,
    sleeper: Arc<dyn Sleeper>,
    initial: Option<Subscription>,
}

impl NotificationListener {
    pub fn new(
        channel: Arc<dyn NotificationChannel>,
        hooks: Arc<dyn SyncHooks>,
        writer: WriterId,
        backoff: Backoff,
        sleeper: Arc<dyn Sleeper>,
        initial: Option<Subscription>,
    ) -> Self {
        Self {
            channel,
            hooks,
            writer,
            backoff,
            sleeper,
            initial,
        }
    }

    pub async fn run(mut self) {
        let mut failures = 0u32;
        loop {
            let subscription = match self.initial.take() {
                Some(subscription) => subscription,
                None => match self.channel.subscribe().await {
                    Ok(subscription) => {
                        info!(target: "sync::listener", "subscribed to notifications");
                        subscription
                    }
                    Err(err) => {
                        let delay = self.backoff.delay(failures);
                        warn!(
                            target: "sync::listener",
                            error = %err,
                            delay_ms = delay.as_millis() as u64,
                            "subscribe failed"
                        );
                        failures = failures.saturating_add(1);
                        self.sleeper.sleep(delay).await;
                        continue;
                    }
                },
            };
            failures = 0;

            if self.forward(subscription).await.is_break() {
                debug!(target: "sync::listener", "engine stopped, listener exiting");
                return;
            }

            let delay = self.backoff.delay(0);
            warn!(
                target: "sync::listener",
                delay_ms = delay.as_millis() as u64,
                "subscription lost, resubscribing"
            );
            self.sleeper.sleep(delay).await;
        }
    }

    /// Drains one subscription. Breaks when the engine is gone.
    async fn forward(&self, mut subscription: Subscription) -> std::ops::ControlFlow<()> {
        while let Some(notification) = subscription.next().await {
            if notification.origin == self.writer {
                trace!(
                    target: "sync::listener",
                    key = %notification.key,
                    version = notification.version,
                    "own notification skipped"
                );
                continue;
            }
            match self.hooks.on_remote_notification(notification).await {
                Ok(outcome) => trace!(target: "sync::listener", ?outcome, "notification handled"),
                Err(SyncError::CommandChannelClosed | SyncError::ReplyChannelClosed(_)) => {
                    return std::ops::ControlFlow::Break(());
                }
                Err(err) => warn!(target: "sync::listener", error = %err, "notification rejected"),
            }
        }
        std::ops::ControlFlow::Continue(())
    }
}
