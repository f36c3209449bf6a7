//! Cloneable façade for issuing commands to the sync worker.
//!
//! [`SyncHandle`] hides the channel plumbing behind async methods and also
//! serves as the engine's [`SyncHooks`] implementation.
use async_trait::async_trait;
use inventory_core::{InventorySnapshot, PlayerId, SyncGroupKey};
use tokio::sync::{broadcast, mpsc, oneshot};

use super::errors::{Result, SyncError};
use super::hooks::SyncHooks;
use super::outcomes::{
    GroupStatus, JoinOutcome, NotificationOutcome, PublishOutcome, SwitchOutcome,
};
use crate::detector::{ChangeDetector, ChangeEvent};
use crate::events::SyncEvent;
use crate::registry::SyncRegistry;
use crate::remote::Notification;
use crate::workers::Command;

/// Client-facing handle to a running engine.
#[derive(Clone)]
pub struct SyncHandle {
    command_tx: mpsc::Sender<Command>,
    event_tx: broadcast::Sender<SyncEvent>,
    detector: ChangeDetector,
    registry: SyncRegistry,
}

impl SyncHandle {
    pub(crate) fn new(
        command_tx: mpsc::Sender<Command>,
        event_tx: broadcast::Sender<SyncEvent>,
        registry: SyncRegistry,
    ) -> Self {
        Self {
            detector: ChangeDetector::new(registry.clone(), command_tx.clone()),
            command_tx,
            event_tx,
            registry,
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(command(reply_tx))
            .await
            .map_err(|_| SyncError::CommandChannelClosed)?;

        reply_rx.await.map_err(SyncError::ReplyChannelClosed)?
    }

    /// Starts a player's session: resolves their group, fetches its stored
    /// state, and applies it before any local change is accepted.
    pub async fn join(&self, player: PlayerId) -> Result<JoinOutcome> {
        self.request(|reply| Command::Join { player, reply }).await
    }

    /// Ends a player's session without flushing pending changes.
    pub async fn leave(&self, player: PlayerId) -> Result<()> {
        self.request(|reply| Command::Leave { player, reply }).await
    }

    /// Re-resolves the player's group after a team change.
    pub async fn membership_changed(&self, player: PlayerId) -> Result<SwitchOutcome> {
        self.request(|reply| Command::MembershipChanged { player, reply })
            .await
    }

    /// Publishes `snapshot` as the group's new state.
    pub async fn publish(
        &self,
        key: SyncGroupKey,
        snapshot: InventorySnapshot,
    ) -> Result<PublishOutcome> {
        self.request(|reply| Command::Publish {
            key,
            snapshot,
            reply,
        })
        .await
    }

    /// Reports a local change and waits for the publish that covers it.
    pub async fn local_change(&self, event: ChangeEvent) -> Result<PublishOutcome> {
        self.detector.observe_and_wait(event).await
    }

    /// Reports a player's death and waits for the resulting publish.
    ///
    /// With shared death enabled the group's synchronized item sections are
    /// cleared for every member, on every server. Otherwise the death is an
    /// ordinary local change of the player's inventory.
    pub async fn player_died(&self, player: PlayerId) -> Result<PublishOutcome> {
        self.request(|reply| Command::PlayerDied { player, reply })
            .await
    }

    /// Feeds a remote notification to the engine.
    pub async fn notify(&self, notification: Notification) -> Result<NotificationOutcome> {
        self.request(|reply| Command::Notification {
            notification,
            reply: Some(reply),
        })
        .await
    }

    pub async fn group_status(&self, key: SyncGroupKey) -> Result<Option<GroupStatus>> {
        self.request(|reply| Command::QueryGroup { key, reply }).await
    }

    /// Group the player is currently bound to, if any.
    pub fn group_of(&self, player: PlayerId) -> Option<SyncGroupKey> {
        self.registry.group_of(player)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    pub(crate) async fn shutdown_worker(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}

#[async_trait]
impl SyncHooks for SyncHandle {
    fn on_local_change(&self, event: ChangeEvent) -> bool {
        self.detector.observe(event)
    }

    async fn on_remote_notification(
        &self,
        notification: Notification,
    ) -> Result<NotificationOutcome> {
        self.notify(notification).await
    }
}
