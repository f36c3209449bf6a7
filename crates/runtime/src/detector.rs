//! Turns host inventory events into publish requests.
//!
//! The detector never captures or sends anything itself. It filters events
//! (unknown player, switching player, group being applied) and hands the
//! rest to the worker, which captures the full snapshot when it gets to the
//! request. A burst of events therefore collapses into one publish of the
//! latest inventory.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use inventory_core::PlayerId;
use strum::{Display, EnumIter, IntoStaticStr};
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use crate::api::{PublishOutcome, Result, SyncError};
use crate::registry::SyncRegistry;
use crate::workers::Command;

/// Host action that may have changed an inventory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ChangeCause {
    Pickup,
    Drop,
    Craft,
    ContainerClose,
    Death,
    EquipmentSwap,
    Consume,
    ItemBreak,
    CreativeEdit,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangeEvent {
    pub player: PlayerId,
    pub cause: ChangeCause,
}

impl ChangeEvent {
    pub fn new(player: PlayerId, cause: ChangeCause) -> Self {
        Self { player, cause }
    }
}

enum Admission {
    Forward,
    NoSession,
    Switching,
    Suppressed,
}

/// Cloneable entry point for host change events.
#[derive(Clone)]
pub struct ChangeDetector {
    registry: SyncRegistry,
    command_tx: mpsc::Sender<Command>,
    suppressed: Arc<AtomicU64>,
}

impl ChangeDetector {
    pub(crate) fn new(registry: SyncRegistry, command_tx: mpsc::Sender<Command>) -> Self {
        Self {
            registry,
            command_tx,
            suppressed: Arc::new(AtomicU64::new(0)),
        }
    }

    fn admit(&self, event: &ChangeEvent) -> Admission {
        let Some(key) = self.registry.group_of(event.player) else {
            return Admission::NoSession;
        };
        if self.registry.is_applying(&key) {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            trace!(
                target: "sync::detector",
                player = %event.player,
                %key,
                cause = %event.cause,
                "change suppressed during apply"
            );
            return Admission::Suppressed;
        }
        if self.registry.is_switching(event.player) {
            return Admission::Switching;
        }
        Admission::Forward
    }

    /// Reports a change without waiting. Never blocks.
    ///
    /// Returns whether the change will be published. When the command queue
    /// is full the change is parked and picked up by the worker after its
    /// current backlog, so it still returns `true`.
    pub fn observe(&self, event: ChangeEvent) -> bool {
        if !matches!(self.admit(&event), Admission::Forward) {
            return false;
        }

        match self.command_tx.try_send(Command::LocalChange { event, reply: None }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.registry.defer(event.player);
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Reports a change and waits for the publish that covers it.
    pub async fn observe_and_wait(&self, event: ChangeEvent) -> Result<PublishOutcome> {
        match self.admit(&event) {
            Admission::Forward => {}
            Admission::Suppressed => return Ok(PublishOutcome::Suppressed),
            Admission::NoSession => {
                return Err(SyncError::SessionClosed {
                    player: event.player,
                });
            }
            Admission::Switching => {
                return Err(SyncError::GroupSwitchInProgress {
                    player: event.player,
                });
            }
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command::LocalChange {
                event,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| SyncError::CommandChannelClosed)?;

        reply_rx.await.map_err(SyncError::ReplyChannelClosed)?
    }

    /// Number of events dropped because their group was being applied.
    pub fn suppressed_count(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inventory_core::SyncGroupKey;

    fn detector(buffer: usize) -> (ChangeDetector, SyncRegistry, mpsc::Receiver<Command>) {
        let registry = SyncRegistry::new();
        let (tx, rx) = mpsc::channel(buffer);
        (ChangeDetector::new(registry.clone(), tx), registry, rx)
    }

    #[test]
    fn test_unknown_player_is_not_forwarded() {
        let (detector, _registry, mut rx) = detector(4);
        assert!(!detector.observe(ChangeEvent::new(PlayerId::from_u128(1), ChangeCause::Drop)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_change_during_apply_is_suppressed() {
        let (detector, registry, mut rx) = detector(4);
        let player = PlayerId::from_u128(1);
        let key = SyncGroupKey::for_player(player);
        registry.bind(player, key.clone());

        {
            let _guard = registry.begin_apply(&key);
            assert!(!detector.observe(ChangeEvent::new(player, ChangeCause::Pickup)));
        }
        assert_eq!(detector.suppressed_count(), 1);
        assert!(rx.try_recv().is_err());

        assert!(detector.observe(ChangeEvent::new(player, ChangeCause::Pickup)));
        assert!(matches!(rx.try_recv(), Ok(Command::LocalChange { .. })));
    }

    #[test]
    fn test_full_queue_defers_change() {
        let (detector, registry, _rx) = detector(1);
        let player = PlayerId::from_u128(3);
        registry.bind(player, SyncGroupKey::for_player(player));

        assert!(detector.observe(ChangeEvent::new(player, ChangeCause::Craft)));
        assert!(detector.observe(ChangeEvent::new(player, ChangeCause::Craft)));
        assert_eq!(registry.take_deferred(), vec![player]);
    }

    #[tokio::test]
    async fn test_wait_rejects_switching_player() {
        let (detector, registry, _rx) = detector(4);
        let player = PlayerId::from_u128(4);
        registry.bind(player, SyncGroupKey::for_player(player));
        registry.set_switching(player, true);

        let result = detector
            .observe_and_wait(ChangeEvent::new(player, ChangeCause::Drop))
            .await;
        assert!(matches!(result, Err(SyncError::GroupSwitchInProgress { .. })));
    }

    #[test]
    fn test_cause_names() {
        let name: &'static str = ChangeCause::ContainerClose.into();
        assert_eq!(name, "container_close");
        assert_eq!(ChangeCause::ItemBreak.to_string(), "item_break");
    }
}
