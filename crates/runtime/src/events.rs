//! Events broadcast by the engine.
//!
//! Delivery is best effort: with no subscriber, or a lagging one, events are
//! dropped without affecting synchronization.

use inventory_core::{PlayerId, SyncGroupKey};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncEvent {
    /// Initial state for a group was applied on this process.
    BaselineLoaded {
        key: SyncGroupKey,
        version: u64,
        seeded: bool,
    },
    /// A new version was committed by this process.
    Published {
        key: SyncGroupKey,
        version: u64,
        conflicts: u32,
    },
    /// A compare-and-set lost and the change is being rebased.
    ConflictRetried {
        key: SyncGroupKey,
        attempt: u32,
        current_version: u64,
    },
    PublishFailed { key: SyncGroupKey, reason: String },
    /// A state was written into local inventories.
    Applied {
        key: SyncGroupKey,
        version: u64,
        members: usize,
    },
    /// A notification at or below the last applied version was ignored.
    Discarded {
        key: SyncGroupKey,
        version: u64,
        last_applied: u64,
    },
    DecodeFailed {
        key: SyncGroupKey,
        version: u64,
        error: String,
    },
    GroupSwitched {
        player: PlayerId,
        from: SyncGroupKey,
        to: SyncGroupKey,
    },
    /// The last local member left.
    GroupClosed { key: SyncGroupKey },
    /// A member died and the group's synchronized items are being cleared.
    SharedDeath { key: SyncGroupKey, player: PlayerId },
}

impl SyncEvent {
    pub fn key(&self) -> &SyncGroupKey {
        match self {
            Self::BaselineLoaded { key, .. }
            | Self::Published { key, .. }
            | Self::ConflictRetried { key, .. }
            | Self::PublishFailed { key, .. }
            | Self::Applied { key, .. }
            | Self::Discarded { key, .. }
            | Self::DecodeFailed { key, .. }
            | Self::GroupClosed { key }
            | Self::SharedDeath { key, .. } => key,
            Self::GroupSwitched { to, .. } => to,
        }
    }
}
