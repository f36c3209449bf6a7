//! Results returned by engine operations.

use inventory_core::{PlayerId, SyncGroupKey};

/// Result of a publish, whether explicit or triggered by a local change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// A new version was committed (or the change was merged into one).
    Committed { version: u64 },
    /// Nothing differed from the last committed state.
    Unchanged { version: u64 },
    /// The change happened while a remote state was being applied and was
    /// not forwarded.
    Suppressed,
}

impl PublishOutcome {
    pub fn version(&self) -> Option<u64> {
        match self {
            Self::Committed { version } | Self::Unchanged { version } => Some(*version),
            Self::Suppressed => None,
        }
    }
}

/// Baseline established when a player's session begins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinOutcome {
    pub key: SyncGroupKey,
    /// Version applied locally; `0` when the group had no stored state.
    pub version: u64,
    /// True when this player's inventory is seeding an empty group.
    pub seeded: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The player still resolves to the same group.
    Unchanged { key: SyncGroupKey },
    Switched {
        from: SyncGroupKey,
        to: SyncGroupKey,
        version: u64,
    },
}

/// What the engine did with an incoming notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// No local member belongs to the group.
    Untracked,
    /// The version was not newer than the last applied one.
    Stale { last_applied: u64 },
    /// A fetch was started, or queued behind the group's running operation.
    Scheduled,
}

/// Snapshot of one group's bookkeeping, for diagnostics and tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupStatus {
    pub key: SyncGroupKey,
    pub members: Vec<PlayerId>,
    pub last_applied: u64,
    /// A publish or fetch is in flight.
    pub busy: bool,
    /// Local changes are waiting for the next publish.
    pub pending_changes: bool,
}
