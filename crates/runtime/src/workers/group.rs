//! Per-group bookkeeping owned by the sync worker.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use inventory_core::{InventorySnapshot, PlayerId, SnapshotDelta, SyncGroupKey, SyncSections};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::api::{GroupStatus, JoinOutcome, PublishOutcome, Result, SwitchOutcome, SyncError};
use crate::host::InventoryHost;
use crate::registry::SyncRegistry;

pub(crate) type PublishReply = oneshot::Sender<Result<PublishOutcome>>;

/// Who is waiting for a player to finish entering a group.
pub(crate) enum JoinReply {
    Join(oneshot::Sender<Result<JoinOutcome>>),
    Switch {
        from: SyncGroupKey,
        reply: oneshot::Sender<Result<SwitchOutcome>>,
    },
}

impl JoinReply {
    pub fn fail(self, err: SyncError) {
        match self {
            Self::Join(reply) => {
                let _ = reply.send(Err(err));
            }
            Self::Switch { reply, .. } => {
                let _ = reply.send(Err(err));
            }
        }
    }

    pub fn is_switch(&self) -> bool {
        matches!(self, Self::Switch { .. })
    }
}

/// The single remote operation a group may have in flight.
pub(crate) enum Phase {
    Idle,
    Baseline {
        op: u64,
    },
    Fetching {
        op: u64,
        /// Highest notified version when the fetch started.
        target: u64,
    },
    Publishing {
        op: u64,
        /// Members folded into this publish, with what the engine knew of
        /// each before (restored if the publish fails).
        sources: BTreeMap<PlayerId, InventorySnapshot>,
        waiters: Vec<PublishReply>,
    },
}

impl Phase {
    pub fn op(&self) -> Option<u64> {
        match self {
            Self::Idle => None,
            Self::Baseline { op } | Self::Fetching { op, .. } | Self::Publishing { op, .. } => {
                Some(*op)
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// Local changes waiting for the next publish. Later changes coalesce into
/// the same entry.
#[derive(Default)]
pub(crate) struct QueuedPublish {
    pub dirty: BTreeSet<PlayerId>,
    /// Explicitly published snapshot; the latest one wins.
    pub explicit: Option<InventorySnapshot>,
    /// A member died: the synchronized item sections are emptied after the
    /// other queued edits are folded in.
    pub clear_items: bool,
    pub waiters: Vec<PublishReply>,
}

impl QueuedPublish {
    pub fn is_empty(&self) -> bool {
        self.dirty.is_empty()
            && self.explicit.is_none()
            && !self.clear_items
            && self.waiters.is_empty()
    }
}

/// How a newly admitted member's inventory is treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Overwrite with the group's state.
    Apply,
    /// The group has no stored state; the member's inventory seeds it.
    Seed,
    /// The stored state is unreadable; leave the inventory alone.
    Keep,
}

pub(crate) struct Candidate {
    pub snapshot: Option<InventorySnapshot>,
    pub sources: BTreeMap<PlayerId, InventorySnapshot>,
    pub waiters: Vec<PublishReply>,
}

pub(crate) struct GroupState {
    pub key: SyncGroupKey,
    pub members: BTreeSet<PlayerId>,
    pub joining: Vec<(PlayerId, JoinReply)>,
    pub last_applied: u64,
    /// Full state at `last_applied` (every section, as stored).
    pub base: InventorySnapshot,
    /// Last state the engine synced each member to, or captured from them
    /// for a publish. Their unpublished edits are the difference between
    /// this and their live inventory.
    pub known: HashMap<PlayerId, InventorySnapshot>,
    pub phase: Phase,
    pub queued: QueuedPublish,
    /// Highest version announced by a notification and not yet fetched.
    pub remote_hint: u64,
    /// Version of a stored state that could not be decoded.
    pub unreadable: Option<u64>,
    pub task: Option<JoinHandle<()>>,
}

impl GroupState {
    pub fn new(key: SyncGroupKey) -> Self {
        Self {
            key,
            members: BTreeSet::new(),
            joining: Vec::new(),
            last_applied: 0,
            base: InventorySnapshot::new(),
            known: HashMap::new(),
            phase: Phase::Idle,
            queued: QueuedPublish::default(),
            remote_hint: 0,
            unreadable: None,
            task: None,
        }
    }

    pub fn admission(&self) -> Admission {
        if self.unreadable.is_some() {
            Admission::Keep
        } else if self.last_applied == 0 {
            Admission::Seed
        } else {
            Admission::Apply
        }
    }

    /// Adds a member. Returns true when their inventory will seed the group.
    pub fn admit(
        &mut self,
        player: PlayerId,
        host: &dyn InventoryHost,
        registry: &SyncRegistry,
        sections: SyncSections,
    ) -> bool {
        self.members.insert(player);
        let local = host.capture_snapshot(player);

        match self.admission() {
            Admission::Apply => {
                if let Some(local) = &local
                    && sections.retain(local) != sections.retain(&self.base)
                {
                    let _pending = registry.begin_apply(&self.key);
                    host.apply_snapshot(player, &sections.overlay(local, &self.base));
                }
                self.known.insert(player, self.base.clone());
                false
            }
            Admission::Seed => {
                self.known.insert(player, InventorySnapshot::new());
                let seeds = local.is_some_and(|local| {
                    let scoped = sections.retain(&local);
                    !scoped.is_empty()
                });
                if seeds {
                    self.queued.dirty.insert(player);
                }
                seeds
            }
            Admission::Keep => {
                self.known
                    .insert(player, local.unwrap_or_else(InventorySnapshot::new));
                false
            }
        }
    }

    /// Brings every member to `state`, replaying each member's unpublished
    /// edits on top. Members that had edits are queued for the next publish.
    ///
    /// Returns how many inventories were written.
    pub fn reconcile(
        &mut self,
        state: &InventorySnapshot,
        host: &dyn InventoryHost,
        registry: &SyncRegistry,
        sections: SyncSections,
    ) -> usize {
        let _pending = registry.begin_apply(&self.key);
        let mut written = 0;

        for &player in &self.members {
            let Some(local) = host.capture_snapshot(player) else {
                continue;
            };
            let captured = sections.retain(&local);
            let known = self.known.get(&player).unwrap_or(&self.base);
            let unpublished = SnapshotDelta::between(&sections.retain(known), &captured);
            let target = unpublished.apply_to(state);

            if sections.retain(&target) != captured {
                host.apply_snapshot(player, &sections.overlay(&local, &target));
                written += 1;
            }
            if !unpublished.is_empty() {
                self.queued.dirty.insert(player);
            }
            self.known.insert(player, state.clone());
        }

        written
    }

    /// Drains the queue into the state to publish.
    ///
    /// Each dirty member contributes their edits since the engine last synced
    /// them; an explicit snapshot replaces the synchronized sections first,
    /// and a queued death empties the item sections last.
    /// The candidate is `None` when nothing differs from the current base.
    pub fn take_candidate(&mut self, host: &dyn InventoryHost, sections: SyncSections) -> Candidate {
        let queued = std::mem::take(&mut self.queued);
        let mut snapshot = match queued.explicit {
            Some(explicit) => {
                let mut merged = sections.overlay(&self.base, &explicit);
                merged.extensions = self.base.extensions.clone();
                merged
            }
            None => self.base.clone(),
        };
        let mut sources = BTreeMap::new();

        for player in queued.dirty {
            if !self.members.contains(&player) {
                continue;
            }
            let Some(local) = host.capture_snapshot(player) else {
                continue;
            };
            let captured = sections.retain(&local);
            let known = self
                .known
                .get(&player)
                .cloned()
                .unwrap_or_else(|| self.base.clone());
            let edits = SnapshotDelta::between(&sections.retain(&known), &captured);
            snapshot = edits.apply_to(&snapshot);
            self.known.insert(player, captured);
            sources.insert(player, known);
        }

        if queued.clear_items {
            let mut cleared = snapshot.clone();
            cleared.clear_items();
            snapshot = sections.overlay(&snapshot, &cleared);
        }

        Candidate {
            snapshot: (snapshot != self.base).then_some(snapshot),
            sources,
            waiters: queued.waiters,
        }
    }

    /// Puts back what a failed publish had taken from members, so their
    /// edits are picked up again by the next one.
    pub fn restore_sources(&mut self, sources: BTreeMap<PlayerId, InventorySnapshot>) {
        for (player, known) in sources {
            if self.members.contains(&player) {
                self.known.insert(player, known);
            }
        }
    }

    pub fn status(&self) -> GroupStatus {
        GroupStatus {
            key: self.key.clone(),
            members: self.members.iter().copied().collect(),
            last_applied: self.last_applied,
            busy: !self.phase.is_idle(),
            pending_changes: !self.queued.is_empty(),
        }
    }

    /// Abandons in-flight work and fails everyone still waiting on it.
    pub fn close(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let key = self.key.clone();
        if let Phase::Publishing { waiters, .. } = std::mem::replace(&mut self.phase, Phase::Idle) {
            for waiter in waiters {
                let _ = waiter.send(Err(SyncError::InactiveGroup { key: key.clone() }));
            }
        }
        for waiter in self.queued.waiters.drain(..) {
            let _ = waiter.send(Err(SyncError::InactiveGroup { key: key.clone() }));
        }
        for (player, reply) in self.joining.drain(..) {
            reply.fail(SyncError::SessionClosed { player });
        }
    }
}
