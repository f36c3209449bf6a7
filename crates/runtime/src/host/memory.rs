//! In-memory host implementations for embedding, demos, and tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use inventory_core::{InventorySnapshot, PlayerId, TeamId};

use super::{InventoryHost, TeamDirectory};
use crate::api::SyncHooks;
use crate::detector::{ChangeCause, ChangeEvent};

#[derive(Default)]
struct InventoriesInner {
    players: HashMap<PlayerId, InventorySnapshot>,
    applies: HashMap<PlayerId, usize>,
}

/// Player inventories held in a map.
///
/// Once hooks are attached, [`MemoryInventories::edit`] reports every change
/// the way a game server's event listeners would. With
/// [`MemoryInventories::report_applies`] enabled, writes made by the engine
/// are reported too, which is what a host without its own re-entrancy guard
/// does.
#[derive(Clone, Default)]
pub struct MemoryInventories {
    inner: Arc<RwLock<InventoriesInner>>,
    hooks: Arc<RwLock<Option<Arc<dyn SyncHooks>>>>,
    report_applies: Arc<AtomicBool>,
}

impl MemoryInventories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, hooks: Arc<dyn SyncHooks>) {
        *self.hooks.write().unwrap_or_else(PoisonError::into_inner) = Some(hooks);
    }

    pub fn report_applies(&self, enabled: bool) {
        self.report_applies.store(enabled, Ordering::SeqCst);
    }

    /// Puts a player online with the given inventory. No change is reported.
    pub fn connect(&self, player: PlayerId, snapshot: InventorySnapshot) {
        self.write().players.insert(player, snapshot);
    }

    pub fn disconnect(&self, player: PlayerId) -> Option<InventorySnapshot> {
        self.write().players.remove(&player)
    }

    pub fn inventory(&self, player: PlayerId) -> Option<InventorySnapshot> {
        self.read().players.get(&player).cloned()
    }

    /// Number of times the engine wrote this player's inventory.
    pub fn apply_count(&self, player: PlayerId) -> usize {
        self.read().applies.get(&player).copied().unwrap_or(0)
    }

    /// Mutates a player's inventory and reports the change.
    ///
    /// Returns whether the change reached the engine; `false` when the player
    /// is offline, no hooks are attached, or the change was suppressed.
    pub fn edit(
        &self,
        player: PlayerId,
        cause: ChangeCause,
        mutate: impl FnOnce(&mut InventorySnapshot),
    ) -> bool {
        {
            let mut inner = self.write();
            let Some(snapshot) = inner.players.get_mut(&player) else {
                return false;
            };
            mutate(snapshot);
        }
        self.report(ChangeEvent::new(player, cause))
    }

    fn report(&self, event: ChangeEvent) -> bool {
        let hooks = self
            .hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        hooks.is_some_and(|hooks| hooks.on_local_change(event))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, InventoriesInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InventoriesInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl InventoryHost for MemoryInventories {
    fn capture_snapshot(&self, player: PlayerId) -> Option<InventorySnapshot> {
        self.inventory(player)
    }

    fn apply_snapshot(&self, player: PlayerId, snapshot: &InventorySnapshot) {
        {
            let mut inner = self.write();
            if !inner.players.contains_key(&player) {
                return;
            }
            inner.players.insert(player, snapshot.clone());
            *inner.applies.entry(player).or_default() += 1;
        }
        if self.report_applies.load(Ordering::SeqCst) {
            self.report(ChangeEvent::new(player, ChangeCause::Other));
        }
    }
}

/// Fixed team roster that tests and tools can edit.
#[derive(Clone, Default)]
pub struct StaticTeams {
    teams: Arc<RwLock<BTreeMap<PlayerId, TeamId>>>,
}

impl StaticTeams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&self, player: PlayerId, team: TeamId) {
        self.teams
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(player, team);
    }

    pub fn unassign(&self, player: PlayerId) {
        self.teams
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&player);
    }
}

impl TeamDirectory for StaticTeams {
    fn team_of(&self, player: PlayerId) -> Option<TeamId> {
        self.teams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&player)
            .cloned()
    }

    fn team_members(&self, team: &TeamId) -> BTreeSet<PlayerId> {
        self.teams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, t)| *t == team)
            .map(|(player, _)| *player)
            .collect()
    }
}
