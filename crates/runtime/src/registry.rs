//! State shared between the worker and the threads that report changes.
//!
//! The worker is the only writer. Host threads read it to decide whether a
//! change event should reach the worker at all.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use inventory_core::{PlayerId, SyncGroupKey};

#[derive(Clone, Debug)]
struct Session {
    key: SyncGroupKey,
    switching: bool,
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<PlayerId, Session>,
    applying: HashSet<SyncGroupKey>,
    deferred: BTreeSet<PlayerId>,
}

/// Player-to-group bindings and the set of groups currently being applied.
#[derive(Clone, Default)]
pub struct SyncRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl SyncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group_of(&self, player: PlayerId) -> Option<SyncGroupKey> {
        self.read().sessions.get(&player).map(|s| s.key.clone())
    }

    pub fn is_switching(&self, player: PlayerId) -> bool {
        self.read()
            .sessions
            .get(&player)
            .is_some_and(|s| s.switching)
    }

    /// True while a remote state is being written into this group's
    /// inventories.
    pub fn is_applying(&self, key: &SyncGroupKey) -> bool {
        self.read().applying.contains(key)
    }

    pub(crate) fn bind(&self, player: PlayerId, key: SyncGroupKey) {
        self.write().sessions.insert(
            player,
            Session {
                key,
                switching: false,
            },
        );
    }

    pub(crate) fn unbind(&self, player: PlayerId) {
        let mut inner = self.write();
        inner.sessions.remove(&player);
        inner.deferred.remove(&player);
    }

    pub(crate) fn set_switching(&self, player: PlayerId, switching: bool) {
        if let Some(session) = self.write().sessions.get_mut(&player) {
            session.switching = switching;
        }
    }

    /// Marks `key` as being applied until the returned guard drops.
    pub(crate) fn begin_apply(&self, key: &SyncGroupKey) -> PendingApply {
        self.write().applying.insert(key.clone());
        PendingApply {
            registry: self.clone(),
            key: key.clone(),
        }
    }

    /// Remembers a change that could not be queued right away.
    pub(crate) fn defer(&self, player: PlayerId) {
        self.write().deferred.insert(player);
    }

    pub(crate) fn take_deferred(&self) -> Vec<PlayerId> {
        let mut inner = self.write();
        if inner.deferred.is_empty() {
            return Vec::new();
        }
        std::mem::take(&mut inner.deferred).into_iter().collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Suppresses change reports for one group while a remote state is applied.
#[must_use = "the group stops being suppressed as soon as the guard drops"]
pub struct PendingApply {
    registry: SyncRegistry,
    key: SyncGroupKey,
}

impl Drop for PendingApply {
    fn drop(&mut self) {
        self.registry.write().applying.remove(&self.key);
    }
}
