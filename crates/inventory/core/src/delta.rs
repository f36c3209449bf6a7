//! Slot-level differences between two snapshots.
//!
//! Deltas are never published. They exist so a writer that lost a version
//! race can replay its own edit on top of the state that beat it, instead of
//! either discarding the edit or overwriting the winner wholesale.

use std::collections::BTreeMap;

use crate::item::{Experience, ItemStack};
use crate::snapshot::{EquipmentSlot, InventorySnapshot};

/// New value of a single slot or field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldChange<T> {
    Set(T),
    Cleared,
}

impl<T: Clone> FieldChange<T> {
    fn between(from: Option<&T>, to: Option<&T>) -> Option<Self>
    where
        T: PartialEq,
    {
        match (from, to) {
            (a, b) if a == b => None,
            (_, Some(value)) => Some(Self::Set(value.clone())),
            (Some(_), None) => Some(Self::Cleared),
            (None, None) => None,
        }
    }

    fn apply(&self, target: &mut Option<T>) {
        *target = match self {
            Self::Set(value) => Some(value.clone()),
            Self::Cleared => None,
        };
    }
}

/// Per-slot changes that turn one snapshot into another.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SnapshotDelta {
    pub main: BTreeMap<u16, FieldChange<ItemStack>>,
    pub equipment: BTreeMap<EquipmentSlot, FieldChange<ItemStack>>,
    pub ender_chest: BTreeMap<u16, FieldChange<ItemStack>>,
    pub cursor: Option<FieldChange<ItemStack>>,
    pub experience: Option<FieldChange<Experience>>,
    pub currency: Option<FieldChange<i64>>,
}

impl SnapshotDelta {
    /// Computes the changes that turn `from` into `to`.
    ///
    /// Extension fields are opaque and never diffed; they follow the base a
    /// delta is applied to.
    pub fn between(from: &InventorySnapshot, to: &InventorySnapshot) -> Self {
        Self {
            main: diff_slots(&from.main, &to.main),
            equipment: diff_slots(&from.equipment, &to.equipment),
            ender_chest: diff_slots(&from.ender_chest, &to.ender_chest),
            cursor: FieldChange::between(from.cursor.as_ref(), to.cursor.as_ref()),
            experience: FieldChange::between(from.experience.as_ref(), to.experience.as_ref()),
            currency: FieldChange::between(from.currency.as_ref(), to.currency.as_ref()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.change_count() == 0
    }

    /// Number of slots and fields touched.
    pub fn change_count(&self) -> usize {
        self.main.len()
            + self.equipment.len()
            + self.ender_chest.len()
            + usize::from(self.cursor.is_some())
            + usize::from(self.experience.is_some())
            + usize::from(self.currency.is_some())
    }

    /// Replays these changes on top of `base`.
    ///
    /// Slots the delta does not mention keep the base's value, so edits made
    /// by another writer to other slots survive.
    pub fn apply_to(&self, base: &InventorySnapshot) -> InventorySnapshot {
        let mut result = base.clone();
        apply_slots(&mut result.main, &self.main);
        apply_slots(&mut result.equipment, &self.equipment);
        apply_slots(&mut result.ender_chest, &self.ender_chest);
        if let Some(change) = &self.cursor {
            change.apply(&mut result.cursor);
        }
        if let Some(change) = &self.experience {
            change.apply(&mut result.experience);
        }
        if let Some(change) = &self.currency {
            change.apply(&mut result.currency);
        }
        result
    }
}

fn diff_slots<K: Ord + Copy>(
    from: &BTreeMap<K, ItemStack>,
    to: &BTreeMap<K, ItemStack>,
) -> BTreeMap<K, FieldChange<ItemStack>> {
    let mut changes = BTreeMap::new();
    for key in from.keys().chain(to.keys()) {
        if changes.contains_key(key) {
            continue;
        }
        if let Some(change) = FieldChange::between(from.get(key), to.get(key)) {
            changes.insert(*key, change);
        }
    }
    changes
}

fn apply_slots<K: Ord + Copy>(
    target: &mut BTreeMap<K, ItemStack>,
    changes: &BTreeMap<K, FieldChange<ItemStack>>,
) {
    for (key, change) in changes {
        match change {
            FieldChange::Set(stack) => {
                target.insert(*key, stack.clone());
            }
            FieldChange::Cleared => {
                target.remove(key);
            }
        }
    }
}
