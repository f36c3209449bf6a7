//! Point-in-time capture of a player's synchronized inventory.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoStaticStr};

use crate::item::{Experience, ItemStack};

/// Equipment slots outside the main grid.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum EquipmentSlot {
    Head,
    Chest,
    Legs,
    Feet,
    OffHand,
}

impl EquipmentSlot {
    /// Armor slots, in the order the host lists them.
    pub const ARMOR: [EquipmentSlot; 4] = [Self::Head, Self::Chest, Self::Legs, Self::Feet];

    pub fn is_armor(self) -> bool {
        !matches!(self, Self::OffHand)
    }
}

/// Complete synchronized state of one inventory.
///
/// Slot maps are keyed by slot index, so indices are unique by construction
/// and iterate in ascending order. Empty stacks are never stored: writing a
/// zero-count stack clears the slot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InventorySnapshot {
    pub main: BTreeMap<u16, ItemStack>,
    pub equipment: BTreeMap<EquipmentSlot, ItemStack>,
    pub ender_chest: BTreeMap<u16, ItemStack>,
    pub cursor: Option<ItemStack>,
    pub experience: Option<Experience>,
    /// Economy balance in minor units.
    pub currency: Option<i64>,
    /// Fields written by newer codec versions, preserved verbatim by tag.
    pub extensions: BTreeMap<u16, Vec<u8>>,
}

impl InventorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style variant of [`Self::set_slot`].
    pub fn with_slot(mut self, slot: u16, stack: ItemStack) -> Self {
        self.set_slot(slot, stack);
        self
    }

    /// Builder-style variant of [`Self::set_equipment`].
    pub fn with_equipment(mut self, slot: EquipmentSlot, stack: ItemStack) -> Self {
        self.set_equipment(slot, stack);
        self
    }

    pub fn with_experience(mut self, experience: Experience) -> Self {
        self.experience = Some(experience);
        self
    }

    pub fn with_currency(mut self, amount: i64) -> Self {
        self.currency = Some(amount);
        self
    }

    pub fn slot(&self, slot: u16) -> Option<&ItemStack> {
        self.main.get(&slot)
    }

    /// Writes a main inventory slot, returning the previous stack.
    pub fn set_slot(&mut self, slot: u16, stack: ItemStack) -> Option<ItemStack> {
        put(&mut self.main, slot, stack)
    }

    pub fn clear_slot(&mut self, slot: u16) -> Option<ItemStack> {
        self.main.remove(&slot)
    }

    pub fn equipment(&self, slot: EquipmentSlot) -> Option<&ItemStack> {
        self.equipment.get(&slot)
    }

    pub fn set_equipment(&mut self, slot: EquipmentSlot, stack: ItemStack) -> Option<ItemStack> {
        put(&mut self.equipment, slot, stack)
    }

    pub fn set_ender_slot(&mut self, slot: u16, stack: ItemStack) -> Option<ItemStack> {
        put(&mut self.ender_chest, slot, stack)
    }

    /// True when no section carries any data.
    pub fn is_empty(&self) -> bool {
        self.main.is_empty()
            && self.equipment.is_empty()
            && self.ender_chest.is_empty()
            && self.cursor.is_none()
            && self.experience.is_none()
            && self.currency.is_none()
            && self.extensions.is_empty()
    }

    /// Clears every item section (what a shared death does to a group).
    /// Experience and currency are left alone.
    pub fn clear_items(&mut self) {
        self.main.clear();
        self.equipment.clear();
        self.ender_chest.clear();
        self.cursor = None;
    }
}

fn put<K: Ord>(map: &mut BTreeMap<K, ItemStack>, key: K, stack: ItemStack) -> Option<ItemStack> {
    if stack.is_empty() {
        map.remove(&key)
    } else {
        map.insert(key, stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_slot_replaces_and_returns_previous() {
        let mut snapshot = InventorySnapshot::new();
        assert!(
            snapshot
                .set_slot(0, ItemStack::new("minecraft:stone", 64))
                .is_none()
        );

        let previous = snapshot.set_slot(0, ItemStack::new("minecraft:dirt", 3));
        assert_eq!(previous.map(|s| s.id), Some("minecraft:stone".to_string()));
        assert_eq!(snapshot.slot(0).map(|s| s.count), Some(3));
    }

    #[test]
    fn test_zero_count_clears_slot() {
        let mut snapshot = InventorySnapshot::new().with_slot(4, ItemStack::new("minecraft:apple", 2));
        snapshot.set_slot(4, ItemStack::new("minecraft:apple", 0));
        assert!(snapshot.slot(4).is_none());
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_main_slots_iterate_in_order() {
        let snapshot = InventorySnapshot::new()
            .with_slot(9, ItemStack::new("b", 1))
            .with_slot(2, ItemStack::new("a", 1))
            .with_slot(35, ItemStack::new("c", 1));

        let order: Vec<u16> = snapshot.main.keys().copied().collect();
        assert_eq!(order, vec![2, 9, 35]);
    }

    #[test]
    fn test_clear_items_keeps_experience() {
        let mut snapshot = InventorySnapshot::new()
            .with_slot(0, ItemStack::new("minecraft:torch", 16))
            .with_equipment(EquipmentSlot::Head, ItemStack::new("minecraft:iron_helmet", 1))
            .with_experience(Experience::new(12, 300, 0.5))
            .with_currency(1250);

        snapshot.clear_items();

        assert!(snapshot.main.is_empty() && snapshot.equipment.is_empty());
        assert!(snapshot.experience.is_some());
        assert_eq!(snapshot.currency, Some(1250));
    }

    #[test]
    fn test_armor_slots() {
        assert!(EquipmentSlot::ARMOR.iter().all(|slot| slot.is_armor()));
        assert!(!EquipmentSlot::OffHand.is_armor());
        let name: &'static str = EquipmentSlot::OffHand.into();
        assert_eq!(name, "off_hand");
    }
}
