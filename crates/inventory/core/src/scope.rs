//! Which snapshot sections take part in synchronization.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::snapshot::{EquipmentSlot, InventorySnapshot};

bitflags! {
    /// Set of synchronized snapshot sections.
    ///
    /// Sections outside the set are stripped before publishing and left
    /// untouched when a remote state is applied.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct SyncSections: u8 {
        const MAIN        = 1 << 0;
        const ARMOR       = 1 << 1;
        const OFFHAND     = 1 << 2;
        const ENDER_CHEST = 1 << 3;
        const CURSOR      = 1 << 4;
        const EXPERIENCE  = 1 << 5;
        const CURRENCY    = 1 << 6;
    }
}

impl Default for SyncSections {
    fn default() -> Self {
        Self::MAIN | Self::ARMOR | Self::OFFHAND | Self::ENDER_CHEST
    }
}

impl SyncSections {
    /// Parses a comma separated list such as `main, armor, ender_chest`.
    ///
    /// Names are case-insensitive; `all` selects every section. Returns the
    /// first unknown name on failure.
    pub fn parse_list(list: &str) -> Result<Self, String> {
        let mut sections = Self::empty();
        for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let upper = name.to_ascii_uppercase();
            if upper == "ALL" {
                sections |= Self::all();
                continue;
            }
            match Self::from_name(&upper) {
                Some(flag) => sections |= flag,
                None => return Err(name.to_string()),
            }
        }
        Ok(sections)
    }

    fn covers(self, slot: EquipmentSlot) -> bool {
        if slot.is_armor() {
            self.contains(Self::ARMOR)
        } else {
            self.contains(Self::OFFHAND)
        }
    }

    /// Keeps only the synchronized sections of `snapshot`.
    ///
    /// Unknown extension fields always travel: they belong to whichever
    /// writer understood them.
    pub fn retain(self, snapshot: &InventorySnapshot) -> InventorySnapshot {
        InventorySnapshot {
            main: if self.contains(Self::MAIN) {
                snapshot.main.clone()
            } else {
                Default::default()
            },
            equipment: snapshot
                .equipment
                .iter()
                .filter(|(slot, _)| self.covers(**slot))
                .map(|(slot, stack)| (*slot, stack.clone()))
                .collect(),
            ender_chest: if self.contains(Self::ENDER_CHEST) {
                snapshot.ender_chest.clone()
            } else {
                Default::default()
            },
            cursor: snapshot
                .cursor
                .clone()
                .filter(|_| self.contains(Self::CURSOR)),
            experience: snapshot.experience.filter(|_| self.contains(Self::EXPERIENCE)),
            currency: snapshot.currency.filter(|_| self.contains(Self::CURRENCY)),
            extensions: snapshot.extensions.clone(),
        }
    }

    /// Builds what a local inventory should look like after applying
    /// `synced`: synchronized sections come from `synced`, everything else
    /// stays as in `local`.
    pub fn overlay(self, local: &InventorySnapshot, synced: &InventorySnapshot) -> InventorySnapshot {
        let mut result = local.clone();
        if self.contains(Self::MAIN) {
            result.main = synced.main.clone();
        }
        result.equipment.retain(|slot, _| !self.covers(*slot));
        result.equipment.extend(
            synced
                .equipment
                .iter()
                .filter(|(slot, _)| self.covers(**slot))
                .map(|(slot, stack)| (*slot, stack.clone())),
        );
        if self.contains(Self::ENDER_CHEST) {
            result.ender_chest = synced.ender_chest.clone();
        }
        if self.contains(Self::CURSOR) {
            result.cursor = synced.cursor.clone();
        }
        if self.contains(Self::EXPERIENCE) {
            result.experience = synced.experience;
        }
        if self.contains(Self::CURRENCY) {
            result.currency = synced.currency;
        }
        result.extensions = synced.extensions.clone();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Experience, ItemStack};

    fn full_snapshot() -> InventorySnapshot {
        InventorySnapshot::new()
            .with_slot(0, ItemStack::new("minecraft:iron_sword", 1))
            .with_equipment(EquipmentSlot::Chest, ItemStack::new("minecraft:iron_chestplate", 1))
            .with_equipment(EquipmentSlot::OffHand, ItemStack::new("minecraft:shield", 1))
            .with_experience(Experience::new(5, 80, 0.25))
            .with_currency(900)
    }

    #[test]
    fn test_default_sections() {
        let sections = SyncSections::default();
        assert!(sections.contains(SyncSections::MAIN | SyncSections::ENDER_CHEST));
        assert!(!sections.contains(SyncSections::EXPERIENCE));
        assert!(!sections.contains(SyncSections::CURSOR));
    }

    #[test]
    fn test_parse_list() {
        let parsed = SyncSections::parse_list("main, Armor ,experience").unwrap();
        assert_eq!(
            parsed,
            SyncSections::MAIN | SyncSections::ARMOR | SyncSections::EXPERIENCE
        );
        assert_eq!(SyncSections::parse_list("all").unwrap(), SyncSections::all());
        assert_eq!(
            SyncSections::parse_list("main,hotbar").unwrap_err(),
            "hotbar"
        );
    }

    #[test]
    fn test_retain_strips_unsynced_sections() {
        let retained = SyncSections::MAIN.retain(&full_snapshot());
        assert_eq!(retained.main.len(), 1);
        assert!(retained.equipment.is_empty());
        assert!(retained.experience.is_none());
        assert!(retained.currency.is_none());
    }

    #[test]
    fn test_retain_splits_armor_and_offhand() {
        let retained = SyncSections::OFFHAND.retain(&full_snapshot());
        assert!(retained.equipment(EquipmentSlot::OffHand).is_some());
        assert!(retained.equipment(EquipmentSlot::Chest).is_none());
    }

    #[test]
    fn test_overlay_keeps_local_unsynced_sections() {
        let local = full_snapshot();
        let synced = InventorySnapshot::new()
            .with_slot(3, ItemStack::new("minecraft:bread", 5))
            .with_currency(1);

        let result = SyncSections::default().overlay(&local, &synced);

        assert!(result.slot(0).is_none());
        assert_eq!(result.slot(3).map(|s| s.count), Some(5));
        // armor and off-hand are synced, synced side had none
        assert!(result.equipment.is_empty());
        // experience and currency are not synced by default
        assert_eq!(result.experience, local.experience);
        assert_eq!(result.currency, Some(900));
    }
}
