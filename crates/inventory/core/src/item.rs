//! Item and experience value types.
//!
//! An [`ItemStack`] is a self-contained descriptor: two stacks compare equal
//! only when the host would treat them as the same item, so snapshots can be
//! diffed and de-duplicated without consulting the host.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A stack of one item kind, as stored in a single slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemStack {
    /// Namespaced item identifier (e.g. `minecraft:diamond_sword`).
    pub id: String,

    /// Number of items in the stack.
    pub count: u16,

    /// Enchantment identifier to level.
    pub enchantments: BTreeMap<String, u16>,

    /// Custom display name, if renamed.
    pub display_name: Option<String>,

    /// Host-serialized item data (components / NBT) needed for a lossless
    /// round-trip of anything not modelled above.
    pub data: Option<String>,
}

impl ItemStack {
    /// Creates a plain stack without enchantments or metadata.
    pub fn new(id: impl Into<String>, count: u16) -> Self {
        Self {
            id: id.into(),
            count,
            enchantments: BTreeMap::new(),
            display_name: None,
            data: None,
        }
    }

    /// Adds an enchantment, replacing any existing level.
    pub fn with_enchantment(mut self, id: impl Into<String>, level: u16) -> Self {
        self.enchantments.insert(id.into(), level);
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// A zero-count stack carries nothing and is treated as an empty slot.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Player experience state.
///
/// Equality compares `progress` by its bits (any NaN equals any other), so
/// a snapshot always equals itself and its decoded copy.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Experience {
    pub level: u32,
    pub total: u32,
    /// Progress towards the next level in `0.0..1.0`.
    pub progress: f32,
}

impl Experience {
    pub fn new(level: u32, total: u32, progress: f32) -> Self {
        Self {
            level,
            total,
            progress,
        }
    }
}

impl PartialEq for Experience {
    fn eq(&self, other: &Self) -> bool {
        self.level == other.level
            && self.total == other.total
            && (self.progress.to_bits() == other.progress.to_bits()
                || (self.progress.is_nan() && other.progress.is_nan()))
    }
}

impl Eq for Experience {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_metadata() {
        let stack = ItemStack::new("minecraft:diamond_sword", 1)
            .with_enchantment("minecraft:sharpness", 5)
            .with_display_name("Oathkeeper");

        assert_eq!(stack.enchantments.get("minecraft:sharpness"), Some(&5));
        assert_eq!(stack.display_name.as_deref(), Some("Oathkeeper"));
        assert!(stack.data.is_none());
    }

    #[test]
    fn test_metadata_participates_in_equality() {
        let plain = ItemStack::new("minecraft:bow", 1);
        let enchanted = ItemStack::new("minecraft:bow", 1).with_enchantment("minecraft:power", 1);
        assert_ne!(plain, enchanted);
    }

    #[test]
    fn test_nan_progress_equals_itself() {
        let broken = Experience::new(3, 40, f32::NAN);
        assert_eq!(broken, broken);
        assert_eq!(broken, Experience::new(3, 40, -f32::NAN));
        assert_ne!(broken, Experience::new(3, 40, 0.5));
        assert_ne!(Experience::new(1, 7, 0.5), Experience::new(2, 7, 0.5));
    }

    #[test]
    fn test_zero_count_is_empty() {
        assert!(ItemStack::new("minecraft:stone", 0).is_empty());
        assert!(!ItemStack::new("minecraft:stone", 1).is_empty());
    }
}
