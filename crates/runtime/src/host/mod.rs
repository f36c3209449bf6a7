//! Interfaces the engine consumes from the host game.
//!
//! The host owns the live inventories and the team roster; the engine only
//! reads and writes them through these traits. Calls are synchronous and
//! made from the engine's main sequence, so an implementation must not block
//! for long.

mod memory;

use std::collections::BTreeSet;

use inventory_core::{InventorySnapshot, PlayerId, TeamId};

pub use memory::{MemoryInventories, StaticTeams};

/// Live inventories of players connected to this process.
pub trait InventoryHost: Send + Sync {
    /// Full current inventory, or `None` when the player is not present.
    fn capture_snapshot(&self, player: PlayerId) -> Option<InventorySnapshot>;

    /// Replaces the player's inventory with `snapshot`.
    fn apply_snapshot(&self, player: PlayerId, snapshot: &InventorySnapshot);
}

/// Team membership as seen by an external directory service.
pub trait TeamDirectory: Send + Sync {
    fn team_of(&self, player: PlayerId) -> Option<TeamId>;

    fn team_members(&self, team: &TeamId) -> BTreeSet<PlayerId>;
}
