//! Inventory data model and snapshot codec shared across sync processes.
//!
//! `inventory-core` defines what a synchronized inventory looks like
//! ([`InventorySnapshot`]), how groups and versions are identified
//! ([`SyncGroupKey`], [`VersionedState`]), and how snapshots travel over the
//! wire ([`codec`]). Everything here is pure: the runtime crate owns I/O,
//! scheduling, and conflict handling, and builds on the types re-exported
//! below.
pub mod codec;
pub mod delta;
pub mod group;
pub mod item;
pub mod scope;
pub mod snapshot;

pub use codec::{DecodeError, decode, decode_state, encode, encode_state};
pub use delta::{FieldChange, SnapshotDelta};
pub use group::{PlayerId, SyncGroupKey, TeamId, VersionedState, WriterId};
pub use item::{Experience, ItemStack};
pub use scope::SyncSections;
pub use snapshot::{EquipmentSlot, InventorySnapshot};
