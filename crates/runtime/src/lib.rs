//! Inventory synchronization engine.
//!
//! Keeps player inventories consistent across server processes through a
//! shared versioned store and a notification channel. Consumers embed
//! [`SyncEngine`] and interact with it through [`SyncHandle`]; the host game
//! plugs in through [`InventoryHost`] and [`TeamDirectory`].
//!
//! Modules are organized by responsibility:
//! - [`engine`] hosts the orchestrator and builder
//! - [`api`] exposes the types downstream clients interact with
//! - [`detector`] filters host change events before they reach the worker
//! - [`remote`] defines the store and channel seams with in-memory and Redis
//!   backends
//! - [`host`] defines what the engine needs from the game
//! - `workers` keeps background tasks internal to the crate
pub mod api;
pub mod config;
pub mod detector;
pub mod engine;
pub mod events;
pub mod host;
pub mod registry;
pub mod remote;
pub mod resolver;

mod workers;

pub use api::{
    GroupStatus, JoinOutcome, NotificationOutcome, PublishOutcome, RemoteError, Result,
    SwitchOutcome, SyncError, SyncHandle, SyncHooks,
};
pub use config::SyncConfig;
pub use detector::{ChangeCause, ChangeDetector, ChangeEvent};
pub use engine::{SyncEngine, SyncEngineBuilder};
pub use events::SyncEvent;
pub use host::{InventoryHost, MemoryInventories, StaticTeams, TeamDirectory};
pub use registry::SyncRegistry;
pub use remote::{
    MemoryChannel, MemoryStore, Notification, NotificationChannel, StateStore, StoredRecord,
};
#[cfg(feature = "redis")]
pub use remote::{RedisChannel, RedisStore};
pub use resolver::{Fallback, GroupResolver, ResolverSettings};
