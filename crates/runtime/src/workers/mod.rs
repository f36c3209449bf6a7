//! Worker tasks that back the sync engine.
//!
//! The sync worker owns all group state and runs remote operations as
//! spawned tasks; the listener turns the notification stream into commands.

mod group;
mod listener;
mod sync;
mod tasks;

pub(crate) use listener::NotificationListener;
pub(crate) use sync::{Command, SyncWorker};
pub(crate) use tasks::TaskContext;
