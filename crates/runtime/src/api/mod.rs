//! Public engine API surface.
//!
//! Gathers the types consumers of the sync runtime interact with, so the
//! worker and remote layers can stay internal.

pub mod errors;
pub mod handle;
pub mod hooks;
pub mod outcomes;

pub use errors::{RemoteError, Result, SyncError};
pub use handle::SyncHandle;
pub use hooks::SyncHooks;
pub use outcomes::{GroupStatus, JoinOutcome, NotificationOutcome, PublishOutcome, SwitchOutcome};
