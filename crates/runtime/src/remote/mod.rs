//! Remote layer: the shared state store and the notification channel.
//!
//! Both are reached only from spawned tasks, never from the worker's main
//! sequence. The in-memory backends are always compiled; the Redis backend
//! sits behind the `redis` feature.

mod memory;
#[cfg(feature = "redis")]
mod redis;
mod retry;
mod traits;

pub use memory::{MemoryChannel, MemoryStore};
#[cfg(feature = "redis")]
pub use self::redis::{RedisChannel, RedisStore};
pub use retry::{Backoff, Sleeper, TokioSleeper};
pub use traits::{CasOutcome, Notification, NotificationChannel, StateStore, StoredRecord, Subscription};
