//! Remote operations run off the worker's main sequence.
//!
//! Each function here is the body of one spawned task. Tasks never touch
//! group state; they report back through a [`Completion`] tagged with the
//! operation id they were started with.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use inventory_core::{
    DecodeError, InventorySnapshot, SnapshotDelta, SyncGroupKey, VersionedState, WriterId,
    decode_state, encode_state,
};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::api::{RemoteError, SyncError};
use crate::events::SyncEvent;
use crate::remote::{
    Backoff, CasOutcome, Notification, NotificationChannel, Sleeper, StateStore, StoredRecord,
};

/// Everything a remote task needs; shared by all tasks of one engine.
pub(crate) struct TaskContext {
    pub store: Arc<dyn StateStore>,
    pub channel: Arc<dyn NotificationChannel>,
    pub sleeper: Arc<dyn Sleeper>,
    pub writer: WriterId,
    pub retry_limit: u32,
    pub remote_timeout: Duration,
    pub backoff: Backoff,
    pub events: broadcast::Sender<SyncEvent>,
}

impl TaskContext {
    async fn timed<T>(
        &self,
        call: impl Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, RemoteError> {
        match tokio::time::timeout(self.remote_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(self.remote_timeout)),
        }
    }

    /// Runs `call` under the remote timeout, retrying failures with backoff
    /// up to `retry_limit` times.
    async fn with_retry<T, F, Fut>(
        &self,
        op: &'static str,
        key: &SyncGroupKey,
        mut call: F,
    ) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut attempt = 0;
        loop {
            match self.timed(call()).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.retry_limit => {
                    let delay = self.backoff.delay(attempt);
                    warn!(
                        target: "sync::remote",
                        %key,
                        op,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "remote call failed, retrying"
                    );
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub fn emit(&self, event: SyncEvent) {
        let _ = self.events.send(event);
    }
}

/// Result of a remote task, marshaled back onto the worker.
pub(crate) enum Completion {
    Baseline {
        key: SyncGroupKey,
        op: u64,
        result: Result<Option<VersionedState>, FetchFailure>,
    },
    Fetched {
        key: SyncGroupKey,
        op: u64,
        result: Result<Option<VersionedState>, FetchFailure>,
    },
    Published {
        key: SyncGroupKey,
        op: u64,
        result: Result<Committed, PublishFailure>,
    },
}

#[derive(Clone, Debug)]
pub(crate) enum FetchFailure {
    Remote(RemoteError),
    Decode { version: u64, error: DecodeError },
}

/// A publish that ended with the group at `version` holding `state`.
#[derive(Clone, Debug)]
pub(crate) struct Committed {
    pub version: u64,
    pub state: InventorySnapshot,
    pub conflicts: u32,
    /// False when the rebased change turned out to be already stored and
    /// nothing was written.
    pub wrote: bool,
}

#[derive(Clone, Debug)]
pub(crate) enum PublishFailure {
    Remote(RemoteError),
    Exhausted { attempts: u32 },
    Decode(DecodeError),
}

impl PublishFailure {
    pub fn to_error(&self, key: &SyncGroupKey) -> SyncError {
        match self {
            Self::Remote(err) => SyncError::RemoteUnavailable(err.clone()),
            Self::Exhausted { attempts } => SyncError::ConflictRetryExhausted {
                key: key.clone(),
                attempts: *attempts,
            },
            Self::Decode(err) => SyncError::Decode(err.clone()),
        }
    }
}

impl std::fmt::Display for PublishFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote(err) => write!(f, "{err}"),
            Self::Exhausted { attempts } => write!(f, "conflict retries exhausted after {attempts}"),
            Self::Decode(err) => write!(f, "stored state unreadable: {err}"),
        }
    }
}

/// Fetches and decodes the stored state for `key`.
pub(crate) async fn fetch(
    ctx: &TaskContext,
    key: &SyncGroupKey,
) -> Result<Option<VersionedState>, FetchFailure> {
    let record = ctx
        .with_retry("fetch", key, || ctx.store.fetch(key))
        .await
        .map_err(FetchFailure::Remote)?;

    let Some(record) = record else {
        return Ok(None);
    };

    let mut state = decode_state(&record.payload).map_err(|error| FetchFailure::Decode {
        version: record.version,
        error,
    })?;
    // The store's version is authoritative over whatever the payload claims.
    state.version = record.version;
    Ok(Some(state))
}

/// Writes `candidate` as the successor of `base_version`.
///
/// On a version conflict the change (`candidate` relative to `base`) is
/// replayed on top of the newer stored state and the write is retried, at
/// most `retry_limit` times. A conflict whose stored state is exactly our
/// own candidate means an earlier attempt did commit (its reply was lost),
/// and is treated as success.
///
/// Versions never go backwards: if the record has vanished (expired or
/// deleted), the write expects "no record" but still takes the version after
/// the highest one seen.
pub(crate) async fn publish(
    ctx: &TaskContext,
    key: &SyncGroupKey,
    base_version: u64,
    base: &InventorySnapshot,
    candidate: InventorySnapshot,
) -> Result<Committed, PublishFailure> {
    let delta = SnapshotDelta::between(base, &candidate);
    let mut expected = base_version;
    let mut highest = base_version;
    let mut candidate = candidate;
    let mut conflicts = 0u32;

    loop {
        let version = expected.max(highest) + 1;
        let state = VersionedState::new(
            key.clone(),
            candidate.clone(),
            version,
            ctx.writer.clone(),
            chrono::Utc::now().timestamp_millis(),
        );
        let record = StoredRecord::new(version, encode_state(&state));

        let outcome = ctx
            .with_retry("compare_and_set", key, || {
                ctx.store.compare_and_set(key, expected, record.clone())
            })
            .await
            .map_err(PublishFailure::Remote)?;

        let current_version = match outcome {
            CasOutcome::Committed => {
                announce(ctx, Notification::new(key.clone(), version, ctx.writer.clone())).await;
                return Ok(Committed {
                    version,
                    state: candidate,
                    conflicts,
                    wrote: true,
                });
            }
            CasOutcome::Conflict { current_version } => current_version,
        };
        highest = highest.max(current_version);

        let latest = fetch(ctx, key).await.map_err(|failure| match failure {
            FetchFailure::Remote(err) => PublishFailure::Remote(err),
            FetchFailure::Decode { error, .. } => PublishFailure::Decode(error),
        })?;

        let Some(latest) = latest else {
            // The record vanished (expired or deleted): write from scratch.
            debug!(
                target: "sync::worker",
                %key,
                next = highest + 1,
                "stored state missing after conflict"
            );
            expected = 0;
            continue;
        };

        if latest.version == version && latest.writer == ctx.writer && latest.snapshot == candidate
        {
            debug!(target: "sync::worker", %key, version, "ambiguous write had committed");
            announce(ctx, Notification::new(key.clone(), version, ctx.writer.clone())).await;
            return Ok(Committed {
                version,
                state: candidate,
                conflicts,
                wrote: true,
            });
        }

        conflicts += 1;
        if conflicts > ctx.retry_limit {
            return Err(PublishFailure::Exhausted {
                attempts: conflicts,
            });
        }

        debug!(
            target: "sync::worker",
            %key,
            expected,
            current_version,
            stored = latest.version,
            attempt = conflicts,
            "version conflict, rebasing"
        );
        ctx.emit(SyncEvent::ConflictRetried {
            key: key.clone(),
            attempt: conflicts,
            current_version: latest.version,
        });

        candidate = delta.apply_to(&latest.snapshot);
        expected = latest.version;
        highest = highest.max(latest.version);

        if candidate == latest.snapshot {
            // Our change is already part of the stored state.
            return Ok(Committed {
                version: latest.version,
                state: latest.snapshot,
                conflicts,
                wrote: false,
            });
        }
    }
}

/// Broadcasts a committed version. Failures are logged, never surfaced: the
/// store already holds the state and peers catch up on the next notification
/// or rejoin.
async fn announce(ctx: &TaskContext, notification: Notification) {
    let key = notification.key.clone();
    if let Err(err) = ctx
        .with_retry("notify", &key, || ctx.channel.publish(&notification))
        .await
    {
        warn!(
            target: "sync::remote",
            %key,
            version = notification.version,
            error = %err,
            "notification not delivered"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryChannel, MemoryStore, TokioSleeper};
    use inventory_core::ItemStack;

    fn context(store: MemoryStore, retry_limit: u32) -> TaskContext {
        TaskContext {
            store: Arc::new(store),
            channel: Arc::new(MemoryChannel::new()),
            sleeper: Arc::new(TokioSleeper),
            writer: WriterId::new("alpha"),
            retry_limit,
            remote_timeout: Duration::from_secs(1),
            backoff: Backoff::new(Duration::from_millis(1), Duration::from_millis(1)),
            events: broadcast::channel(16).0,
        }
    }

    fn seed(store: &MemoryStore, key: &SyncGroupKey, version: u64, snapshot: InventorySnapshot) {
        let state = VersionedState::new(key.clone(), snapshot, version, WriterId::new("beta"), 0);
        store.put(key.clone(), StoredRecord::new(version, encode_state(&state)));
    }

    fn stack(id: &str) -> ItemStack {
        ItemStack::new(id, 1)
    }

    #[tokio::test]
    async fn test_publish_commits_next_version() {
        let store = MemoryStore::new();
        let ctx = context(store.clone(), 3);
        let key = SyncGroupKey::global();
        let candidate = InventorySnapshot::new().with_slot(0, stack("minecraft:sword"));

        let committed = publish(&ctx, &key, 0, &InventorySnapshot::new(), candidate.clone())
            .await
            .unwrap();

        assert_eq!(committed.version, 1);
        assert_eq!(committed.conflicts, 0);
        let stored = fetch(&ctx, &key).await.unwrap().unwrap();
        assert_eq!(stored.snapshot, candidate);
        assert_eq!(stored.writer, WriterId::new("alpha"));
    }

    #[tokio::test]
    async fn test_publish_rebases_on_conflict() {
        let store = MemoryStore::new();
        let ctx = context(store.clone(), 3);
        let key = SyncGroupKey::global();
        let base = InventorySnapshot::new().with_slot(0, stack("minecraft:sword"));
        seed(&store, &key, 1, base.clone());
        // someone else added an apple at version 2
        seed(&store, &key, 2, base.clone().with_slot(5, stack("minecraft:apple")));

        let mut ours = base.clone();
        ours.clear_slot(0);
        let committed = publish(&ctx, &key, 1, &base, ours).await.unwrap();

        assert_eq!(committed.version, 3);
        assert_eq!(committed.conflicts, 1);
        assert!(committed.state.slot(0).is_none());
        assert!(committed.state.slot(5).is_some());
    }

    #[tokio::test]
    async fn test_publish_gives_up_after_retry_limit() {
        let store = MemoryStore::new();
        let ctx = context(store.clone(), 0);
        let key = SyncGroupKey::global();
        seed(&store, &key, 4, InventorySnapshot::new());

        let result = publish(
            &ctx,
            &key,
            1,
            &InventorySnapshot::new(),
            InventorySnapshot::new().with_currency(5),
        )
        .await;

        assert!(matches!(result, Err(PublishFailure::Exhausted { attempts: 1 })));
    }

    #[tokio::test]
    async fn test_publish_detects_own_committed_write() {
        let store = MemoryStore::new();
        let ctx = context(store.clone(), 3);
        let key = SyncGroupKey::global();
        let candidate = InventorySnapshot::new().with_currency(77);
        let state = VersionedState::new(key.clone(), candidate.clone(), 1, ctx.writer.clone(), 0);
        store.put(key.clone(), StoredRecord::new(1, encode_state(&state)));

        let committed = publish(&ctx, &key, 0, &InventorySnapshot::new(), candidate)
            .await
            .unwrap();

        assert_eq!(committed.version, 1);
        assert_eq!(committed.conflicts, 0);
        assert_eq!(store.version(&key), 1);
    }

    #[tokio::test]
    async fn test_publish_after_expiry_keeps_version_increasing() {
        let store = MemoryStore::new();
        let ctx = context(store.clone(), 3);
        let key = SyncGroupKey::global();
        // The group was at version 3 when its record expired.
        let base = InventorySnapshot::new().with_slot(0, stack("minecraft:sword"));
        let candidate = base.clone().with_slot(9, stack("minecraft:lantern"));

        let committed = publish(&ctx, &key, 3, &base, candidate.clone())
            .await
            .unwrap();

        assert_eq!(committed.version, 4);
        assert_eq!(store.version(&key), 4);
        let stored = fetch(&ctx, &key).await.unwrap().unwrap();
        assert_eq!(stored.snapshot, candidate);
    }

    #[tokio::test]
    async fn test_fetch_reports_undecodable_state() {
        let store = MemoryStore::new();
        let ctx = context(store.clone(), 0);
        let key = SyncGroupKey::global();
        store.put(key.clone(), StoredRecord::new(3, b"garbage!".to_vec()));

        let result = fetch(&ctx, &key).await;
        assert!(matches!(result, Err(FetchFailure::Decode { version: 3, .. })));
    }
}
