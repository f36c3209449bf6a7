//! Shared fixtures: several engines over one in-memory backend behave like
//! separate servers sharing one store.
#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use inventory_core::{
    InventorySnapshot, ItemStack, PlayerId, SyncGroupKey, VersionedState, WriterId, encode_state,
};
use sync_runtime::remote::{CasOutcome, Sleeper, TokioSleeper};
use sync_runtime::{
    ChangeCause, ChangeEvent, MemoryChannel, MemoryInventories, MemoryStore, PublishOutcome,
    RemoteError, StateStore, StaticTeams, StoredRecord, SyncConfig, SyncEngine, SyncEvent,
    SyncHandle,
};
use tokio::sync::broadcast;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn stack(id: &str) -> ItemStack {
    ItemStack::new(id, 1)
}

pub fn player(n: u128) -> PlayerId {
    PlayerId::from_u128(n)
}

pub fn config(server: &str) -> SyncConfig {
    SyncConfig {
        server_id: server.to_string(),
        retry_limit: 5,
        backoff_base_ms: 1,
        backoff_max_ms: 5,
        ..SyncConfig::default()
    }
}

/// One simulated server process.
pub struct Node {
    pub engine: SyncEngine,
    pub handle: SyncHandle,
    pub host: MemoryInventories,
    pub teams: StaticTeams,
}

impl Node {
    pub async fn start(config: SyncConfig, store: &MemoryStore, channel: &MemoryChannel) -> Self {
        Self::start_with(config, store.clone(), channel, TokioSleeper).await
    }

    pub async fn start_with(
        config: SyncConfig,
        store: impl StateStore + 'static,
        channel: &MemoryChannel,
        sleeper: impl Sleeper + 'static,
    ) -> Self {
        let host = MemoryInventories::new();
        let teams = StaticTeams::new();
        let engine = SyncEngine::builder()
            .config(config)
            .store(store)
            .channel(channel.clone())
            .host(Arc::new(host.clone()))
            .teams(Arc::new(teams.clone()))
            .sleeper(sleeper)
            .build()
            .await
            .expect("engine should start");
        let handle = engine.handle();
        Self {
            engine,
            handle,
            host,
            teams,
        }
    }

    /// Mutates the player's inventory, reports it, and waits for the publish.
    pub async fn edit(
        &self,
        player: PlayerId,
        cause: ChangeCause,
        mutate: impl FnOnce(&mut InventorySnapshot),
    ) -> PublishOutcome {
        self.host.edit(player, cause, mutate);
        self.handle
            .local_change(ChangeEvent::new(player, cause))
            .await
            .expect("publish should succeed")
    }

    pub async fn stop(self) {
        self.engine.shutdown().await.expect("clean shutdown");
    }
}

/// Polls `check` until it holds or the wait budget runs out.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Waits for the first event matching `pred`.
pub async fn wait_event(
    events: &mut broadcast::Receiver<SyncEvent>,
    pred: impl Fn(&SyncEvent) -> bool,
) -> SyncEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event stream closed"),
            }
        }
    })
    .await
    .expect("event not received in time")
}

pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(WAIT, fut)
        .await
        .expect("operation timed out")
}

/// Writes a state straight into the store, as another server would have.
pub fn seed(store: &MemoryStore, key: &SyncGroupKey, version: u64, snapshot: InventorySnapshot) {
    let state = VersionedState::new(key.clone(), snapshot, version, WriterId::new("seed"), 0);
    store.put(key.clone(), StoredRecord::new(version, encode_state(&state)));
}

/// Decoded snapshot currently stored for `key`.
pub fn stored(store: &MemoryStore, key: &SyncGroupKey) -> Option<InventorySnapshot> {
    let record = store.record(key)?;
    Some(
        inventory_core::decode_state(&record.payload)
            .expect("stored state decodes")
            .snapshot,
    )
}

/// Store wrapper that fails the next `n` calls with a connection error.
#[derive(Clone)]
pub struct FlakyStore {
    inner: MemoryStore,
    failures: Arc<AtomicU32>,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            failures: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    fn injected(&self) -> Result<(), RemoteError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining == 0 {
            return Ok(());
        }
        self.failures.store(remaining - 1, Ordering::SeqCst);
        Err(RemoteError::Connection("injected failure".into()))
    }
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn fetch(&self, key: &SyncGroupKey) -> Result<Option<StoredRecord>, RemoteError> {
        self.injected()?;
        self.inner.fetch(key).await
    }

    async fn compare_and_set(
        &self,
        key: &SyncGroupKey,
        expected_version: u64,
        record: StoredRecord,
    ) -> Result<CasOutcome, RemoteError> {
        self.injected()?;
        self.inner.compare_and_set(key, expected_version, record).await
    }
}

/// Store wrapper whose calls hang while stalled, like a remote that stopped
/// answering.
#[derive(Clone)]
pub struct StallingStore {
    inner: MemoryStore,
    stalled: Arc<AtomicBool>,
    hung: Arc<AtomicU32>,
}

impl StallingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            stalled: Arc::new(AtomicBool::new(false)),
            hung: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn stall(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    /// Calls that have hung so far.
    pub fn hung_calls(&self) -> u32 {
        self.hung.load(Ordering::SeqCst)
    }

    async fn gate(&self) {
        if self.stalled.load(Ordering::SeqCst) {
            self.hung.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl StateStore for StallingStore {
    async fn fetch(&self, key: &SyncGroupKey) -> Result<Option<StoredRecord>, RemoteError> {
        self.gate().await;
        self.inner.fetch(key).await
    }

    async fn compare_and_set(
        &self,
        key: &SyncGroupKey,
        expected_version: u64,
        record: StoredRecord,
    ) -> Result<CasOutcome, RemoteError> {
        self.gate().await;
        self.inner.compare_and_set(key, expected_version, record).await
    }
}

/// Store wrapper where, while contended, another writer commits right before
/// every compare-and-set, so each one loses.
#[derive(Clone)]
pub struct ContendedStore {
    inner: MemoryStore,
    contended: Arc<AtomicBool>,
}

impl ContendedStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            contended: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn contend(&self, contended: bool) {
        self.contended.store(contended, Ordering::SeqCst);
    }
}

#[async_trait]
impl StateStore for ContendedStore {
    async fn fetch(&self, key: &SyncGroupKey) -> Result<Option<StoredRecord>, RemoteError> {
        self.inner.fetch(key).await
    }

    async fn compare_and_set(
        &self,
        key: &SyncGroupKey,
        expected_version: u64,
        record: StoredRecord,
    ) -> Result<CasOutcome, RemoteError> {
        if self.contended.load(Ordering::SeqCst) {
            let next = self.inner.version(key) + 1;
            let rival = InventorySnapshot::new().with_currency(next as i64);
            let state = VersionedState::new(key.clone(), rival, next, WriterId::new("rival"), 0);
            self.inner
                .put(key.clone(), StoredRecord::new(next, encode_state(&state)));
        }
        self.inner.compare_and_set(key, expected_version, record).await
    }
}

/// Sleeper that records requested delays and returns immediately.
#[derive(Clone, Default)]
pub struct RecordingSleeper {
    pub delays: Arc<Mutex<Vec<Duration>>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, delay: Duration) {
        self.delays.lock().unwrap().push(delay);
        tokio::task::yield_now().await;
    }
}
