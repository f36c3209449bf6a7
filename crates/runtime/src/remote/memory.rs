//! In-process store and channel.
//!
//! Cloning either type yields another handle to the same shared state, so
//! several engines in one process (or one test) behave like separate servers
//! talking to one remote backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use inventory_core::SyncGroupKey;
use tokio::sync::{broadcast, mpsc};

use super::traits::{
    CasOutcome, Notification, NotificationChannel, StateStore, StoredRecord, Subscription,
};
use crate::api::RemoteError;

const CHANNEL_CAPACITY: usize = 1024;

/// [`StateStore`] backed by a shared map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<SyncGroupKey, StoredRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stored version, `0` when absent.
    pub fn version(&self, key: &SyncGroupKey) -> u64 {
        self.lock().get(key).map_or(0, |record| record.version)
    }

    pub fn record(&self, key: &SyncGroupKey) -> Option<StoredRecord> {
        self.lock().get(key).cloned()
    }

    /// Overwrites a record unconditionally (for seeding fixtures).
    pub fn put(&self, key: SyncGroupKey, record: StoredRecord) {
        self.lock().insert(key, record);
    }

    /// Drops a record, as a key expiry on the remote would.
    pub fn evict(&self, key: &SyncGroupKey) -> Option<StoredRecord> {
        self.lock().remove(key)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SyncGroupKey, StoredRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn fetch(&self, key: &SyncGroupKey) -> Result<Option<StoredRecord>, RemoteError> {
        Ok(self.record(key))
    }

    async fn compare_and_set(
        &self,
        key: &SyncGroupKey,
        expected_version: u64,
        record: StoredRecord,
    ) -> Result<CasOutcome, RemoteError> {
        let mut records = self.lock();
        let current_version = records.get(key).map_or(0, |r| r.version);
        if current_version != expected_version {
            return Ok(CasOutcome::Conflict { current_version });
        }
        records.insert(key.clone(), record);
        Ok(CasOutcome::Committed)
    }
}

/// [`NotificationChannel`] backed by a tokio broadcast channel.
#[derive(Clone)]
pub struct MemoryChannel {
    sender: Arc<Mutex<broadcast::Sender<Notification>>>,
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self {
            sender: Arc::new(Mutex::new(broadcast::channel(CHANNEL_CAPACITY).0)),
        }
    }
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ends every live subscription, as a dropped connection would.
    pub fn drop_subscriptions(&self) {
        *self.sender() = broadcast::channel(CHANNEL_CAPACITY).0;
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender().receiver_count()
    }

    fn sender(&self) -> std::sync::MutexGuard<'_, broadcast::Sender<Notification>> {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl NotificationChannel for MemoryChannel {
    async fn publish(&self, notification: &Notification) -> Result<(), RemoteError> {
        // No subscribers is not an error: nobody else is listening yet.
        let _ = self.sender().send(notification.clone());
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription, RemoteError> {
        let mut source = self.sender().subscribe();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(notification) => {
                        if tx.send(notification).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            target: "sync::remote",
                            skipped,
                            "memory subscription lagged"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inventory_core::WriterId;

    fn key() -> SyncGroupKey {
        SyncGroupKey::from_raw("team:blue")
    }

    #[tokio::test]
    async fn test_cas_commits_only_on_expected_version() {
        let store = MemoryStore::new();

        let first = store
            .compare_and_set(&key(), 0, StoredRecord::new(1, vec![1]))
            .await
            .unwrap();
        assert_eq!(first, CasOutcome::Committed);

        let stale = store
            .compare_and_set(&key(), 0, StoredRecord::new(1, vec![2]))
            .await
            .unwrap();
        assert_eq!(stale, CasOutcome::Conflict { current_version: 1 });

        let record = store.fetch(&key()).await.unwrap().unwrap();
        assert_eq!(record.payload, vec![1]);
    }

    #[tokio::test]
    async fn test_clones_share_records() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.put(key(), StoredRecord::new(4, vec![]));
        assert_eq!(other.version(&key()), 4);
        assert_eq!(other.version(&SyncGroupKey::global()), 0);
    }

    #[tokio::test]
    async fn test_evicted_record_reads_as_absent() {
        let store = MemoryStore::new();
        store.put(key(), StoredRecord::new(7, vec![9]));

        assert_eq!(store.evict(&key()).map(|r| r.version), Some(7));
        assert_eq!(store.fetch(&key()).await.unwrap(), None);
        assert_eq!(store.version(&key()), 0);
    }

    #[tokio::test]
    async fn test_channel_delivers_to_every_subscriber() {
        let channel = MemoryChannel::new();
        let mut a = channel.subscribe().await.unwrap();
        let mut b = channel.subscribe().await.unwrap();

        let note = Notification::new(key(), 3, WriterId::new("hub"));
        channel.publish(&note).await.unwrap();

        assert_eq!(a.next().await, Some(note.clone()));
        assert_eq!(b.next().await, Some(note));
    }

    #[tokio::test]
    async fn test_drop_subscriptions_ends_streams() {
        let channel = MemoryChannel::new();
        let mut subscription = channel.subscribe().await.unwrap();

        channel.drop_subscriptions();

        assert_eq!(subscription.next().await, None);
    }
}
