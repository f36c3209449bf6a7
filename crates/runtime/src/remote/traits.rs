//! Contracts for the shared state store and the notification channel.

use async_trait::async_trait;
use inventory_core::{SyncGroupKey, WriterId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::api::RemoteError;

/// Raw stored value for one group.
///
/// `payload` is an encoded [`inventory_core::VersionedState`]; the version is
/// duplicated outside it so the store can compare without decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredRecord {
    pub version: u64,
    pub payload: Vec<u8>,
}

impl StoredRecord {
    pub fn new(version: u64, payload: Vec<u8>) -> Self {
        Self { version, payload }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CasOutcome {
    /// The record was written.
    Committed,
    /// The stored version did not match; nothing was written.
    Conflict { current_version: u64 },
}

/// Authoritative latest state per group.
///
/// Version `0` stands for "no record". `compare_and_set` must be atomic:
/// two callers expecting the same version can never both commit.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn fetch(&self, key: &SyncGroupKey) -> Result<Option<StoredRecord>, RemoteError>;

    async fn compare_and_set(
        &self,
        key: &SyncGroupKey,
        expected_version: u64,
        record: StoredRecord,
    ) -> Result<CasOutcome, RemoteError>;
}

/// Pointer to a newly committed state. Carries no payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub key: SyncGroupKey,
    pub version: u64,
    pub origin: WriterId,
}

impl Notification {
    pub fn new(key: SyncGroupKey, version: u64, origin: WriterId) -> Self {
        Self {
            key,
            version,
            origin,
        }
    }
}

/// Live stream of notifications for every group.
///
/// Yields `None` once the underlying subscription is lost; callers are
/// expected to subscribe again.
pub struct Subscription {
    rx: mpsc::Receiver<Notification>,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<Notification>) -> Self {
        Self { rx }
    }

    pub async fn next(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }
}

/// Broadcast mechanism for [`Notification`]s.
///
/// Delivery may duplicate or reorder messages; consumers compare versions.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn publish(&self, notification: &Notification) -> Result<(), RemoteError>;

    async fn subscribe(&self) -> Result<Subscription, RemoteError>;
}
