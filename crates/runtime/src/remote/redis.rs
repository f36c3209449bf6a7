//! Redis-backed store and channel.
//!
//! Layout under the configured prefix:
//! - `<prefix>:state:<group>`: hash with `version` and `payload` fields
//! - `<prefix>:notify:<group>`: pub/sub channel carrying JSON notifications
//!
//! Compare-and-set runs as a Lua script so the version check and the write
//! are one atomic step on the server.
//!
//! A store and the channel made from it share one client and one managed
//! connection, which reconnects by itself after the server goes away. Calls
//! made while it is down fail and are retried by the engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use inventory_core::SyncGroupKey;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError, Script};
use tokio::sync::{OnceCell, mpsc};

use super::traits::{
    CasOutcome, Notification, NotificationChannel, StateStore, StoredRecord, Subscription,
};
use crate::api::RemoteError;
use crate::config::SyncConfig;

const CAS_SCRIPT: &str = r"
local current = tonumber(redis.call('HGET', KEYS[1], 'version') or '0')
if current ~= tonumber(ARGV[1]) then
  return {0, current}
end
redis.call('HSET', KEYS[1], 'version', ARGV[2], 'payload', ARGV[3])
local ttl = tonumber(ARGV[4])
if ttl > 0 then
  redis.call('EXPIRE', KEYS[1], ttl)
end
return {1, tonumber(ARGV[2])}
";

const SUBSCRIPTION_BUFFER: usize = 1024;

fn remote(err: RedisError) -> RemoteError {
    if err.is_connection_dropped() || err.is_io_error() || err.is_connection_refusal() {
        RemoteError::Connection(err.to_string())
    } else {
        RemoteError::Protocol(err.to_string())
    }
}

/// Process-wide client plus one lazily opened managed connection.
struct Shared {
    client: Client,
    connection: OnceCell<ConnectionManager>,
    prefix: String,
}

impl Shared {
    fn open(address: &str, prefix: &str) -> Result<Arc<Self>, RemoteError> {
        let client = Client::open(address).map_err(remote)?;
        Ok(Arc::new(Self {
            client,
            connection: OnceCell::new(),
            prefix: prefix.to_string(),
        }))
    }

    /// A failed first connect leaves the cell empty, so the next call tries
    /// again.
    async fn connection(&self) -> Result<ConnectionManager, RemoteError> {
        self.connection
            .get_or_try_init(|| async {
                tracing::info!(target: "sync::remote", "opening redis connection");
                ConnectionManager::new(self.client.clone())
                    .await
                    .map_err(remote)
            })
            .await
            .cloned()
    }

    fn state_key(&self, key: &SyncGroupKey) -> String {
        format!("{}:state:{}", self.prefix, key)
    }

    fn notify_channel(&self, key: &SyncGroupKey) -> String {
        format!("{}:notify:{}", self.prefix, key)
    }

    fn notify_pattern(&self) -> String {
        format!("{}:notify:*", self.prefix)
    }
}

/// [`StateStore`] on a Redis hash per group.
#[derive(Clone)]
pub struct RedisStore {
    shared: Arc<Shared>,
    script: Arc<Script>,
    ttl: Option<Duration>,
}

impl RedisStore {
    pub fn open(address: &str, prefix: &str, ttl: Option<Duration>) -> Result<Self, RemoteError> {
        Ok(Self {
            shared: Shared::open(address, prefix)?,
            script: Arc::new(Script::new(CAS_SCRIPT)),
            ttl,
        })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, RemoteError> {
        Self::open(&config.store_address, &config.channel_prefix, config.key_ttl())
    }

    /// Notification channel on the same client and connection.
    pub fn channel(&self) -> RedisChannel {
        RedisChannel {
            shared: Arc::clone(&self.shared),
        }
    }
}

#[async_trait]
impl StateStore for RedisStore {
    async fn fetch(&self, key: &SyncGroupKey) -> Result<Option<StoredRecord>, RemoteError> {
        let mut conn = self.shared.connection().await?;
        let (version, payload): (Option<u64>, Option<Vec<u8>>) = redis::cmd("HMGET")
            .arg(self.shared.state_key(key))
            .arg("version")
            .arg("payload")
            .query_async(&mut conn)
            .await
            .map_err(remote)?;

        match (version, payload) {
            (Some(version), Some(payload)) => Ok(Some(StoredRecord::new(version, payload))),
            (None, None) => Ok(None),
            _ => Err(RemoteError::Protocol(format!(
                "incomplete state hash for {key}"
            ))),
        }
    }

    async fn compare_and_set(
        &self,
        key: &SyncGroupKey,
        expected_version: u64,
        record: StoredRecord,
    ) -> Result<CasOutcome, RemoteError> {
        let mut conn = self.shared.connection().await?;
        let ttl_secs = self.ttl.map_or(0, |ttl| ttl.as_secs());

        let (committed, current_version): (i64, u64) = self
            .script
            .key(self.shared.state_key(key))
            .arg(expected_version)
            .arg(record.version)
            .arg(record.payload)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(remote)?;

        if committed == 1 {
            Ok(CasOutcome::Committed)
        } else {
            Ok(CasOutcome::Conflict { current_version })
        }
    }
}

/// [`NotificationChannel`] on Redis pub/sub. Obtained from
/// [`RedisStore::channel`].
#[derive(Clone)]
pub struct RedisChannel {
    shared: Arc<Shared>,
}

#[async_trait]
impl NotificationChannel for RedisChannel {
    async fn publish(&self, notification: &Notification) -> Result<(), RemoteError> {
        let body = serde_json::to_vec(notification)
            .map_err(|e| RemoteError::Protocol(e.to_string()))?;
        let mut conn = self.shared.connection().await?;

        let _receivers: i64 = redis::cmd("PUBLISH")
            .arg(self.shared.notify_channel(&notification.key))
            .arg(body)
            .query_async(&mut conn)
            .await
            .map_err(remote)?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription, RemoteError> {
        // Pub/sub needs a dedicated connection; it cannot share the
        // managed one.
        let mut pubsub = self.shared.client.get_async_pubsub().await.map_err(remote)?;
        pubsub
            .psubscribe(self.shared.notify_pattern())
            .await
            .map_err(remote)?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        tokio::spawn(async move {
            let mut messages = Box::pin(pubsub.into_on_message());
            while let Some(message) = messages.next().await {
                let payload: Vec<u8> = match message.get_payload() {
                    Ok(payload) => payload,
                    Err(err) => {
                        tracing::warn!(target: "sync::remote", error = %err, "unreadable pub/sub payload");
                        continue;
                    }
                };
                match serde_json::from_slice::<Notification>(&payload) {
                    Ok(notification) => {
                        if tx.send(notification).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(
                            target: "sync::remote",
                            channel = message.get_channel_name(),
                            error = %err,
                            "malformed notification"
                        );
                    }
                }
            }
            tracing::debug!(target: "sync::remote", "redis subscription ended");
        });

        Ok(Subscription::new(rx))
    }
}
