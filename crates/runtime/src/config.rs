//! Engine configuration structures and loaders.
use std::env;
use std::time::Duration;

use inventory_core::{SyncSections, WriterId};
use serde::{Deserialize, Serialize};

use crate::api::{Result, SyncError};
use crate::remote::Backoff;
use crate::resolver::{Fallback, ResolverSettings};

/// Upper bound accepted for `retry_limit`.
pub const MAX_RETRY_LIMIT: u32 = 16;

/// Settings shared by the engine, its workers, and the remote backends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Identity of this process; recorded as the writer of every state it
    /// commits and used to drop its own notifications.
    pub server_id: String,
    pub store_address: String,
    /// Namespace for store keys and notification channels.
    pub channel_prefix: String,
    /// Retries after a CAS conflict, and after a failed remote call.
    pub retry_limit: u32,
    pub remote_timeout_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Expiry applied to stored states; `0` keeps them forever.
    pub key_ttl_secs: u64,
    pub sections: SyncSections,
    pub teams_enabled: bool,
    pub fallback_to_global: bool,
    /// A member's death clears the group's synchronized items for everyone.
    pub shared_death: bool,
    pub command_buffer: usize,
    pub event_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_id: uuid::Uuid::new_v4().to_string(),
            store_address: "redis://127.0.0.1:6379/0".to_string(),
            channel_prefix: "mis".to_string(),
            retry_limit: 3,
            remote_timeout_ms: 3000,
            backoff_base_ms: 50,
            backoff_max_ms: 2000,
            key_ttl_secs: 12 * 60 * 60,
            sections: SyncSections::default(),
            teams_enabled: false,
            fallback_to_global: false,
            shared_death: true,
            command_buffer: 256,
            event_buffer: 256,
        }
    }
}

impl SyncConfig {
    /// Construct configuration from process environment variables.
    ///
    /// Environment variables:
    /// - `INVSYNC_SERVER_ID` - Writer identity (default: random UUID)
    /// - `INVSYNC_STORE_ADDRESS` - Store URL (default: `redis://127.0.0.1:6379/0`)
    /// - `INVSYNC_CHANNEL_PREFIX` - Key/channel namespace (default: `mis`)
    /// - `INVSYNC_RETRY_LIMIT` - Conflict and remote retries (default: 3)
    /// - `INVSYNC_REMOTE_TIMEOUT_MS` - Per-call timeout (default: 3000)
    /// - `INVSYNC_BACKOFF_BASE_MS` / `INVSYNC_BACKOFF_MAX_MS` - Retry backoff (default: 50 / 2000)
    /// - `INVSYNC_KEY_TTL_SECS` - Stored state expiry (default: 43200)
    /// - `INVSYNC_SECTIONS` - Comma list of synced sections (default: main, armor, offhand, ender_chest)
    /// - `INVSYNC_TEAMS_ENABLED` - Share inventories per team (default: false)
    /// - `INVSYNC_FALLBACK_GLOBAL` - Put teamless players in one group (default: false)
    /// - `INVSYNC_SHARED_DEATH` - A death clears the whole group's items (default: true)
    /// - `INVSYNC_COMMAND_BUFFER` / `INVSYNC_EVENT_BUFFER` - Channel sizes (default: 256 / 256)
    ///
    /// Unparseable numbers and flags fall back to their defaults; an unknown
    /// section name is rejected.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(id) = env::var("INVSYNC_SERVER_ID") {
            config.server_id = id;
        }
        if let Ok(address) = env::var("INVSYNC_STORE_ADDRESS") {
            config.store_address = address;
        }
        if let Ok(prefix) = env::var("INVSYNC_CHANNEL_PREFIX") {
            config.channel_prefix = prefix;
        }
        if let Some(limit) = read_env::<u32>("INVSYNC_RETRY_LIMIT") {
            config.retry_limit = limit;
        }
        if let Some(ms) = read_env::<u64>("INVSYNC_REMOTE_TIMEOUT_MS") {
            config.remote_timeout_ms = ms;
        }
        if let Some(ms) = read_env::<u64>("INVSYNC_BACKOFF_BASE_MS") {
            config.backoff_base_ms = ms;
        }
        if let Some(ms) = read_env::<u64>("INVSYNC_BACKOFF_MAX_MS") {
            config.backoff_max_ms = ms;
        }
        if let Some(secs) = read_env::<u64>("INVSYNC_KEY_TTL_SECS") {
            config.key_ttl_secs = secs;
        }
        if let Ok(list) = env::var("INVSYNC_SECTIONS") {
            config.sections = SyncSections::parse_list(&list)
                .map_err(|name| SyncError::Config(format!("unknown sync section `{name}`")))?;
        }
        if let Some(enabled) = read_env::<bool>("INVSYNC_TEAMS_ENABLED") {
            config.teams_enabled = enabled;
        }
        if let Some(enabled) = read_env::<bool>("INVSYNC_FALLBACK_GLOBAL") {
            config.fallback_to_global = enabled;
        }
        if let Some(enabled) = read_env::<bool>("INVSYNC_SHARED_DEATH") {
            config.shared_death = enabled;
        }
        if let Some(capacity) = read_env::<usize>("INVSYNC_COMMAND_BUFFER") {
            config.command_buffer = capacity.max(1);
        }
        if let Some(capacity) = read_env::<usize>("INVSYNC_EVENT_BUFFER") {
            config.event_buffer = capacity.max(1);
        }

        config.validate()?;
        Ok(config)
    }

    /// Parses a camelCase JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry_limit > MAX_RETRY_LIMIT {
            return Err(SyncError::Config(format!(
                "retryLimit {} exceeds {}",
                self.retry_limit, MAX_RETRY_LIMIT
            )));
        }
        if self.remote_timeout_ms == 0 {
            return Err(SyncError::Config("remoteTimeoutMs must be non-zero".into()));
        }
        if self.channel_prefix.is_empty() {
            return Err(SyncError::Config("channelPrefix must not be empty".into()));
        }
        if self.server_id.is_empty() {
            return Err(SyncError::Config("serverId must not be empty".into()));
        }
        if self.command_buffer == 0 || self.event_buffer == 0 {
            return Err(SyncError::Config("channel buffers must be non-zero".into()));
        }
        Ok(())
    }

    pub fn writer(&self) -> WriterId {
        WriterId::new(self.server_id.clone())
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_max_ms),
        )
    }

    pub fn key_ttl(&self) -> Option<Duration> {
        (self.key_ttl_secs > 0).then(|| Duration::from_secs(self.key_ttl_secs))
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            teams_enabled: self.teams_enabled,
            fallback: if self.fallback_to_global {
                Fallback::Global
            } else {
                Fallback::Solo
            },
        }
    }
}

fn read_env<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    env::var(key).ok()?.parse().ok()
}
