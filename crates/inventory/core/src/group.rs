//! Identities, group keys, and the versioned state stored per group.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::snapshot::InventorySnapshot;

/// Stable player identity (the host's account UUID).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    /// Fresh random identity, mostly useful for tests and demos.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Team identity as reported by the external team directory.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TeamId(pub String);

impl TeamId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of the process that wrote a state (the server id).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WriterId(pub String);

impl WriterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for WriterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque key naming one synchronization group.
///
/// Produced by the group resolver and never rewritten afterwards. The string
/// form doubles as the remote store key suffix and the notification channel
/// suffix.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SyncGroupKey(String);

impl SyncGroupKey {
    const PLAYER_PREFIX: &'static str = "player:";
    const TEAM_PREFIX: &'static str = "team:";
    const GLOBAL: &'static str = "global";

    /// Key for a player syncing only with their own other sessions.
    pub fn for_player(player: PlayerId) -> Self {
        Self(format!("{}{}", Self::PLAYER_PREFIX, player))
    }

    /// Key for a team sharing one inventory.
    pub fn for_team(team: &TeamId) -> Self {
        Self(format!("{}{}", Self::TEAM_PREFIX, team))
    }

    /// Key shared by every teamless player when running in global mode.
    pub fn global() -> Self {
        Self(Self::GLOBAL.to_string())
    }

    /// Wraps a raw key received from the store or channel.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_team(&self) -> bool {
        self.0.starts_with(Self::TEAM_PREFIX)
    }

    pub fn is_global(&self) -> bool {
        self.0 == Self::GLOBAL
    }
}

impl fmt::Display for SyncGroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The authoritative record for one group, as stored remotely.
///
/// `version` alone decides which state is newest; `written_at_ms` is
/// informational.
#[derive(Clone, Debug, PartialEq)]
pub struct VersionedState {
    pub key: SyncGroupKey,
    pub snapshot: InventorySnapshot,
    pub version: u64,
    pub writer: WriterId,
    pub written_at_ms: i64,
}

impl VersionedState {
    pub fn new(
        key: SyncGroupKey,
        snapshot: InventorySnapshot,
        version: u64,
        writer: WriterId,
        written_at_ms: i64,
    ) -> Self {
        Self {
            key,
            snapshot,
            version,
            writer,
            written_at_ms,
        }
    }
}
