//! Error types surfaced by the sync runtime.
//!
//! [`RemoteError`] describes a single failed call against the store or the
//! notification channel. [`SyncError`] is what engine callers see once
//! retries, timeouts, and conflict handling have run their course.
use std::time::Duration;

use inventory_core::{DecodeError, PlayerId, SyncGroupKey};
use thiserror::Error;
use tokio::sync::oneshot;

pub type Result<T> = std::result::Result<T, SyncError>;

/// Failure of one remote call.
#[derive(Clone, Debug, Error)]
pub enum RemoteError {
    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),

    #[error("remote connection failed: {0}")]
    Connection(String),

    #[error("remote protocol error: {0}")]
    Protocol(String),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("remote store unavailable")]
    RemoteUnavailable(#[source] RemoteError),

    #[error("gave up on {key} after {attempts} conflicting writes")]
    ConflictRetryExhausted { key: SyncGroupKey, attempts: u32 },

    #[error("player {player} is switching sync groups")]
    GroupSwitchInProgress { player: PlayerId },

    #[error("sync group {key} is not active on this process")]
    InactiveGroup { key: SyncGroupKey },

    #[error("player {player} has no sync session")]
    SessionClosed { player: PlayerId },

    #[error("sync worker command channel closed")]
    CommandChannelClosed,

    #[error("sync worker reply channel closed")]
    ReplyChannelClosed(#[source] oneshot::error::RecvError),

    #[error("sync worker join failed")]
    WorkerJoin(#[source] tokio::task::JoinError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        Self::RemoteUnavailable(err)
    }
}
