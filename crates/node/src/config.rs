//! Node configuration loaded from the environment.
use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use inventory_core::{PlayerId, TeamId};
use sync_runtime::SyncConfig;
use uuid::Uuid;

/// Everything the standalone node needs at startup.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub sync: SyncConfig,
    pub log_dir: PathBuf,
    /// Players brought online at startup.
    pub players: Vec<PlayerId>,
    /// Static team roster for the in-memory directory.
    pub teams: Vec<(PlayerId, TeamId)>,
}

impl NodeConfig {
    /// Construct configuration from process environment variables.
    ///
    /// On top of the `INVSYNC_*` engine settings:
    /// - `INVSYNC_LOG_DIR` - Directory for `node.log` (default: `logs`)
    /// - `INVSYNC_PLAYERS` - Comma separated player UUIDs to join at startup
    /// - `INVSYNC_TEAMS` - Comma separated `uuid=team` assignments
    pub fn from_env() -> Result<Self> {
        let sync = SyncConfig::from_env()?;
        let log_dir = env::var("INVSYNC_LOG_DIR").map_or_else(|_| PathBuf::from("logs"), PathBuf::from);

        let players = env::var("INVSYNC_PLAYERS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(parse_player)
            .collect::<Result<Vec<_>>>()?;

        let teams = env::var("INVSYNC_TEAMS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|entry| {
                let (player, team) = entry
                    .split_once('=')
                    .with_context(|| format!("team assignment `{entry}` is not `uuid=team`"))?;
                Ok((parse_player(player.trim())?, TeamId::new(team.trim())))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            sync,
            log_dir,
            players,
            teams,
        })
    }
}

fn parse_player(raw: &str) -> Result<PlayerId> {
    let id = Uuid::parse_str(raw).with_context(|| format!("invalid player id `{raw}`"))?;
    Ok(PlayerId::new(id))
}
