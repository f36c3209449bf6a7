//! Maps players to the sync group whose state they share.

use std::sync::Arc;

use inventory_core::{PlayerId, SyncGroupKey};

use crate::host::TeamDirectory;

/// Group used for players outside any team.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Fallback {
    /// Each teamless player syncs only with their own sessions.
    #[default]
    Solo,
    /// Every teamless player shares one global inventory.
    Global,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResolverSettings {
    /// When false, team membership is ignored entirely.
    pub teams_enabled: bool,
    pub fallback: Fallback,
}

/// Resolves a player's [`SyncGroupKey`] from the team directory.
#[derive(Clone)]
pub struct GroupResolver {
    settings: ResolverSettings,
    teams: Option<Arc<dyn TeamDirectory>>,
}

impl GroupResolver {
    pub fn new(settings: ResolverSettings, teams: Option<Arc<dyn TeamDirectory>>) -> Self {
        Self { settings, teams }
    }

    /// Team key when the player is on an active team, fallback key otherwise.
    ///
    /// A team counts as active while the directory still lists the player
    /// among its members.
    pub fn resolve(&self, player: PlayerId) -> SyncGroupKey {
        if self.settings.teams_enabled
            && let Some(teams) = &self.teams
            && let Some(team) = teams.team_of(player)
            && teams.team_members(&team).contains(&player)
        {
            return SyncGroupKey::for_team(&team);
        }

        match self.settings.fallback {
            Fallback::Solo => SyncGroupKey::for_player(player),
            Fallback::Global => SyncGroupKey::global(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::StaticTeams;
    use inventory_core::TeamId;

    fn teams_with(player: PlayerId, team: &str) -> Arc<StaticTeams> {
        let teams = StaticTeams::new();
        teams.assign(player, TeamId::new(team));
        Arc::new(teams)
    }

    #[test]
    fn test_team_member_gets_team_key() {
        let player = PlayerId::from_u128(1);
        let resolver = GroupResolver::new(
            ResolverSettings {
                teams_enabled: true,
                fallback: Fallback::Solo,
            },
            Some(teams_with(player, "red")),
        );

        assert_eq!(resolver.resolve(player).as_str(), "team:red");
        assert_eq!(
            resolver.resolve(PlayerId::from_u128(2)),
            SyncGroupKey::for_player(PlayerId::from_u128(2))
        );
    }

    #[test]
    fn test_teams_disabled_ignores_directory() {
        let player = PlayerId::from_u128(1);
        let resolver = GroupResolver::new(ResolverSettings::default(), Some(teams_with(player, "red")));
        assert_eq!(resolver.resolve(player), SyncGroupKey::for_player(player));
    }

    #[test]
    fn test_global_fallback() {
        let resolver = GroupResolver::new(
            ResolverSettings {
                teams_enabled: true,
                fallback: Fallback::Global,
            },
            None,
        );
        assert!(resolver.resolve(PlayerId::from_u128(9)).is_global());
    }
}
