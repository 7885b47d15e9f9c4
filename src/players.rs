use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::roster::{MatchSetup, Team, default_position};

pub const UNKNOWN_PLAYER: &str = "Unknown";
const MIN_PLACEHOLDERS_PER_TEAM: usize = 5;

pub fn placeholder_name(jersey_number: u32) -> String {
    format!("Player #{jersey_number}")
}

pub fn is_placeholder_name(name: &str) -> bool {
    name.starts_with("Player #")
}

/// How a player record came to exist within one analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerOrigin {
    Roster,
    Placeholder,
    /// Placeholder whose number has since been read off a shirt.
    Sighted,
    /// Jersey number read off a shirt mid-run that nobody had registered.
    Discovered,
    /// Named only by a manually entered goal.
    GoalScorer,
    Emergency,
}

/// Per-player accumulator for one analysis. `(team, jersey_number)` is the natural key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStat {
    pub jersey_number: u32,
    pub team: Team,
    pub player_name: String,
    pub position: String,
    pub origin: PlayerOrigin,

    pub passes_attempted: u32,
    pub passes_completed: u32,
    pub pass_completion_pct: f64,
    pub shots_attempted: u32,
    pub shots_on_target: u32,
    pub goals_scored: u32,
    pub shot_accuracy_pct: f64,
    pub tackles: u32,
    pub tackles_won: u32,
    pub interceptions: u32,
    pub dribbles: u32,
    pub dribbles_won: u32,
    pub ball_recoveries: u32,
    pub clearances: u32,
    pub fouls: u32,
    pub fouls_received: u32,

    pub distance_covered_m: f64,
    pub max_speed_kmh: f64,
    pub average_speed_kmh: f64,
    pub sprints: u32,
}

impl PlayerStat {
    pub fn new(
        team: Team,
        jersey_number: u32,
        player_name: impl Into<String>,
        position: Option<&str>,
        origin: PlayerOrigin,
    ) -> Self {
        let position = position
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| default_position(jersey_number))
            .to_string();
        Self {
            jersey_number,
            team,
            player_name: player_name.into(),
            position,
            origin,
            passes_attempted: 0,
            passes_completed: 0,
            pass_completion_pct: 0.0,
            shots_attempted: 0,
            shots_on_target: 0,
            goals_scored: 0,
            shot_accuracy_pct: 0.0,
            tackles: 0,
            tackles_won: 0,
            interceptions: 0,
            dribbles: 0,
            dribbles_won: 0,
            ball_recoveries: 0,
            clearances: 0,
            fouls: 0,
            fouls_received: 0,
            distance_covered_m: 0.0,
            max_speed_kmh: 0.0,
            average_speed_kmh: 0.0,
            sprints: 0,
        }
    }

    pub fn key(&self) -> (Team, u32) {
        (self.team, self.jersey_number)
    }

    /// Zero every counter that is derived from the event stream.
    pub fn reset_event_counters(&mut self) {
        self.passes_attempted = 0;
        self.passes_completed = 0;
        self.pass_completion_pct = 0.0;
        self.shots_attempted = 0;
        self.shots_on_target = 0;
        self.goals_scored = 0;
        self.shot_accuracy_pct = 0.0;
        self.tackles = 0;
        self.tackles_won = 0;
        self.interceptions = 0;
        self.dribbles = 0;
        self.dribbles_won = 0;
        self.ball_recoveries = 0;
        self.clearances = 0;
        self.fouls = 0;
        self.fouls_received = 0;
    }

    pub fn recompute_rates(&mut self) {
        self.pass_completion_pct = pct(self.passes_completed, self.passes_attempted);
        self.shot_accuracy_pct = pct(self.shots_on_target, self.shots_attempted);
    }

    fn absorb(&mut self, other: PlayerStat) {
        if is_placeholder_name(&self.player_name) && !is_placeholder_name(&other.player_name) {
            self.player_name = other.player_name;
        }
        if self.origin == PlayerOrigin::Placeholder && other.origin == PlayerOrigin::Roster {
            self.origin = PlayerOrigin::Roster;
            self.position = other.position;
        }
        self.passes_attempted += other.passes_attempted;
        self.passes_completed += other.passes_completed;
        self.shots_attempted += other.shots_attempted;
        self.shots_on_target += other.shots_on_target;
        self.goals_scored += other.goals_scored;
        self.tackles += other.tackles;
        self.tackles_won += other.tackles_won;
        self.interceptions += other.interceptions;
        self.dribbles += other.dribbles;
        self.dribbles_won += other.dribbles_won;
        self.ball_recoveries += other.ball_recoveries;
        self.clearances += other.clearances;
        self.fouls += other.fouls;
        self.fouls_received += other.fouls_received;
        self.distance_covered_m += other.distance_covered_m;
        self.max_speed_kmh = self.max_speed_kmh.max(other.max_speed_kmh);
        self.sprints += other.sprints;
        self.recompute_rates();
    }
}

/// Percentage with a zero denominator reading as 0.
pub fn pct(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        f64::from(part) * 100.0 / f64::from(whole)
    }
}

/// Stable reference to a record in a [`PlayerRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayerHandle(usize);

/// Identity attached to a ball owner, good enough to build an event from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPlayer {
    pub handle: PlayerHandle,
    pub team: Team,
    pub jersey_number: u32,
    pub player_name: String,
}

/// Arena of player records with a `(team, jersey)` index. Records are only ever appended, so
/// handles stay valid while the classifier grows the roster mid-run.
#[derive(Debug, Clone, Default)]
pub struct PlayerRegistry {
    arena: Vec<PlayerStat>,
    index: HashMap<(Team, u32), PlayerHandle>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Roster players when any were supplied, otherwise `max(5, estimated_players / 2)`
    /// placeholders per side.
    pub fn seeded(setup: &MatchSetup, estimated_players: usize) -> Self {
        let mut registry = Self::new();
        if setup.has_roster_players() {
            for team in Team::BOTH {
                let Some(roster) = setup.roster(team) else {
                    continue;
                };
                for p in &roster.players {
                    registry.insert(PlayerStat::new(
                        team,
                        p.jersey_number,
                        p.name.clone(),
                        p.position.as_deref(),
                        PlayerOrigin::Roster,
                    ));
                }
            }
            info!(players = registry.len(), "seeded player stats from roster");
        } else {
            let per_team = (estimated_players / 2).max(MIN_PLACEHOLDERS_PER_TEAM);
            for team in Team::BOTH {
                for n in 1..=per_team as u32 {
                    registry.insert(PlayerStat::new(
                        team,
                        n,
                        placeholder_name(n),
                        None,
                        PlayerOrigin::Placeholder,
                    ));
                }
            }
            info!(per_team, "no roster supplied, seeded placeholder players");
        }
        registry
    }

    pub fn from_stats(stats: Vec<PlayerStat>) -> Self {
        let mut registry = Self::new();
        for stat in stats {
            registry.insert(stat);
        }
        registry
    }

    /// Adds `stat`, merging it into the existing record when its key is already taken.
    pub fn insert(&mut self, stat: PlayerStat) -> PlayerHandle {
        let key = stat.key();
        if let Some(&handle) = self.index.get(&key) {
            debug!(team = %key.0, jersey = key.1, "merging duplicate player record");
            self.arena[handle.0].absorb(stat);
            return handle;
        }
        let handle = PlayerHandle(self.arena.len());
        self.arena.push(stat);
        self.index.insert(key, handle);
        handle
    }

    pub fn find(&self, team: Team, jersey_number: u32) -> Option<PlayerHandle> {
        self.index.get(&(team, jersey_number)).copied()
    }

    pub fn get(&self, handle: PlayerHandle) -> &PlayerStat {
        &self.arena[handle.0]
    }

    pub fn get_mut(&mut self, handle: PlayerHandle) -> &mut PlayerStat {
        &mut self.arena[handle.0]
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayerStat> {
        self.arena.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PlayerStat> {
        self.arena.iter_mut()
    }

    pub fn into_stats(self) -> Vec<PlayerStat> {
        self.arena
    }

    fn team_handles(&self, team: Team) -> Vec<PlayerHandle> {
        self.arena
            .iter()
            .enumerate()
            .filter(|(_, p)| p.team == team)
            .map(|(i, _)| PlayerHandle(i))
            .collect()
    }

    fn resolved(&self, handle: PlayerHandle) -> ResolvedPlayer {
        let stat = self.get(handle);
        ResolvedPlayer {
            handle,
            team: stat.team,
            jersey_number: stat.jersey_number,
            player_name: stat.player_name.clone(),
        }
    }

    /// Map a ball owner to a player record. Never fails.
    ///
    /// 1. A recognized jersey that is registered reuses that record. A placeholder hit this way
    ///    is relabeled as sighted.
    /// 2. A recognized jersey that is not registered creates a record.
    /// 3. Without a jersey, the detection index cycles over the team's records.
    /// 4. A team with no records at all gets an emergency `Player #1`.
    pub fn resolve(
        &mut self,
        team: Team,
        recognized_jersey: Option<u32>,
        detection_index: Option<usize>,
    ) -> ResolvedPlayer {
        if let Some(jersey) = recognized_jersey {
            if let Some(handle) = self.find(team, jersey) {
                let stat = self.get_mut(handle);
                if stat.origin == PlayerOrigin::Placeholder {
                    stat.origin = PlayerOrigin::Sighted;
                    stat.player_name = placeholder_name(jersey);
                    debug!(%team, jersey, "placeholder confirmed by jersey read");
                }
                return self.resolved(handle);
            }
            let handle = self.insert(PlayerStat::new(
                team,
                jersey,
                placeholder_name(jersey),
                None,
                PlayerOrigin::Discovered,
            ));
            info!(%team, jersey, "discovered new player from jersey number");
            return self.resolved(handle);
        }

        let handles = self.team_handles(team);
        if !handles.is_empty() {
            let slot = detection_index.unwrap_or(0) % handles.len();
            return self.resolved(handles[slot]);
        }

        let handle = self.insert(PlayerStat::new(
            team,
            1,
            placeholder_name(1),
            None,
            PlayerOrigin::Emergency,
        ));
        info!(%team, "created emergency player");
        self.resolved(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::{RosterPlayer, TeamRoster};

    fn roster(players: &[(u32, &str)]) -> TeamRoster {
        TeamRoster {
            team_name: String::new(),
            jersey_color_home: "#FFFFFF".to_string(),
            jersey_color_away: "#000000".to_string(),
            players: players
                .iter()
                .map(|(n, name)| RosterPlayer {
                    jersey_number: *n,
                    name: name.to_string(),
                    position: None,
                })
                .collect(),
        }
    }

    #[test]
    fn placeholders_seed_at_least_five_per_side() {
        let registry = PlayerRegistry::seeded(&MatchSetup::default(), 4);
        assert_eq!(registry.len(), 10);
        let registry = PlayerRegistry::seeded(&MatchSetup::default(), 22);
        assert_eq!(registry.len(), 22);
        assert!(registry.iter().all(|p| p.origin == PlayerOrigin::Placeholder));
    }

    #[test]
    fn duplicate_roster_entries_merge() {
        let setup = MatchSetup {
            home: Some(roster(&[(9, "Player #9"), (9, "Striker")])),
            away: None,
            goals: Vec::new(),
        };
        let registry = PlayerRegistry::seeded(&setup, 22);
        assert_eq!(registry.len(), 1);
        let handle = registry.find(Team::Home, 9).expect("registered");
        assert_eq!(registry.get(handle).player_name, "Striker");
    }

    #[test]
    fn recognized_jersey_reuses_or_creates() {
        let setup = MatchSetup {
            home: Some(roster(&[(7, "Winger")])),
            away: Some(roster(&[(4, "Anchor")])),
            goals: Vec::new(),
        };
        let mut registry = PlayerRegistry::seeded(&setup, 22);

        let hit = registry.resolve(Team::Home, Some(7), Some(3));
        assert_eq!(hit.player_name, "Winger");
        assert_eq!(registry.len(), 2);

        let fresh = registry.resolve(Team::Away, Some(23), None);
        assert_eq!(fresh.jersey_number, 23);
        assert_eq!(fresh.player_name, "Player #23");
        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.get(fresh.handle).origin,
            PlayerOrigin::Discovered
        );

        let again = registry.resolve(Team::Away, Some(23), None);
        assert_eq!(again.handle, fresh.handle);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn jersey_read_relabels_a_placeholder_once() {
        let mut registry = PlayerRegistry::seeded(&MatchSetup::default(), 22);
        let seen = registry.resolve(Team::Home, Some(3), None);
        assert_eq!(seen.player_name, "Player #3");
        assert_eq!(registry.get(seen.handle).origin, PlayerOrigin::Sighted);
        assert_eq!(registry.len(), 22);

        let cycled = registry.resolve(Team::Home, None, Some(3));
        assert_eq!(registry.get(cycled.handle).origin, PlayerOrigin::Placeholder);

        let again = registry.resolve(Team::Home, Some(3), None);
        assert_eq!(again.handle, seen.handle);
        assert_eq!(registry.get(again.handle).origin, PlayerOrigin::Sighted);
    }

    #[test]
    fn unrecognized_jersey_cycles_by_detection_index() {
        let mut registry = PlayerRegistry::seeded(&MatchSetup::default(), 10);
        let a = registry.resolve(Team::Away, None, Some(0));
        let b = registry.resolve(Team::Away, None, Some(6));
        assert_eq!(a.jersey_number, 1);
        assert_eq!(b.jersey_number, 2);
        assert!(a.team == Team::Away && b.team == Team::Away);
    }

    #[test]
    fn empty_team_gets_emergency_player() {
        let mut registry = PlayerRegistry::new();
        let p = registry.resolve(Team::Home, None, Some(4));
        assert_eq!(p.jersey_number, 1);
        assert_eq!(registry.get(p.handle).origin, PlayerOrigin::Emergency);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn pct_guards_zero_denominator() {
        assert_eq!(pct(3, 0), 0.0);
        assert_eq!(pct(1, 4), 25.0);
    }
}
