use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::events::{EventType, MatchEvent};
use crate::players::{PlayerRegistry, PlayerStat, pct};

/// Reset every event-derived counter and replay `events` once. Running it twice over the same
/// input gives the same counters. Events whose `(team, jersey)` has no record are dropped.
pub fn replay_events(registry: &mut PlayerRegistry, events: &[MatchEvent]) -> usize {
    for stat in registry.iter_mut() {
        stat.reset_event_counters();
    }

    let mut dropped = 0usize;
    for event in events {
        let Some(handle) = event
            .jersey_number
            .and_then(|jersey| registry.find(event.team, jersey))
        else {
            dropped += 1;
            continue;
        };
        apply_event(registry.get_mut(handle), event);
    }

    for stat in registry.iter_mut() {
        stat.recompute_rates();
    }
    if dropped > 0 {
        debug!(dropped, "events without a matching player were skipped");
    }
    dropped
}

fn apply_event(stat: &mut PlayerStat, event: &MatchEvent) {
    let ok = event.successful.unwrap_or(false);
    match event.event_type {
        EventType::Pass => {
            stat.passes_attempted += 1;
            if ok {
                stat.passes_completed += 1;
            }
        }
        EventType::Shot => {
            stat.shots_attempted += 1;
            if ok {
                stat.shots_on_target += 1;
            }
        }
        EventType::GoalScored => {
            stat.shots_attempted += 1;
            stat.shots_on_target += 1;
            stat.goals_scored += 1;
        }
        EventType::Tackle => {
            stat.tackles += 1;
            if ok {
                stat.tackles_won += 1;
            }
        }
        EventType::Dribble => {
            stat.dribbles += 1;
            if ok {
                stat.dribbles_won += 1;
            }
        }
        EventType::Interception => stat.interceptions += 1,
        EventType::BallRecovery => stat.ball_recoveries += 1,
        EventType::Clearance => stat.clearances += 1,
        EventType::Foul => stat.fouls += 1,
        EventType::FoulReceived => stat.fouls_received += 1,
        EventType::ShotBlocked
        | EventType::Aerial
        | EventType::SubstitutionOn
        | EventType::SubstitutionOff
        | EventType::YellowCard
        | EventType::RedCard => {}
    }
}

/// Match-level numbers, always derived from the player records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchTotals {
    pub total_passes: u32,
    pub passes_completed: u32,
    pub pass_completion_rate: f64,
    pub total_shots: u32,
    pub shots_on_target: u32,
    pub goals: u32,
    pub total_tackles: u32,
    pub tackles_won: u32,
    pub total_distance_covered_m: f64,
    pub average_speed_kmh: f64,
}

impl MatchTotals {
    pub fn from_stats<'a>(stats: impl IntoIterator<Item = &'a PlayerStat>) -> Self {
        let mut totals = MatchTotals::default();
        let mut speed_sum = 0.0;
        let mut moving = 0u32;
        for s in stats {
            totals.total_passes += s.passes_attempted;
            totals.passes_completed += s.passes_completed;
            totals.total_shots += s.shots_attempted;
            totals.shots_on_target += s.shots_on_target;
            totals.goals += s.goals_scored;
            totals.total_tackles += s.tackles;
            totals.tackles_won += s.tackles_won;
            totals.total_distance_covered_m += s.distance_covered_m;
            if s.average_speed_kmh > 0.0 {
                speed_sum += s.average_speed_kmh;
                moving += 1;
            }
        }
        totals.pass_completion_rate = pct(totals.passes_completed, totals.total_passes);
        if moving > 0 {
            totals.average_speed_kmh = speed_sum / f64::from(moving);
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_id;
    use crate::players::PlayerOrigin;
    use crate::roster::Team;
    use uuid::Uuid;

    fn event(kind: EventType, team: Team, jersey: Option<u32>, ok: bool) -> MatchEvent {
        let analysis_id = Uuid::nil();
        MatchEvent {
            id: event_id(analysis_id, 0),
            analysis_id,
            event_type: kind,
            timestamp: 0,
            jersey_number: jersey,
            player_name: String::new(),
            team,
            details: String::new(),
            successful: Some(ok),
            x_start: 0.0,
            y_start: 0.0,
            x_end: 0.0,
            y_end: 0.0,
            distance_meters: 0.0,
        }
    }

    fn registry() -> PlayerRegistry {
        PlayerRegistry::from_stats(vec![
            PlayerStat::new(Team::Home, 9, "Nine", None, PlayerOrigin::Roster),
            PlayerStat::new(Team::Away, 4, "Four", None, PlayerOrigin::Roster),
        ])
    }

    #[test]
    fn goal_counts_as_shot_on_target() {
        let mut reg = registry();
        replay_events(&mut reg, &[event(EventType::GoalScored, Team::Home, Some(9), true)]);
        let nine = reg.get(reg.find(Team::Home, 9).expect("nine"));
        assert_eq!(
            (nine.shots_attempted, nine.shots_on_target, nine.goals_scored),
            (1, 1, 1)
        );
        assert_eq!(nine.shot_accuracy_pct, 100.0);
    }

    #[test]
    fn unknown_jersey_is_dropped() {
        let mut reg = registry();
        let dropped = replay_events(
            &mut reg,
            &[
                event(EventType::Pass, Team::Away, Some(99), true),
                event(EventType::Pass, Team::Home, None, true),
                event(EventType::Pass, Team::Away, Some(4), false),
            ],
        );
        assert_eq!(dropped, 2);
        let four = reg.get(reg.find(Team::Away, 4).expect("four"));
        assert_eq!((four.passes_attempted, four.passes_completed), (1, 0));
        assert_eq!(four.pass_completion_pct, 0.0);
    }

    #[test]
    fn totals_average_speed_ignores_idle_players() {
        let mut a = PlayerStat::new(Team::Home, 1, "A", None, PlayerOrigin::Roster);
        a.average_speed_kmh = 6.0;
        a.distance_covered_m = 100.0;
        let b = PlayerStat::new(Team::Home, 2, "B", None, PlayerOrigin::Roster);
        let totals = MatchTotals::from_stats([&a, &b]);
        assert_eq!(totals.average_speed_kmh, 6.0);
        assert_eq!(totals.total_distance_covered_m, 100.0);
        assert_eq!(totals.pass_completion_rate, 0.0);
    }
}
