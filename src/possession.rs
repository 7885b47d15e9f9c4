use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::movement::{BallSample, PositionSample};
use crate::pitch::FieldPoint;
use crate::roster::Team;

/// A player this close to the ball (pitch metres) holds it.
pub const CONTROL_RADIUS_M: f64 = 3.0;
const POSSESSION_WINDOW_SECS: u32 = 1;
const PASS_WINDOW_SECS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PossessionSequence {
    pub team: Team,
    pub start: u32,
    pub end: u32,
    pub duration: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PossessionSummary {
    pub home_seconds: u32,
    pub away_seconds: u32,
    pub sequences: Vec<PossessionSequence>,
    pub average_home_duration: f64,
    pub average_away_duration: f64,
}

impl PossessionSummary {
    pub fn home_share_pct(&self) -> f64 {
        let total = self.home_seconds + self.away_seconds;
        if total == 0 {
            50.0
        } else {
            f64::from(self.home_seconds) * 100.0 / f64::from(total)
        }
    }
}

/// Closest player sample within `window` seconds of `ball`, if it is close enough to hold it.
fn holder<'a>(
    players: &'a [PositionSample],
    ball: &BallSample,
    window: u32,
) -> Option<&'a PositionSample> {
    let at = ball.point();
    players
        .iter()
        .filter(|p| p.timestamp.abs_diff(ball.timestamp) <= window)
        .min_by(|a, b| a.point().dist_sq(at).total_cmp(&b.point().dist_sq(at)))
        .filter(|p| p.point().field_dist_m(at) < CONTROL_RADIUS_M)
}

fn time_ordered(ball: &[BallSample]) -> Vec<BallSample> {
    let mut ordered = ball.to_vec();
    ordered.sort_by_key(|b| b.timestamp);
    ordered
}

/// Contiguous team possession. `None` when there are no ball samples at all.
pub fn possession(players: &[PositionSample], ball: &[BallSample]) -> Option<PossessionSummary> {
    let ball = time_ordered(ball);
    let last = ball.last()?.timestamp;

    let mut summary = PossessionSummary::default();
    let mut current: Option<(Team, u32)> = None;

    let close = |summary: &mut PossessionSummary, team: Team, start: u32, end: u32| {
        let duration = end - start;
        summary.sequences.push(PossessionSequence {
            team,
            start,
            end,
            duration,
        });
        match team {
            Team::Home => summary.home_seconds += duration,
            Team::Away => summary.away_seconds += duration,
        }
    };

    for b in &ball {
        let Some(p) = holder(players, b, POSSESSION_WINDOW_SECS) else {
            continue;
        };
        match current {
            Some((team, _)) if team == p.team => {}
            Some((team, start)) => {
                close(&mut summary, team, start, b.timestamp);
                current = Some((p.team, b.timestamp));
            }
            None => current = Some((p.team, b.timestamp)),
        }
    }
    if let Some((team, start)) = current {
        close(&mut summary, team, start, last);
    }

    let average = |team: Team| {
        let durations: Vec<f64> = summary
            .sequences
            .iter()
            .filter(|s| s.team == team)
            .map(|s| f64::from(s.duration))
            .collect();
        if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<f64>() / durations.len() as f64
        }
    };
    let (home_avg, away_avg) = (average(Team::Home), average(Team::Away));
    summary.average_home_duration = home_avg;
    summary.average_away_duration = away_avg;
    Some(summary)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassLink {
    pub team: Team,
    pub from_jersey: u32,
    pub to_jersey: u32,
    pub from_name: String,
    pub to_name: String,
    pub location: FieldPoint,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PassNetwork {
    pub links: Vec<PassLink>,
    /// `(team, from, to)` to completed pass count.
    #[serde(with = "adjacency_entries")]
    pub adjacency: BTreeMap<(Team, u32, u32), u32>,
}

// JSON object keys must be strings, so the map travels as a list of entries.
mod adjacency_entries {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::roster::Team;

    #[derive(Serialize, Deserialize)]
    struct Entry {
        team: Team,
        from: u32,
        to: u32,
        passes: u32,
    }

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<(Team, u32, u32), u32>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let entries: Vec<Entry> = map
            .iter()
            .map(|(&(team, from, to), &passes)| Entry {
                team,
                from,
                to,
                passes,
            })
            .collect();
        entries.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<(Team, u32, u32), u32>, D::Error> {
        let entries = Vec::<Entry>::deserialize(deserializer)?;
        Ok(entries
            .into_iter()
            .map(|e| ((e.team, e.from, e.to), e.passes))
            .collect())
    }
}

impl PassNetwork {
    pub fn count(&self, team: Team, from: u32, to: u32) -> u32 {
        self.adjacency.get(&(team, from, to)).copied().unwrap_or(0)
    }
}

/// Teammate-to-teammate ownership changes along the ball track.
pub fn pass_network(players: &[PositionSample], ball: &[BallSample]) -> PassNetwork {
    let mut network = PassNetwork::default();
    if ball.len() < 2 {
        return network;
    }

    let mut current: Option<&PositionSample> = None;
    for b in &time_ordered(ball) {
        let Some(p) = holder(players, b, PASS_WINDOW_SECS) else {
            continue;
        };
        let changed = match current {
            None => true,
            Some(c) => c.team != p.team || c.jersey_number != p.jersey_number,
        };
        if !changed {
            continue;
        }
        let from = current.filter(|c| c.team == p.team);
        if let (Some(c), Some(from), Some(to)) =
            (from, from.and_then(|c| c.jersey_number), p.jersey_number)
        {
            *network.adjacency.entry((p.team, from, to)).or_default() += 1;
            network.links.push(PassLink {
                team: p.team,
                from_jersey: from,
                to_jersey: to,
                from_name: c.player_name.clone().unwrap_or_default(),
                to_name: p.player_name.clone().unwrap_or_default(),
                location: c.point(),
            });
        }
        current = Some(p);
    }
    network
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(team: Team, jersey: u32, x: f64, t: u32) -> PositionSample {
        PositionSample {
            jersey_number: Some(jersey),
            player_name: Some(format!("{team} {jersey}")),
            team,
            x,
            y: 0.5,
            timestamp: t,
        }
    }

    fn ball(x: f64, t: u32) -> BallSample {
        BallSample { x, y: 0.5, timestamp: t }
    }

    #[test]
    fn sequences_tile_the_held_span() {
        let players = vec![
            player(Team::Home, 7, 0.20, 0),
            player(Team::Away, 4, 0.60, 10),
            player(Team::Home, 8, 0.30, 25),
        ];
        let balls = vec![ball(0.20, 0), ball(0.60, 10), ball(0.30, 25), ball(0.9, 30)];
        let summary = possession(&players, &balls).expect("summary");

        assert_eq!(summary.sequences.len(), 3);
        for pair in summary.sequences.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
        let span: u32 = summary.sequences.iter().map(|s| s.duration).sum();
        assert_eq!(summary.home_seconds + summary.away_seconds, span);
        assert_eq!(summary.home_seconds, 15);
        assert_eq!(summary.away_seconds, 15);
        assert_eq!(summary.average_home_duration, 7.5);
    }

    #[test]
    fn no_ball_means_no_summary() {
        assert!(possession(&[player(Team::Home, 1, 0.5, 0)], &[]).is_none());
    }

    #[test]
    fn far_players_do_not_hold() {
        let summary = possession(&[player(Team::Home, 1, 0.1, 0)], &[ball(0.9, 0)]).expect("summary");
        assert!(summary.sequences.is_empty());
        assert_eq!(summary.home_share_pct(), 50.0);
    }

    #[test]
    fn only_same_team_changes_become_passes() {
        let players = vec![
            player(Team::Home, 7, 0.20, 0),
            player(Team::Home, 9, 0.40, 3),
            player(Team::Away, 4, 0.60, 6),
        ];
        let balls = vec![ball(0.20, 0), ball(0.40, 3), ball(0.60, 6)];
        let network = pass_network(&players, &balls);
        assert_eq!(network.links.len(), 1);
        assert_eq!(network.count(Team::Home, 7, 9), 1);
        assert_eq!(network.links[0].from_name, "Home Team 7");
        assert_eq!(network.links[0].location, FieldPoint::new(0.20, 0.5));
    }
}
