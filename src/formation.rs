use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::movement::PositionSample;
use crate::pitch::{PITCH_LENGTH_M, PITCH_WIDTH_M};
use crate::roster::Team;

const MIN_PLAYERS: usize = 10;
const DEFENSIVE_LINE: f64 = 0.35;
const ATTACKING_LINE: f64 = 0.65;
const CONFIDENCE: f64 = 0.85;

static NAMED_SHAPES: Lazy<HashMap<(usize, usize, usize), &'static str>> = Lazy::new(|| {
    HashMap::from([
        ((4, 4, 2), "4-4-2"),
        ((4, 3, 3), "4-3-3"),
        ((3, 5, 2), "3-5-2"),
        ((3, 4, 3), "3-4-3"),
        ((5, 3, 2), "5-3-2"),
        ((5, 4, 1), "5-4-1"),
        ((4, 5, 1), "4-5-1"),
    ])
});

pub fn formation_label(defenders: usize, midfielders: usize, attackers: usize) -> String {
    NAMED_SHAPES
        .get(&(defenders, midfielders, attackers))
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("{defenders}-{midfielders}-{attackers}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AveragePosition {
    pub jersey_number: u32,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormationSnapshot {
    pub team: Team,
    pub formation: String,
    pub defenders: usize,
    pub midfielders: usize,
    pub attackers: usize,
    pub confidence: f64,
    pub width_m: f64,
    pub depth_m: f64,
    pub compactness_m: f64,
    /// Sorted left to right.
    pub players: Vec<AveragePosition>,
}

/// Shape of `team` from average player positions, or `None` with fewer than ten identified
/// players.
pub fn detect_formation(samples: &[PositionSample], team: Team) -> Option<FormationSnapshot> {
    let mut sums: BTreeMap<u32, (f64, f64, u32)> = BTreeMap::new();
    for s in samples.iter().filter(|s| s.team == team) {
        let Some(jersey) = s.jersey_number else {
            continue;
        };
        let e = sums.entry(jersey).or_default();
        e.0 += s.x;
        e.1 += s.y;
        e.2 += 1;
    }
    if sums.len() < MIN_PLAYERS {
        return None;
    }

    let mut players: Vec<AveragePosition> = sums
        .into_iter()
        .map(|(jersey_number, (sx, sy, n))| AveragePosition {
            jersey_number,
            x: sx / f64::from(n),
            y: sy / f64::from(n),
        })
        .collect();
    players.sort_by(|a, b| a.x.total_cmp(&b.x));

    let defenders = players.iter().filter(|p| p.y < DEFENSIVE_LINE).count();
    let attackers = players.iter().filter(|p| p.y >= ATTACKING_LINE).count();
    let midfielders = players.len() - defenders - attackers;

    let (min_x, max_x) = players
        .iter()
        .fold((f64::MAX, f64::MIN), |(lo, hi), p| (lo.min(p.x), hi.max(p.x)));
    let n = players.len() as f64;
    let mean_y = players.iter().map(|p| p.y).sum::<f64>() / n;
    let compactness = players.iter().map(|p| (p.y - mean_y).abs()).sum::<f64>() / n;

    Some(FormationSnapshot {
        team,
        formation: formation_label(defenders, midfielders, attackers),
        defenders,
        midfielders,
        attackers,
        confidence: CONFIDENCE,
        width_m: (max_x - min_x) * PITCH_LENGTH_M,
        depth_m: PITCH_LENGTH_M,
        compactness_m: compactness * PITCH_WIDTH_M,
        players,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(jersey: u32, x: f64, y: f64) -> PositionSample {
        PositionSample {
            jersey_number: Some(jersey),
            player_name: None,
            team: Team::Away,
            x,
            y,
            timestamp: jersey,
        }
    }

    #[test]
    fn unknown_shapes_use_literal_counts() {
        assert_eq!(formation_label(4, 4, 2), "4-4-2");
        assert_eq!(formation_label(2, 6, 2), "2-6-2");
    }

    #[test]
    fn ignores_other_team_and_unnumbered_samples() {
        let mut samples: Vec<PositionSample> = (1..=9).map(|j| at(j, 0.5, 0.5)).collect();
        samples.push(PositionSample {
            jersey_number: None,
            ..at(10, 0.5, 0.5)
        });
        samples.push(PositionSample {
            team: Team::Home,
            ..at(11, 0.5, 0.5)
        });
        assert!(detect_formation(&samples, Team::Away).is_none());
    }

    #[test]
    fn width_and_compactness_are_pitch_scaled() {
        let samples: Vec<PositionSample> = (1..=10)
            .map(|j| at(j, f64::from(j) / 10.0, if j % 2 == 0 { 0.4 } else { 0.6 }))
            .collect();
        let snap = detect_formation(&samples, Team::Away).expect("ten players");
        assert!((snap.width_m - 0.9 * PITCH_LENGTH_M).abs() < 1e-9);
        assert!((snap.compactness_m - 0.1 * PITCH_WIDTH_M).abs() < 1e-9);
        assert_eq!(snap.depth_m, PITCH_LENGTH_M);
        assert_eq!(snap.players[0].jersey_number, 1);
    }
}
