use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::detection::FrameDetection;
use crate::detector::JerseyOcr;
use crate::pitch::{FieldPoint, PITCH_LENGTH_M, PITCH_WIDTH_M};
use crate::players::PlayerRegistry;
use crate::roster::Team;
use crate::team_attribution::TeamAttributor;

const MAX_GAP_SECS: i64 = 5;
const MAX_HUMAN_KMH: f64 = 35.0;
const WALK_KMH: f64 = 7.0;
const JOG_KMH: f64 = 15.0;
const SPRINT_KMH: f64 = 20.0;

pub const GRID_COLUMNS: usize = 12;
pub const GRID_ROWS: usize = 8;

/// One observed player position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub jersey_number: Option<u32>,
    pub player_name: Option<String>,
    pub team: Team,
    pub x: f64,
    pub y: f64,
    pub timestamp: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallSample {
    pub x: f64,
    pub y: f64,
    pub timestamp: u32,
}

impl PositionSample {
    pub fn point(&self) -> FieldPoint {
        FieldPoint::new(self.x, self.y)
    }
}

impl BallSample {
    pub fn point(&self) -> FieldPoint {
        FieldPoint::new(self.x, self.y)
    }
}

#[derive(Debug, Default)]
pub struct TrackingSamples {
    pub players: Vec<PositionSample>,
    pub ball: Vec<BallSample>,
}

/// Turn detections into position samples. People are attributed to a side the same way the
/// classifier does it, then mapped to a record by their order within that side in the frame.
pub fn extract_samples(
    frames: &[FrameDetection],
    attributor: &mut TeamAttributor,
    mut ocr: Option<&mut (dyn JerseyOcr + '_)>,
    registry: &mut PlayerRegistry,
) -> TrackingSamples {
    let mut out = TrackingSamples::default();
    let mut ordered: Vec<&FrameDetection> = frames.iter().collect();
    ordered.sort_by_key(|f| f.timestamp_seconds);

    for frame in ordered {
        let extent = frame.extent();
        if let Some(ball) = frame.ball() {
            let p = ball.normalized_center(extent).clamped();
            out.ball.push(BallSample {
                x: p.x,
                y: p.y,
                timestamp: frame.timestamp_seconds,
            });
        }

        let mut per_side = [0usize; 2];
        for person in frame.persons() {
            let p = person.normalized_center(extent).clamped();
            let team = attributor.attribute(frame, Some(person), p.x);
            let slot = &mut per_side[team as usize];
            let jersey = ocr.as_mut().and_then(|ocr| ocr.read_number(frame, person));
            let player = registry.resolve(team, jersey, Some(*slot));
            *slot += 1;
            out.players.push(PositionSample {
                jersey_number: Some(player.jersey_number),
                player_name: Some(player.player_name),
                team,
                x: p.x,
                y: p.y,
                timestamp: frame.timestamp_seconds,
            });
        }
    }
    out
}

type PlayerKey = (Team, Option<u32>, Option<String>);

fn group_by_player(samples: &[PositionSample]) -> BTreeMap<PlayerKey, Vec<&PositionSample>> {
    let mut groups: BTreeMap<PlayerKey, Vec<&PositionSample>> = BTreeMap::new();
    for s in samples {
        groups
            .entry((s.team, s.jersey_number, s.player_name.clone()))
            .or_default()
            .push(s);
    }
    groups
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedPoint {
    pub x: f64,
    pub y: f64,
    pub timestamp: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatMap {
    pub team: Team,
    pub jersey_number: Option<u32>,
    pub player_name: Option<String>,
    pub positions: Vec<TimedPoint>,
}

impl HeatMap {
    /// Sample counts per cell on a 12x8 grid, scaled so the busiest cell is 1.
    pub fn density_grid(&self) -> [[f64; GRID_COLUMNS]; GRID_ROWS] {
        let mut grid = [[0.0; GRID_COLUMNS]; GRID_ROWS];
        for p in &self.positions {
            let col = ((p.x * GRID_COLUMNS as f64) as usize).min(GRID_COLUMNS - 1);
            let row = ((p.y * GRID_ROWS as f64) as usize).min(GRID_ROWS - 1);
            grid[row][col] += 1.0;
        }
        let peak = grid.iter().flatten().copied().fold(0.0, f64::max);
        if peak > 0.0 {
            for cell in grid.iter_mut().flatten() {
                *cell /= peak;
            }
        }
        grid
    }
}

pub fn heat_maps(samples: &[PositionSample]) -> Vec<HeatMap> {
    group_by_player(samples)
        .into_iter()
        .map(|((team, jersey_number, player_name), group)| {
            let mut positions: Vec<TimedPoint> = group
                .into_iter()
                .map(|s| TimedPoint {
                    x: s.x,
                    y: s.y,
                    timestamp: s.timestamp,
                })
                .collect();
            positions.sort_by_key(|p| p.timestamp);
            HeatMap {
                team,
                jersey_number,
                player_name,
                positions,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerMetrics {
    pub team: Option<Team>,
    pub jersey_number: Option<u32>,
    pub player_name: Option<String>,
    pub distance_covered_m: f64,
    pub max_speed_kmh: f64,
    pub average_speed_kmh: f64,
    pub walking_distance_m: f64,
    pub jogging_distance_m: f64,
    pub running_distance_m: f64,
    pub sprinting_distance_m: f64,
    pub sprint_count: u32,
    pub minutes_played: f64,
}

/// Per-player distance and speed profile. Players with fewer than two samples are skipped.
pub fn player_metrics(samples: &[PositionSample]) -> Vec<PlayerMetrics> {
    let groups: Vec<(PlayerKey, Vec<&PositionSample>)> =
        group_by_player(samples).into_iter().collect();
    groups
        .into_par_iter()
        .filter_map(|((team, jersey_number, player_name), mut group)| {
            if group.len() < 2 {
                return None;
            }
            group.sort_by_key(|s| s.timestamp);
            let mut m = walk_track(&group);
            m.team = Some(team);
            m.jersey_number = jersey_number;
            m.player_name = player_name;
            Some(m)
        })
        .collect()
}

fn walk_track(track: &[&PositionSample]) -> PlayerMetrics {
    let mut m = PlayerMetrics::default();
    let mut in_sprint = false;

    for pair in track.windows(2) {
        let (prev, curr) = (pair[0], pair[1]);
        let dt = i64::from(curr.timestamp) - i64::from(prev.timestamp);
        if dt <= 0 || dt > MAX_GAP_SECS {
            continue;
        }
        let dx = (curr.x - prev.x) * PITCH_LENGTH_M;
        let dy = (curr.y - prev.y) * PITCH_WIDTH_M;
        let metres = (dx * dx + dy * dy).sqrt();
        let kmh = metres / dt as f64 * 3.6;
        if kmh > MAX_HUMAN_KMH {
            continue;
        }

        m.distance_covered_m += metres;
        m.max_speed_kmh = m.max_speed_kmh.max(kmh);
        if kmh < WALK_KMH {
            m.walking_distance_m += metres;
        } else if kmh < JOG_KMH {
            m.jogging_distance_m += metres;
        } else if kmh < SPRINT_KMH {
            m.running_distance_m += metres;
        } else {
            m.sprinting_distance_m += metres;
            if !in_sprint {
                m.sprint_count += 1;
                in_sprint = true;
            }
        }
        if kmh < SPRINT_KMH {
            in_sprint = false;
        }
    }

    if let (Some(first), Some(last)) = (track.first(), track.last()) {
        let elapsed = f64::from(last.timestamp.saturating_sub(first.timestamp));
        m.minutes_played = elapsed / 60.0;
        if elapsed > 0.0 {
            m.average_speed_kmh = m.distance_covered_m / elapsed * 3.6;
        }
    }
    m
}

/// Copy distance and speed figures onto the matching player records.
pub fn apply_metrics(registry: &mut PlayerRegistry, metrics: &[PlayerMetrics]) {
    for m in metrics {
        let (Some(team), Some(jersey)) = (m.team, m.jersey_number) else {
            continue;
        };
        if let Some(handle) = registry.find(team, jersey) {
            let stat = registry.get_mut(handle);
            stat.distance_covered_m = m.distance_covered_m;
            stat.max_speed_kmh = m.max_speed_kmh;
            stat.average_speed_kmh = m.average_speed_kmh;
            stat.sprints = m.sprint_count;
        }
    }
}
