//! Ball ownership tracking and heuristic event classification.
//!
//! The classifier walks candidate frames in time order, carrying a [`BallTrack`] from one sample
//! to the next. Each step looks at how far the ball moved and whether the nearest player
//! changed, and emits at most one event for that transition.

use rand::Rng;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{EventThresholds, FALLBACK_EVENT_LIMIT};
use crate::detection::{DetectedObject, FrameDetection, candidate_frames};
use crate::detector::JerseyOcr;
use crate::events::{EventType, MatchEvent, event_id, sort_timeline};
use crate::pitch::{FieldPoint, event_distance_m};
use crate::players::{PlayerOrigin, PlayerRegistry, PlayerStat, ResolvedPlayer, UNKNOWN_PLAYER};
use crate::roster::{ManualGoal, Team};
use crate::team_attribution::TeamAttributor;

/// Nearest person to the ball inside the ownership radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Owner {
    /// Index into the frame's person boxes.
    pub index: usize,
    pub position: FieldPoint,
    /// Normalized distance to the ball.
    pub distance: f64,
}

/// What one candidate frame says about the ball.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub timestamp: u32,
    pub ball: FieldPoint,
    pub owner: Option<Owner>,
}

/// Normalize the frame and find the ball owner. `None` when the frame has no ball.
pub fn observe(frame: &FrameDetection, thresholds: &EventThresholds) -> Option<Observation> {
    let ball = frame.ball()?;
    let extent = frame.extent();
    let ball_point = ball.normalized_center(extent);

    let nearest = frame
        .persons()
        .into_iter()
        .enumerate()
        .map(|(index, p)| (index, p.normalized_center(extent)))
        .min_by(|a, b| a.1.dist_sq(ball_point).total_cmp(&b.1.dist_sq(ball_point)));

    let owner = nearest
        .filter(|(_, p)| p.field_dist_m(ball_point) < thresholds.ownership_radius_m)
        .map(|(index, position)| Owner {
            index,
            position,
            distance: position.dist(ball_point),
        });

    Some(Observation {
        timestamp: frame.timestamp_seconds,
        ball: ball_point,
        owner,
    })
}

/// State carried between consecutive ball samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BallTrack {
    pub prev_ball: Option<FieldPoint>,
    pub prev_owner: Option<usize>,
    pub prev_team: Option<Team>,
    pub prev_player: Option<ResolvedPlayer>,
}

impl BallTrack {
    pub fn has_prev(&self) -> bool {
        self.prev_ball.is_some()
    }

    /// A frame without a ball: nothing may span the gap. Ownership history is kept.
    pub fn gap(self) -> Self {
        Self {
            prev_ball: None,
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub event_type: EventType,
    pub details: String,
    pub successful: bool,
    pub start: FieldPoint,
    pub end: FieldPoint,
}

/// One transition of the state machine. Returns the next track and the event for this
/// transition, if any. The track always advances to the current sample.
pub fn step<R: Rng + ?Sized>(
    track: BallTrack,
    obs: &Observation,
    team: Team,
    player: &ResolvedPlayer,
    t: &EventThresholds,
    rng: &mut R,
) -> (BallTrack, Option<Classification>) {
    let classified = track
        .prev_ball
        .and_then(|prev| classify_transition(&track, prev, obs, team, player, t, rng));

    let next = BallTrack {
        prev_ball: Some(obs.ball),
        prev_owner: obs.owner.map(|o| o.index).or(track.prev_owner),
        prev_team: Some(team),
        prev_player: Some(player.clone()),
    };
    (next, classified)
}

fn classify_transition<R: Rng + ?Sized>(
    track: &BallTrack,
    prev: FieldPoint,
    obs: &Observation,
    team: Team,
    player: &ResolvedPlayer,
    t: &EventThresholds,
    rng: &mut R,
) -> Option<Classification> {
    let ball = obs.ball;
    let moved = prev.dist(ball);
    let owner_changed = match (track.prev_owner, obs.owner) {
        (Some(prev_owner), Some(owner)) => prev_owner != owner.index,
        _ => false,
    };
    let owner_kept = match (track.prev_owner, obs.owner) {
        (Some(prev_owner), Some(owner)) => prev_owner == owner.index,
        _ => false,
    };
    let owner_close = obs.owner.is_some_and(|o| o.distance < t.close_range);

    let (event_type, details, successful) = if moved > t.shot_move && t.near_goal_line(ball.x) {
        let in_mouth_now = t.in_goal_mouth(ball.y);
        let in_mouth_prev = t.in_goal_mouth(prev.y);
        let crosses_left = prev.x > t.goal_line_band && ball.x < t.net_edge;
        let crosses_right = prev.x < 1.0 - t.goal_line_band && ball.x > 1.0 - t.net_edge;
        let crossed_net = (crosses_left || crosses_right) && in_mouth_now && in_mouth_prev;
        let parked_in_net = in_mouth_now && (ball.x < t.net_edge || ball.x > 1.0 - t.net_edge);

        if crossed_net || parked_in_net {
            (
                EventType::GoalScored,
                format!("Goal scored by {}", player.player_name),
                true,
            )
        } else if in_mouth_now {
            (EventType::Shot, "Shot on target".to_string(), true)
        } else {
            (EventType::Shot, "Shot off target".to_string(), false)
        }
    } else if owner_changed && moved > t.pass_move {
        let same_side = track.prev_team.is_none_or(|prev_team| prev_team == team);
        let midline_flip = (ball.x - 0.5).abs() < t.midline_band && (prev.x - 0.5).abs() < t.midline_band;
        if same_side || midline_flip {
            let details = match track.prev_player.as_ref() {
                Some(from) if from.player_name != UNKNOWN_PLAYER => {
                    format!("Pass from {} to {}", from.player_name, player.player_name)
                }
                _ => "Pass between teammates".to_string(),
            };
            (EventType::Pass, details, true)
        } else {
            (
                EventType::Interception,
                "Possession change / interception".to_string(),
                true,
            )
        }
    } else if owner_changed && owner_close {
        // A short contested change of owner looks the same for a tackle and an interception.
        let tackle = moved <= t.dribble_move || rng.gen_range(0..100) < t.tackle_share_pct;
        if tackle {
            (EventType::Tackle, "Defensive tackle".to_string(), true)
        } else {
            (EventType::Interception, "Interception".to_string(), true)
        }
    } else if owner_kept && moved >= t.dribble_move {
        let successful = rng.gen_range(0..100) < t.dribble_success_pct;
        (EventType::Dribble, "Ball dribble".to_string(), successful)
    } else if owner_close && moved < t.dribble_move && rng.gen_range(0..100) < t.recovery_pct {
        (EventType::BallRecovery, "Ball recovery".to_string(), true)
    } else {
        return None;
    };

    Some(Classification {
        event_type,
        details,
        successful,
        start: prev.clamped(),
        end: ball.clamped(),
    })
}

/// Drives the state machine over a whole detection stream.
pub struct EventClassifier {
    analysis_id: Uuid,
    thresholds: EventThresholds,
    max_events: usize,
    fallback_events: bool,
    attributor: TeamAttributor,
    ocr: Option<Box<dyn JerseyOcr>>,
    emitted: usize,
}

impl EventClassifier {
    pub fn new(analysis_id: Uuid, thresholds: EventThresholds, max_events: usize) -> Self {
        Self {
            analysis_id,
            thresholds,
            max_events,
            fallback_events: false,
            attributor: TeamAttributor::positional(),
            ocr: None,
            emitted: 0,
        }
    }

    pub fn with_attributor(mut self, attributor: TeamAttributor) -> Self {
        self.attributor = attributor;
        self
    }

    pub fn with_ocr(mut self, ocr: Option<Box<dyn JerseyOcr>>) -> Self {
        self.ocr = ocr;
        self
    }

    pub fn with_fallback_events(mut self, enabled: bool) -> Self {
        self.fallback_events = enabled;
        self
    }

    /// Manual goals first, then heuristic events, as one timestamp-ordered timeline.
    pub fn run<R: Rng + ?Sized>(
        &mut self,
        frames: &[FrameDetection],
        goals: &[ManualGoal],
        registry: &mut PlayerRegistry,
        rng: &mut R,
    ) -> Vec<MatchEvent> {
        let mut events = self.manual_goal_events(goals, registry, rng);
        let candidates = candidate_frames(frames);

        let heuristic = self.classify_frames(&candidates, registry, rng);
        let heuristic = if heuristic.is_empty() && self.fallback_events {
            self.random_events(&candidates, registry, rng)
        } else {
            heuristic
        };
        events.extend(heuristic);
        sort_timeline(&mut events);

        info!(
            frames = frames.len(),
            candidates = candidates.len(),
            events = events.len(),
            passes = count(&events, EventType::Pass),
            shots = count(&events, EventType::Shot),
            goals = count(&events, EventType::GoalScored),
            tackles = count(&events, EventType::Tackle),
            "classified detection stream"
        );
        events
    }

    fn next_id(&mut self) -> Uuid {
        let id = event_id(self.analysis_id, self.emitted);
        self.emitted += 1;
        id
    }

    fn manual_goal_events<R: Rng + ?Sized>(
        &mut self,
        goals: &[ManualGoal],
        registry: &mut PlayerRegistry,
        rng: &mut R,
    ) -> Vec<MatchEvent> {
        let mut out = Vec::with_capacity(goals.len());
        for goal in goals {
            let scorer = goal.player_name.trim();
            let handle = match registry.find(goal.team, goal.jersey_number) {
                Some(handle) => handle,
                None => registry.insert(PlayerStat::new(
                    goal.team,
                    goal.jersey_number,
                    if scorer.is_empty() { UNKNOWN_PLAYER } else { scorer },
                    None,
                    PlayerOrigin::GoalScorer,
                )),
            };
            let player_name = if scorer.is_empty() {
                registry.get(handle).player_name.clone()
            } else {
                scorer.to_string()
            };

            // Goals end at the opponent's goal: Home attacks towards x = 1.
            let (x_start, x_end) = match goal.team {
                Team::Home => (0.7, 0.95),
                Team::Away => (0.3, 0.05),
            };
            let y = 0.45 + f64::from(rng.gen_range(-10..=10_i32)) / 100.0;
            let distance_meters = 10.0 + f64::from(rng.gen_range(0..15_u32));

            let id = self.next_id();
            out.push(MatchEvent {
                id,
                analysis_id: self.analysis_id,
                event_type: EventType::GoalScored,
                timestamp: goal.timestamp_seconds,
                jersey_number: Some(goal.jersey_number),
                details: format!("Goal scored by {player_name}"),
                player_name,
                team: goal.team,
                successful: Some(true),
                x_start,
                y_start: y,
                x_end,
                y_end: y,
                distance_meters,
            });
        }
        out
    }

    fn classify_frames<R: Rng + ?Sized>(
        &mut self,
        candidates: &[&FrameDetection],
        registry: &mut PlayerRegistry,
        rng: &mut R,
    ) -> Vec<MatchEvent> {
        let mut out = Vec::new();
        let mut track = BallTrack::default();

        for frame in candidates {
            if out.len() >= self.max_events {
                debug!(cap = self.max_events, "event cap reached");
                break;
            }
            let Some(obs) = observe(frame, &self.thresholds) else {
                track = track.gap();
                continue;
            };

            let persons = frame.persons();
            let owner_box: Option<&DetectedObject> =
                obs.owner.and_then(|o| persons.get(o.index).copied());
            let field_x = obs.owner.map(|o| o.position.x).unwrap_or(obs.ball.x);
            let team = self.attributor.attribute(frame, owner_box, field_x);
            let jersey = match (owner_box, self.ocr.as_mut()) {
                (Some(person), Some(ocr)) => ocr.read_number(frame, person),
                _ => None,
            };
            let player = registry.resolve(team, jersey, obs.owner.map(|o| o.index));

            let (next, classified) = step(track, &obs, team, &player, &self.thresholds, rng);
            track = next;

            if let Some(c) = classified {
                debug!(
                    kind = %c.event_type,
                    t = obs.timestamp,
                    bx = obs.ball.x,
                    by = obs.ball.y,
                    %team,
                    jersey = player.jersey_number,
                    "event"
                );
                let id = self.next_id();
                out.push(MatchEvent {
                    id,
                    analysis_id: self.analysis_id,
                    event_type: c.event_type,
                    timestamp: obs.timestamp,
                    jersey_number: Some(player.jersey_number),
                    player_name: player.player_name.clone(),
                    team,
                    details: c.details,
                    successful: Some(c.successful),
                    x_start: c.start.x,
                    y_start: c.start.y,
                    x_end: c.end.x,
                    y_end: c.end.y,
                    distance_meters: event_distance_m(c.start, c.end),
                });
            }
        }
        out
    }

    /// Opt-in filler when the heuristics found nothing at all.
    fn random_events<R: Rng + ?Sized>(
        &mut self,
        candidates: &[&FrameDetection],
        registry: &PlayerRegistry,
        rng: &mut R,
    ) -> Vec<MatchEvent> {
        let limit = FALLBACK_EVENT_LIMIT.min(candidates.len());
        let mut out = Vec::with_capacity(limit);
        for frame in candidates.iter().take(limit) {
            let roll = rng.gen_range(0..100);
            let event_type = match roll {
                0..=59 => EventType::Pass,
                60..=79 => EventType::Shot,
                80..=94 => EventType::Tackle,
                _ => EventType::Dribble,
            };
            let start = FieldPoint::new(rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0));
            let end = FieldPoint::new(
                start.x + rng.gen_range(-0.15..0.15),
                start.y + rng.gen_range(-0.15..0.15),
            )
            .clamped();
            let team = if rng.gen_bool(0.5) { Team::Home } else { Team::Away };
            let jersey = rng.gen_range(1..12u32);
            let player_name = registry
                .find(team, jersey)
                .map(|h| registry.get(h).player_name.clone())
                .unwrap_or_else(|| UNKNOWN_PLAYER.to_string());

            let (details, successful) = match event_type {
                EventType::Pass => ("Pass between teammates", rng.gen_range(0..100) >= 25),
                EventType::Shot => {
                    if rng.gen_range(0..100) > 50 {
                        ("Shot on target", true)
                    } else {
                        ("Shot off target", false)
                    }
                }
                EventType::Tackle => ("Defensive tackle", rng.gen_range(0..100) >= 30),
                _ => ("Ball dribble", rng.gen_range(0..100) >= 40),
            };

            let id = self.next_id();
            out.push(MatchEvent {
                id,
                analysis_id: self.analysis_id,
                event_type,
                timestamp: frame.timestamp_seconds,
                jersey_number: Some(jersey),
                player_name,
                team,
                details: details.to_string(),
                successful: Some(successful),
                x_start: start.x,
                y_start: start.y,
                x_end: end.x,
                y_end: end.y,
                distance_meters: event_distance_m(start, end),
            });
        }
        info!(events = out.len(), "no events inferred, filled with random events");
        out
    }
}

fn count(events: &[MatchEvent], kind: EventType) -> usize {
    events.iter().filter(|e| e.event_type == kind).count()
}
