use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pitch::FieldPoint;
use crate::roster::Team;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Pass,
    Shot,
    Tackle,
    Interception,
    Dribble,
    BallRecovery,
    GoalScored,
    Foul,
    FoulReceived,
    Clearance,
    ShotBlocked,
    Aerial,
    SubstitutionOn,
    SubstitutionOff,
    YellowCard,
    RedCard,
}

impl EventType {
    pub const ALL: [EventType; 16] = [
        EventType::Pass,
        EventType::Shot,
        EventType::Tackle,
        EventType::Interception,
        EventType::Dribble,
        EventType::BallRecovery,
        EventType::GoalScored,
        EventType::Foul,
        EventType::FoulReceived,
        EventType::Clearance,
        EventType::ShotBlocked,
        EventType::Aerial,
        EventType::SubstitutionOn,
        EventType::SubstitutionOff,
        EventType::YellowCard,
        EventType::RedCard,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Pass => "Pass",
            EventType::Shot => "Shot",
            EventType::Tackle => "Tackle",
            EventType::Interception => "Interception",
            EventType::Dribble => "Dribble",
            EventType::BallRecovery => "BallRecovery",
            EventType::GoalScored => "GoalScored",
            EventType::Foul => "Foul",
            EventType::FoulReceived => "FoulReceived",
            EventType::Clearance => "Clearance",
            EventType::ShotBlocked => "ShotBlocked",
            EventType::Aerial => "Aerial",
            EventType::SubstitutionOn => "SubstitutionOn",
            EventType::SubstitutionOff => "SubstitutionOff",
            EventType::YellowCard => "YellowCard",
            EventType::RedCard => "RedCard",
        }
    }

    /// Types the video heuristics can emit on their own.
    pub fn is_vision_derived(self) -> bool {
        matches!(
            self,
            EventType::Pass
                | EventType::Shot
                | EventType::Tackle
                | EventType::Interception
                | EventType::Dribble
                | EventType::BallRecovery
                | EventType::GoalScored
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(|| anyhow!("unknown event type: {raw}"))
    }
}

/// One classified match event. Coordinates are normalized and clamped to the pitch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchEvent {
    pub id: Uuid,
    pub analysis_id: Uuid,
    pub event_type: EventType,
    pub timestamp: u32,
    pub jersey_number: Option<u32>,
    pub player_name: String,
    pub team: Team,
    pub details: String,
    pub successful: Option<bool>,
    pub x_start: f64,
    pub y_start: f64,
    pub x_end: f64,
    pub y_end: f64,
    pub distance_meters: f64,
}

impl MatchEvent {
    pub fn start(&self) -> FieldPoint {
        FieldPoint::new(self.x_start, self.y_start)
    }

    pub fn end(&self) -> FieldPoint {
        FieldPoint::new(self.x_end, self.y_end)
    }
}

/// Event ids are derived from the analysis id and the emission sequence so a rerun over the same
/// input reproduces them.
pub fn event_id(analysis_id: Uuid, seq: usize) -> Uuid {
    Uuid::new_v5(&analysis_id, format!("event-{seq}").as_bytes())
}

/// Stable timeline order. Equal timestamps keep emission order.
pub fn sort_timeline(events: &mut [MatchEvent]) {
    events.sort_by_key(|e| e.timestamp);
}
