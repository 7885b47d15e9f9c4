use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Team {
    #[serde(rename = "Home Team", alias = "home", alias = "Home")]
    Home,
    #[serde(rename = "Away Team", alias = "away", alias = "Away")]
    Away,
}

impl Team {
    pub const BOTH: [Team; 2] = [Team::Home, Team::Away];

    pub fn label(self) -> &'static str {
        match self {
            Team::Home => "Home Team",
            Team::Away => "Away Team",
        }
    }

    pub fn from_label(raw: &str) -> Option<Team> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "home team" | "home" => Some(Team::Home),
            "away team" | "away" => Some(Team::Away),
            _ => None,
        }
    }

    pub fn opponent(self) -> Team {
        match self {
            Team::Home => Team::Away,
            Team::Away => Team::Home,
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const GRAY: Rgb = Rgb {
        r: 128,
        g: 128,
        b: 128,
    };
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// `#RRGGBB` or `RRGGBB`. Anything else reads as black.
    pub fn from_hex(raw: &str) -> Rgb {
        let hex = raw.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return Rgb::BLACK;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        match (channel(0), channel(2), channel(4)) {
            (Some(r), Some(g), Some(b)) => Rgb { r, g, b },
            _ => Rgb::BLACK,
        }
    }

    /// Euclidean distance in RGB space.
    pub fn distance(self, other: Rgb) -> f64 {
        let dr = f64::from(self.r) - f64::from(other.r);
        let dg = f64::from(self.g) - f64::from(other.g);
        let db = f64::from(self.b) - f64::from(other.b);
        (dr * dr + dg * dg + db * db).sqrt()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterPlayer {
    pub jersey_number: u32,
    pub name: String,
    #[serde(default)]
    pub position: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRoster {
    #[serde(default)]
    pub team_name: String,
    #[serde(default = "default_home_kit")]
    pub jersey_color_home: String,
    #[serde(default = "default_away_kit")]
    pub jersey_color_away: String,
    #[serde(default)]
    pub players: Vec<RosterPlayer>,
}

fn default_home_kit() -> String {
    "#FFFFFF".to_string()
}

fn default_away_kit() -> String {
    "#000000".to_string()
}

/// A goal entered by hand, independent of what the detector saw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualGoal {
    pub timestamp_seconds: u32,
    pub team: Team,
    pub jersey_number: u32,
    #[serde(default)]
    pub player_name: String,
}

/// Everything the caller may supply about the two sides. All of it is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchSetup {
    #[serde(default)]
    pub home: Option<TeamRoster>,
    #[serde(default)]
    pub away: Option<TeamRoster>,
    #[serde(default)]
    pub goals: Vec<ManualGoal>,
}

impl MatchSetup {
    pub fn has_roster_players(&self) -> bool {
        let count = |r: &Option<TeamRoster>| r.as_ref().map(|r| r.players.len()).unwrap_or(0);
        count(&self.home) + count(&self.away) > 0
    }

    /// Kit colours the two sides are expected to wear: home team in its home kit, away team in
    /// its away kit. Only available when both rosters were supplied.
    pub fn reference_colors(&self) -> Option<ReferenceColors> {
        let home = self.home.as_ref()?;
        let away = self.away.as_ref()?;
        Some(ReferenceColors {
            home: Rgb::from_hex(&home.jersey_color_home),
            away: Rgb::from_hex(&away.jersey_color_away),
        })
    }

    pub fn roster(&self, team: Team) -> Option<&TeamRoster> {
        match team {
            Team::Home => self.home.as_ref(),
            Team::Away => self.away.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceColors {
    pub home: Rgb,
    pub away: Rgb,
}

pub fn default_position(jersey_number: u32) -> &'static str {
    match jersey_number {
        1 => "GK",
        0..=4 => "DF",
        5..=8 => "MF",
        _ => "FW",
    }
}
