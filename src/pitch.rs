use serde::{Deserialize, Serialize};

pub const PITCH_LENGTH_M: f64 = 105.0;
pub const PITCH_WIDTH_M: f64 = 68.0;

/// A point in normalized field space, both axes in `0..=1`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldPoint {
    pub x: f64,
    pub y: f64,
}

impl FieldPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn clamped(self) -> Self {
        Self {
            x: clamp_unit(self.x),
            y: clamp_unit(self.y),
        }
    }

    /// Squared distance in normalized space. Cheap ordering key for nearest-neighbour scans.
    pub fn dist_sq(self, other: FieldPoint) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn dist(self, other: FieldPoint) -> f64 {
        self.dist_sq(other).sqrt()
    }

    /// Distance in metres, scaling x by pitch length and y by pitch width.
    pub fn field_dist_m(self, other: FieldPoint) -> f64 {
        let dx = (self.x - other.x) * PITCH_LENGTH_M;
        let dy = (self.y - other.y) * PITCH_WIDTH_M;
        (dx * dx + dy * dy).sqrt()
    }
}

pub fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

/// Straight-line normalized displacement scaled by pitch length.
///
/// This is the event distance convention: a single scale factor on both axes.
pub fn event_distance_m(start: FieldPoint, end: FieldPoint) -> f64 {
    start.dist(end) * PITCH_LENGTH_M
}
