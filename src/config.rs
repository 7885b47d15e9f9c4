use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CameraAngle {
    #[default]
    Overhead,
    Sideline,
}

impl CameraAngle {
    pub fn as_str(self) -> &'static str {
        match self {
            CameraAngle::Overhead => "Overhead",
            CameraAngle::Sideline => "Sideline",
        }
    }

    pub fn thresholds(self) -> EventThresholds {
        EventThresholds::for_angle(self)
    }
}

impl fmt::Display for CameraAngle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CameraAngle {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "overhead" | "top" | "broadcast" => Ok(CameraAngle::Overhead),
            "sideline" | "side" | "touchline" => Ok(CameraAngle::Sideline),
            other => Err(anyhow!("unknown camera angle: {other}")),
        }
    }
}

/// Tuning constants for the event state machine. Movement thresholds are in normalized
/// field units per sample; everything else is geometry on the normalized pitch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventThresholds {
    pub dribble_move: f64,
    pub pass_move: f64,
    pub shot_move: f64,
    pub close_range: f64,
    pub goal_line_band: f64,
    pub net_edge: f64,
    pub goal_mouth_low: f64,
    pub goal_mouth_high: f64,
    pub midline_band: f64,
    pub ownership_radius_m: f64,
    pub tackle_share_pct: u32,
    pub dribble_success_pct: u32,
    pub recovery_pct: u32,
}

impl EventThresholds {
    pub fn for_angle(angle: CameraAngle) -> Self {
        let base = Self {
            dribble_move: 0.01,
            pass_move: 0.03,
            shot_move: 0.08,
            close_range: 0.04,
            goal_line_band: 0.08,
            net_edge: 0.02,
            goal_mouth_low: 0.30,
            goal_mouth_high: 0.70,
            midline_band: 0.10,
            ownership_radius_m: 3.0,
            tackle_share_pct: 60,
            dribble_success_pct: 60,
            recovery_pct: 10,
        };
        match angle {
            CameraAngle::Overhead => base,
            // Perspective squashes apparent ball travel on sideline footage.
            CameraAngle::Sideline => Self {
                dribble_move: 0.008,
                pass_move: 0.015,
                shot_move: 0.05,
                ..base
            },
        }
    }

    pub fn in_goal_mouth(&self, y: f64) -> bool {
        y > self.goal_mouth_low && y < self.goal_mouth_high
    }

    pub fn near_goal_line(&self, x: f64) -> bool {
        x < self.goal_line_band || x > 1.0 - self.goal_line_band
    }
}

pub const DEFAULT_TARGET_FPS: u32 = 5;
pub const DEFAULT_MAX_EVENTS: usize = 40;
pub const FALLBACK_EVENT_LIMIT: usize = 20;

const MAX_DURATION_SECS: u32 = 7200;
const FALLBACK_DURATION_SECS: u32 = 600;
const FALLBACK_FPS: f32 = 30.0;
const MAX_FPS: f32 = 120.0;

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub camera_angle: CameraAngle,
    pub target_fps: u32,
    pub max_events: usize,
    pub seed: Option<u64>,
    pub model_path: PathBuf,
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    pub fallback_events: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            camera_angle: CameraAngle::Overhead,
            target_fps: DEFAULT_TARGET_FPS,
            max_events: DEFAULT_MAX_EVENTS,
            seed: None,
            model_path: PathBuf::from("models/yolov8n.onnx"),
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            fallback_events: false,
        }
    }
}

impl AnalysisConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        let camera_angle = env::var("PITCHSCOPE_CAMERA_ANGLE")
            .ok()
            .and_then(|val| val.parse::<CameraAngle>().ok())
            .unwrap_or(d.camera_angle);
        let target_fps = env::var("PITCHSCOPE_TARGET_FPS")
            .ok()
            .and_then(|val| val.parse::<u32>().ok())
            .unwrap_or(d.target_fps)
            .clamp(1, 30);
        let max_events = env::var("PITCHSCOPE_MAX_EVENTS")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(d.max_events)
            .clamp(1, 500);
        let seed = env::var("PITCHSCOPE_SEED")
            .ok()
            .and_then(|val| val.trim().parse::<u64>().ok());
        let model_path = env::var("PITCHSCOPE_MODEL_PATH")
            .ok()
            .filter(|val| !val.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(d.model_path);
        let ffmpeg_bin = non_empty_env("PITCHSCOPE_FFMPEG").unwrap_or(d.ffmpeg_bin);
        let ffprobe_bin = non_empty_env("PITCHSCOPE_FFPROBE").unwrap_or(d.ffprobe_bin);
        let fallback_events = env::var("PITCHSCOPE_FALLBACK_EVENTS")
            .ok()
            .map(|val| parse_bool(&val))
            .unwrap_or(d.fallback_events);

        Self {
            camera_angle,
            target_fps,
            max_events,
            seed,
            model_path,
            ffmpeg_bin,
            ffprobe_bin,
            fallback_events,
        }
    }

    pub fn thresholds(&self) -> EventThresholds {
        self.camera_angle.thresholds()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Probed video metadata after normalization. Implausible probe values are replaced, never
/// rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub duration_secs: u32,
    pub fps: f32,
}

impl VideoMetadata {
    pub fn normalized(duration_secs: i64, fps: f32) -> Self {
        let duration_secs = if duration_secs <= 0 || duration_secs > i64::from(MAX_DURATION_SECS) {
            FALLBACK_DURATION_SECS
        } else {
            duration_secs as u32
        };
        let fps = if !fps.is_finite() || fps <= 0.0 || fps > MAX_FPS {
            FALLBACK_FPS
        } else {
            fps
        };
        Self { duration_secs, fps }
    }

    pub fn match_minutes(&self) -> u32 {
        self.duration_secs / 60
    }

    /// Number of frames to sample at `target_fps`, and the source-frame stride between them.
    pub fn sampling_plan(&self, target_fps: u32) -> (u32, u32) {
        let target_fps = target_fps.max(1);
        let total = self.duration_secs.saturating_mul(target_fps);
        let stride = ((self.fps / target_fps as f32) as u32).max(1);
        (total, stride)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sideline_lowers_movement_thresholds_only() {
        let over = CameraAngle::Overhead.thresholds();
        let side = CameraAngle::Sideline.thresholds();
        assert!(side.dribble_move < over.dribble_move);
        assert!(side.pass_move < over.pass_move);
        assert!(side.shot_move < over.shot_move);
        assert_eq!(side.close_range, over.close_range);
        assert_eq!(side.ownership_radius_m, over.ownership_radius_m);
    }

    #[test]
    fn camera_angle_parses_loosely() {
        assert_eq!(
            "Sideline".parse::<CameraAngle>().expect("parse"),
            CameraAngle::Sideline
        );
        assert_eq!(
            " overhead ".parse::<CameraAngle>().expect("parse"),
            CameraAngle::Overhead
        );
        assert!("drone".parse::<CameraAngle>().is_err());
    }

    #[test]
    fn bad_metadata_is_normalized() {
        let meta = VideoMetadata::normalized(-3, 0.0);
        assert_eq!(meta.duration_secs, 600);
        assert_eq!(meta.fps, 30.0);

        let meta = VideoMetadata::normalized(90_000, 240.0);
        assert_eq!(meta.duration_secs, 600);
        assert_eq!(meta.fps, 30.0);

        let meta = VideoMetadata::normalized(120, 25.0);
        assert_eq!(meta.duration_secs, 120);
        assert_eq!(meta.fps, 25.0);
    }

    #[test]
    fn sampling_plan_strides_source_frames() {
        let meta = VideoMetadata::normalized(60, 30.0);
        assert_eq!(meta.sampling_plan(5), (300, 6));
        let meta = VideoMetadata::normalized(60, 3.0);
        assert_eq!(meta.sampling_plan(5), (300, 1));
    }
}
