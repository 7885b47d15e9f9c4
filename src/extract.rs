use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::VideoMetadata;
use crate::error::ToolError;

/// Used when a probe gives nothing usable.
const PROBE_FALLBACK_DURATION_SECS: i64 = 2700;
const PROBE_FALLBACK_FPS: f32 = 30.0;

/// Which source frames to pull out of a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPlan {
    pub max_frames: u32,
    pub stride: u32,
    pub target_fps: u32,
}

impl SamplingPlan {
    pub fn new(meta: &VideoMetadata, target_fps: u32) -> Self {
        let (max_frames, stride) = meta.sampling_plan(target_fps);
        Self {
            max_frames,
            stride,
            target_fps: target_fps.max(1),
        }
    }

    /// Whole-second timestamp of the `i`-th extracted frame.
    pub fn timestamp_of(&self, i: usize) -> u32 {
        (i as u64 / u64::from(self.target_fps)) as u32
    }
}

/// Pulls still frames out of a video file. Output order is timestamp order.
pub trait FrameExtractor: Send + Sync {
    /// Duration and frame rate, already normalized. Never fails.
    fn probe(&self, video: &Path) -> VideoMetadata;

    /// Fails with [`ToolError::ExtractorUnavailable`] when the tool cannot run at all.
    fn ensure_available(&self) -> Result<()>;

    fn extract(&self, video: &Path, out_dir: &Path, plan: &SamplingPlan) -> Result<Vec<PathBuf>>;
}

#[derive(Debug, Clone)]
pub struct FfmpegExtractor {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegExtractor {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    fn probe_value(&self, video: &Path, args: &[&str]) -> Option<String> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error"])
            .args(args)
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(video)
            .output();
        match output {
            Ok(out) if out.status.success() => {
                let raw = String::from_utf8_lossy(&out.stdout).trim().to_string();
                debug!(?args, %raw, "ffprobe");
                Some(raw)
            }
            Ok(out) => {
                debug!(status = %out.status, "ffprobe exited unsuccessfully");
                None
            }
            Err(err) => {
                debug!(%err, "ffprobe could not be started");
                None
            }
        }
    }
}

/// `ffprobe` duration output, in whole seconds.
pub fn parse_duration(raw: &str) -> Option<i64> {
    raw.lines()
        .next()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite())
        .map(|d| d as i64)
}

/// `ffprobe` `r_frame_rate` output such as `30000/1001`.
pub fn parse_frame_rate(raw: &str) -> Option<f32> {
    let (num, den) = raw.lines().next()?.trim().split_once('/')?;
    let num = num.trim().parse::<f64>().ok()?;
    let den = den.trim().parse::<f64>().ok()?;
    (den > 0.0).then(|| (num / den) as f32)
}

impl FrameExtractor for FfmpegExtractor {
    fn probe(&self, video: &Path) -> VideoMetadata {
        let duration = self
            .probe_value(video, &["-show_entries", "format=duration"])
            .and_then(|raw| parse_duration(&raw))
            .unwrap_or(PROBE_FALLBACK_DURATION_SECS);
        let fps = self
            .probe_value(
                video,
                &["-select_streams", "v:0", "-show_entries", "stream=r_frame_rate"],
            )
            .and_then(|raw| parse_frame_rate(&raw))
            .unwrap_or(PROBE_FALLBACK_FPS);
        VideoMetadata::normalized(duration, fps)
    }

    fn ensure_available(&self) -> Result<()> {
        match Command::new(&self.ffmpeg).arg("-version").output() {
            Ok(out) if out.status.success() => Ok(()),
            Ok(out) => Err(ToolError::ExtractorUnavailable(format!(
                "{} -version exited with {}",
                self.ffmpeg, out.status
            ))
            .into()),
            Err(err) => Err(ToolError::ExtractorUnavailable(format!("{}: {err}", self.ffmpeg)).into()),
        }
    }

    fn extract(&self, video: &Path, out_dir: &Path, plan: &SamplingPlan) -> Result<Vec<PathBuf>> {
        let select = format!("select='not(mod(n\\,{}))'", plan.stride);
        let pattern = out_dir.join("frame_%04d.jpg");
        info!(
            video = %video.display(),
            stride = plan.stride,
            max_frames = plan.max_frames,
            "extracting frames"
        );
        let out = Command::new(&self.ffmpeg)
            .args(["-y", "-nostdin", "-i"])
            .arg(video)
            .args(["-vf", &select, "-vsync", "vfr", "-q:v", "2"])
            .args(["-frames:v", &plan.max_frames.to_string()])
            .arg(&pattern)
            .output()
            .map_err(|err| ToolError::ExtractorUnavailable(format!("{}: {err}", self.ffmpeg)))?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let tail: String = stderr.lines().rev().take(3).collect::<Vec<_>>().join(" | ");
            return Err(ToolError::ExtractionFailed(tail).into());
        }
        list_frames(out_dir)
    }
}

/// Extracted `.jpg` frames in name order.
pub fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut frames: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("read frame dir {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("jpg"))
        })
        .collect();
    frames.sort();
    Ok(frames)
}

/// Per-run scratch directory for extracted frames. Removed on drop, on every exit path.
#[derive(Debug)]
pub struct TempFrameDir {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl TempFrameDir {
    pub fn create(analysis_id: Uuid) -> Result<Self> {
        Self::create_in(&std::env::temp_dir(), analysis_id)
    }

    pub fn create_in(parent: &Path, analysis_id: Uuid) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("pitchscope_{analysis_id}_"))
            .tempdir_in(parent)
            .with_context(|| format!("create frame dir under {}", parent.display()))?;
        let path = dir.path().to_path_buf();
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFrameDir {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        if let Err(err) = dir.close() {
            warn!(path = %self.path.display(), %err, "failed to remove frame dir");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rate_parses_fractions() {
        let fps = parse_frame_rate("30000/1001\n").expect("fps");
        assert!((fps - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("25/0"), None);
        assert_eq!(parse_frame_rate("N/A"), None);
    }

    #[test]
    fn duration_truncates_to_seconds() {
        assert_eq!(parse_duration("5421.733000"), Some(5421));
        assert_eq!(parse_duration("N/A"), None);
    }

    #[test]
    fn plan_timestamps_follow_target_rate() {
        let meta = VideoMetadata::normalized(60, 25.0);
        let plan = SamplingPlan::new(&meta, 5);
        assert_eq!(plan.stride, 5);
        assert_eq!(plan.max_frames, 300);
        assert_eq!(plan.timestamp_of(4), 0);
        assert_eq!(plan.timestamp_of(5), 1);
    }

    #[test]
    fn frame_dir_is_removed_on_drop() {
        let parent = tempfile::tempdir().expect("parent");
        let path = {
            let dir = TempFrameDir::create_in(parent.path(), Uuid::nil()).expect("create");
            fs::write(dir.path().join("frame_0001.jpg"), b"x").expect("write");
            fs::write(dir.path().join("notes.txt"), b"x").expect("write");
            assert_eq!(list_frames(dir.path()).expect("list").len(), 1);
            dir.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
