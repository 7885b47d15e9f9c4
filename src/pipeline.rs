//! One analysis run from video (or a recorded detection stream) to results.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, bail};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregate::{MatchTotals, replay_events};
use crate::classifier::EventClassifier;
use crate::config::{AnalysisConfig, CameraAngle, VideoMetadata};
use crate::detection::{FrameDetection, estimate_player_count};
use crate::detector::{DetectorLoader, JerseyOcr};
use crate::error::is_degraded;
use crate::events::MatchEvent;
use crate::extract::{FrameExtractor, SamplingPlan, TempFrameDir};
use crate::formation::{FormationSnapshot, detect_formation};
use crate::movement::{HeatMap, PlayerMetrics, apply_metrics, extract_samples, heat_maps, player_metrics};
use crate::players::{PlayerRegistry, PlayerStat};
use crate::possession::{PassNetwork, PossessionSummary, pass_network, possession};
use crate::roster::{MatchSetup, Team};
use crate::team_attribution::{ColorSampler, ImageColorSampler, TeamAttributor};

/// Receives `(percent, message)` at fixed checkpoints. Values never decrease within a run.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: u8, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(u8, &str) + Send + Sync,
{
    fn report(&self, percent: u8, message: &str) {
        self(percent, message)
    }
}

pub type OcrFactory = Arc<dyn Fn() -> Box<dyn JerseyOcr> + Send + Sync>;

#[derive(Debug, Clone)]
pub enum AnalysisSource {
    Video(PathBuf),
    /// A detection stream produced elsewhere. Extraction and detection are skipped.
    Detections {
        frames: Vec<FrameDetection>,
        metadata: VideoMetadata,
    },
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub analysis_id: Uuid,
    pub setup: MatchSetup,
    pub config: AnalysisConfig,
}

impl AnalysisRequest {
    /// The configured seed, or one derived from the analysis id.
    pub fn seed(&self) -> u64 {
        self.config.seed.unwrap_or_else(|| {
            let bytes = self.analysis_id.as_bytes();
            let mut head = [0u8; 8];
            head.copy_from_slice(&bytes[..8]);
            u64::from_le_bytes(head)
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analytics {
    pub heat_maps: Vec<HeatMap>,
    pub player_metrics: Vec<PlayerMetrics>,
    pub possession: Option<PossessionSummary>,
    pub pass_network: PassNetwork,
    pub formations: Vec<FormationSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub analysis_id: Uuid,
    pub camera_angle: CameraAngle,
    pub metadata: VideoMetadata,
    /// Produced by the degraded path: totals are mock figures, players are placeholders.
    pub synthetic: bool,
    pub events: Vec<MatchEvent>,
    pub players: Vec<PlayerStat>,
    pub totals: MatchTotals,
    pub analytics: Analytics,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(Box<AnalysisResult>),
    Cancelled,
}

pub struct Pipeline {
    extractor: Arc<dyn FrameExtractor>,
    loader: Arc<dyn DetectorLoader>,
    ocr: Option<OcrFactory>,
}

impl Pipeline {
    pub fn new(extractor: Arc<dyn FrameExtractor>, loader: Arc<dyn DetectorLoader>) -> Self {
        Self {
            extractor,
            loader,
            ocr: None,
        }
    }

    pub fn with_ocr(mut self, ocr: Option<OcrFactory>) -> Self {
        self.ocr = ocr;
        self
    }

    /// Runs to completion unless `cancel` is raised; it is checked between stages. Missing
    /// tools degrade to a synthetic result, anything else is returned as an error.
    pub fn run(
        &self,
        request: &AnalysisRequest,
        source: &AnalysisSource,
        progress: &dyn ProgressSink,
        cancel: &AtomicBool,
    ) -> Result<RunOutcome> {
        let mut rng = ChaCha8Rng::seed_from_u64(request.seed());
        info!(analysis = %request.analysis_id, camera = %request.config.camera_angle, "analysis started");

        match source {
            AnalysisSource::Detections { frames, metadata } => {
                progress.report(5, "Detections loaded");
                if cancelled(cancel) {
                    return Ok(RunOutcome::Cancelled);
                }
                progress.report(35, "Frames ready");
                progress.report(85, "Detection complete");
                self.finish(request, frames, *metadata, progress, cancel, &mut rng)
            }
            AnalysisSource::Video(video) => {
                if !video.is_file() {
                    bail!("video file not found: {}", video.display());
                }
                let metadata = self.extractor.probe(video);
                info!(
                    duration_secs = metadata.duration_secs,
                    fps = metadata.fps,
                    "video metadata"
                );
                progress.report(5, "Video metadata read");
                if cancelled(cancel) {
                    return Ok(RunOutcome::Cancelled);
                }

                // Frames live here until the function returns, on every path.
                let frame_dir = TempFrameDir::create(request.analysis_id)?;
                let frames = match self.detect_video(request, video, &frame_dir, metadata, progress, cancel) {
                    Ok(Some(frames)) => frames,
                    Ok(None) => return Ok(RunOutcome::Cancelled),
                    Err(err) if is_degraded(&err) => {
                        warn!(error = %format!("{err:#}"), "external tool unavailable, using synthetic analysis");
                        let result = synthetic_result(request, metadata, progress, &mut rng);
                        progress.report(100, "Analysis complete (synthetic)");
                        return Ok(RunOutcome::Completed(Box::new(result)));
                    }
                    Err(err) => return Err(err),
                };
                progress.report(85, "Detection complete");
                self.finish(request, &frames, metadata, progress, cancel, &mut rng)
            }
        }
    }

    fn finish(
        &self,
        request: &AnalysisRequest,
        frames: &[FrameDetection],
        metadata: VideoMetadata,
        progress: &dyn ProgressSink,
        cancel: &AtomicBool,
        rng: &mut ChaCha8Rng,
    ) -> Result<RunOutcome> {
        if cancelled(cancel) {
            return Ok(RunOutcome::Cancelled);
        }
        let result = self.analyze(request, frames, metadata, rng);
        progress.report(95, "Analysis generated");
        if cancelled(cancel) {
            return Ok(RunOutcome::Cancelled);
        }
        progress.report(100, "Analysis complete");
        Ok(RunOutcome::Completed(Box::new(result)))
    }

    /// `Ok(None)` when cancelled between extraction and detection.
    fn detect_video(
        &self,
        request: &AnalysisRequest,
        video: &std::path::Path,
        frame_dir: &TempFrameDir,
        metadata: VideoMetadata,
        progress: &dyn ProgressSink,
        cancel: &AtomicBool,
    ) -> Result<Option<Vec<FrameDetection>>> {
        self.extractor.ensure_available()?;
        let plan = SamplingPlan::new(&metadata, request.config.target_fps);
        let paths = self.extractor.extract(video, frame_dir.path(), &plan)?;
        info!(frames = paths.len(), "frames extracted");
        progress.report(35, "Frames extracted");
        if cancelled(cancel) {
            return Ok(None);
        }

        let mut detector = self.loader.load(&request.config.model_path)?;
        let total = paths.len();
        let mut frames = Vec::with_capacity(total);
        for (i, path) in paths.into_iter().enumerate() {
            let objects = detector.detect(&path).unwrap_or_else(|err| {
                warn!(frame = i, error = %format!("{err:#}"), "detection failed for frame");
                Vec::new()
            });
            frames.push(FrameDetection {
                frame_index: i as u32,
                timestamp_seconds: plan.timestamp_of(i),
                objects,
                frame_path: Some(path),
            });
            if i % 5 == 0 || i + 1 == total {
                let percent = 35 + (i * 50 / total.max(1)) as u8;
                progress.report(percent, "Detecting objects");
            }
        }
        Ok(Some(frames))
    }

    fn attributor(&self, setup: &MatchSetup) -> TeamAttributor {
        let colors = setup.reference_colors();
        let sampler: Option<Box<dyn ColorSampler>> = colors
            .is_some()
            .then(|| Box::new(ImageColorSampler::new()) as Box<dyn ColorSampler>);
        TeamAttributor::new(colors, sampler)
    }

    /// Classification, aggregation and movement analytics over a detection stream.
    pub fn analyze<R: Rng + ?Sized>(
        &self,
        request: &AnalysisRequest,
        frames: &[FrameDetection],
        metadata: VideoMetadata,
        rng: &mut R,
    ) -> AnalysisResult {
        let setup = &request.setup;
        let config = &request.config;
        let mut registry = PlayerRegistry::seeded(setup, estimate_player_count(frames));

        let mut classifier = EventClassifier::new(request.analysis_id, config.thresholds(), config.max_events)
            .with_attributor(self.attributor(setup))
            .with_ocr(self.ocr.as_ref().map(|make| make()))
            .with_fallback_events(config.fallback_events);
        let events = classifier.run(frames, &setup.goals, &mut registry, rng);

        let mut attributor = self.attributor(setup);
        let mut ocr = self.ocr.as_ref().map(|make| make());
        let samples = extract_samples(frames, &mut attributor, ocr.as_deref_mut(), &mut registry);

        let metrics = player_metrics(&samples.players);
        apply_metrics(&mut registry, &metrics);
        replay_events(&mut registry, &events);

        let analytics = Analytics {
            heat_maps: heat_maps(&samples.players),
            possession: possession(&samples.players, &samples.ball),
            pass_network: pass_network(&samples.players, &samples.ball),
            formations: Team::BOTH
                .into_iter()
                .filter_map(|team| detect_formation(&samples.players, team))
                .collect(),
            player_metrics: metrics,
        };

        let players = registry.into_stats();
        let totals = MatchTotals::from_stats(&players);
        info!(
            events = events.len(),
            players = players.len(),
            passes = totals.total_passes,
            shots = totals.total_shots,
            "analysis generated"
        );
        AnalysisResult {
            analysis_id: request.analysis_id,
            camera_angle: config.camera_angle,
            metadata,
            synthetic: false,
            events,
            players,
            totals,
            analytics,
        }
    }
}

fn cancelled(cancel: &AtomicBool) -> bool {
    let hit = cancel.load(Ordering::SeqCst);
    if hit {
        info!("cancellation requested, stopping between stages");
    }
    hit
}

/// Mock figures scaled by match length, with roster or placeholder players and no events.
pub fn synthetic_result<R: Rng + ?Sized>(
    request: &AnalysisRequest,
    metadata: VideoMetadata,
    progress: &dyn ProgressSink,
    rng: &mut R,
) -> AnalysisResult {
    for percent in (40..=90).step_by(10) {
        progress.report(percent, "Generating synthetic analysis");
    }

    let minutes = metadata.match_minutes();
    let totals = MatchTotals {
        total_passes: minutes * 8,
        passes_completed: 0,
        pass_completion_rate: 78.0 + f64::from(rng.gen_range(-5..5_i32)),
        total_shots: (minutes / 5).max(1),
        shots_on_target: (minutes / 8).max(1),
        goals: 0,
        total_tackles: minutes / 2,
        tackles_won: minutes * 2 / 5,
        total_distance_covered_m: f64::from(minutes) * 110.0 * 1000.0,
        average_speed_kmh: 6.5,
    };
    let players = PlayerRegistry::seeded(&request.setup, 22).into_stats();

    AnalysisResult {
        analysis_id: request.analysis_id,
        camera_angle: request.config.camera_angle,
        metadata,
        synthetic: true,
        events: Vec::new(),
        players,
        totals,
        analytics: Analytics::default(),
    }
}
