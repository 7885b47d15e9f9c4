use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use pitchscope::config::{AnalysisConfig, CameraAngle, VideoMetadata};
use pitchscope::detector::DefaultDetectorLoader;
use pitchscope::extract::{FrameExtractor, SamplingPlan};
use pitchscope::pipeline::{AnalysisRequest, AnalysisSource, Pipeline, synthetic_result};
use pitchscope::roster::MatchSetup;
use pitchscope::runner::Runner;
use pitchscope::state::{AnalysisStatus, Delta, RunBoard, RunRecord, apply_delta};

struct NoVideoTools;

impl FrameExtractor for NoVideoTools {
    fn probe(&self, _video: &Path) -> VideoMetadata {
        VideoMetadata::normalized(0, 0.0)
    }

    fn ensure_available(&self) -> Result<()> {
        anyhow::bail!("not used by detection-stream runs")
    }

    fn extract(&self, _video: &Path, _out: &Path, _plan: &SamplingPlan) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }
}

/// Holds each run inside `probe` until the test releases it. Whoever holds the gate lock
/// announces itself first, so runs pass through one at a time in start order.
struct GatedVideoTools {
    gate: Mutex<Receiver<()>>,
    entered: Sender<()>,
}

impl FrameExtractor for GatedVideoTools {
    fn probe(&self, _video: &Path) -> VideoMetadata {
        let gate = self.gate.lock().expect("gate lock poisoned");
        let _ = self.entered.send(());
        let _ = gate.recv();
        VideoMetadata::normalized(600, 25.0)
    }

    fn ensure_available(&self) -> Result<()> {
        Err(pitchscope::error::ToolError::ExtractorUnavailable("gated".to_string()).into())
    }

    fn extract(&self, _video: &Path, _out: &Path, _plan: &SamplingPlan) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }
}

fn terminal_for(rx: &mpsc::Receiver<Delta>) -> Delta {
    loop {
        let delta = rx.recv_timeout(Duration::from_secs(10)).expect("terminal delta");
        if matches!(delta, Delta::Completed { .. } | Delta::Cancelled { .. } | Delta::Failed { .. }) {
            return delta;
        }
    }
}

fn request(id: Uuid) -> AnalysisRequest {
    AnalysisRequest {
        analysis_id: id,
        setup: MatchSetup::default(),
        config: AnalysisConfig::default(),
    }
}

fn board_with(id: Uuid) -> RunBoard {
    let mut board = RunBoard::new();
    board.register(RunRecord::new(id, CameraAngle::Overhead));
    board
}

fn sample_result(id: Uuid) -> Box<pitchscope::pipeline::AnalysisResult> {
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    Box::new(synthetic_result(
        &request(id),
        VideoMetadata::normalized(600, 25.0),
        &|_: u8, _: &str| {},
        &mut rng,
    ))
}

#[test]
fn runner_drives_a_run_to_completion() {
    let id = Uuid::new_v4();
    let mut board = board_with(id);
    let (tx, rx) = mpsc::channel();
    let runner = Runner::with_threads(
        Arc::new(Pipeline::new(Arc::new(NoVideoTools), Arc::new(DefaultDetectorLoader))),
        tx,
        1,
    );

    runner
        .start(
            &mut board,
            request(id),
            AnalysisSource::Detections {
                frames: Vec::new(),
                metadata: VideoMetadata::normalized(600, 25.0),
            },
        )
        .expect("start");
    assert_eq!(board.status(id).expect("status").status, AnalysisStatus::Processing);
    assert!(board.result(id).is_none());

    while let Ok(delta) = rx.recv_timeout(Duration::from_secs(10)) {
        apply_delta(&mut board, delta);
        if board.runs[&id].status.is_terminal() {
            break;
        }
    }
    let status = board.status(id).expect("status");
    assert_eq!(status.status, AnalysisStatus::Completed);
    assert_eq!(status.progress, 100);
    assert!(status.error.is_none());
    assert_eq!(board.result(id).expect("result").players.len(), 22);

    // A completed run can be regenerated, a processing one cannot be started twice.
    board.begin(id).expect("regenerate");
    assert!(board.begin(id).is_err());
}

#[test]
fn progress_never_moves_backwards() {
    let id = Uuid::new_v4();
    let mut board = board_with(id);
    board.begin(id).expect("begin");
    for (percent, message) in [(35, "Frames extracted"), (20, "late"), (85, "Detection complete")] {
        apply_delta(
            &mut board,
            Delta::Progress {
                id,
                percent,
                message: message.to_string(),
            },
        );
        if percent == 20 {
            assert_eq!(board.runs[&id].progress, 35);
            assert_eq!(board.runs[&id].message, "Frames extracted");
        }
    }
    assert_eq!(board.runs[&id].progress, 85);
}

#[test]
fn failure_records_the_error() {
    let id = Uuid::new_v4();
    let mut board = board_with(id);
    board.begin(id).expect("begin");
    apply_delta(
        &mut board,
        Delta::Failed {
            id,
            error: "video file not found: /x.mp4".to_string(),
        },
    );
    let status = board.status(id).expect("status");
    assert_eq!(status.status, AnalysisStatus::Failed);
    assert_eq!(status.error.as_deref(), Some("video file not found: /x.mp4"));
    assert!(board.result(id).is_none());
    assert!(board.logs.back().expect("log").starts_with("[ERROR]"));
}

#[test]
fn cancel_only_applies_to_processing_runs() {
    let id = Uuid::new_v4();
    let mut board = board_with(id);
    assert!(!board.cancel(id), "pending runs cannot be cancelled");
    assert!(!board.cancel(Uuid::new_v4()));

    board.begin(id).expect("begin");
    assert!(board.cancel(id));
    assert_eq!(board.runs[&id].status, AnalysisStatus::Cancelled);
    assert!(!board.cancel(id));

    // The worker finishing late must not resurrect the run.
    apply_delta(
        &mut board,
        Delta::Completed {
            id,
            result: sample_result(id),
        },
    );
    assert_eq!(board.runs[&id].status, AnalysisStatus::Cancelled);
    assert!(board.result(id).is_none());
    assert!(board.logs.back().expect("log").starts_with("[WARN]"));
}

#[test]
fn log_ring_keeps_the_latest_entries() {
    let mut board = RunBoard::new();
    for i in 0..250 {
        apply_delta(&mut board, Delta::Log(format!("[INFO] line {i}")));
    }
    assert_eq!(board.logs.len(), 200);
    assert_eq!(board.logs.front().map(String::as_str), Some("[INFO] line 50"));
    assert_eq!(board.logs.back().map(String::as_str), Some("[INFO] line 249"));
}

#[test]
fn status_names_round_trip() {
    for status in [
        AnalysisStatus::Pending,
        AnalysisStatus::Processing,
        AnalysisStatus::Completed,
        AnalysisStatus::Failed,
        AnalysisStatus::Cancelled,
    ] {
        assert_eq!(status.as_str().parse::<AnalysisStatus>().expect("parse"), status);
    }
    assert!("Running".parse::<AnalysisStatus>().is_err());
}

#[test]
fn runner_cancel_wins_over_a_late_result() {
    let id = Uuid::new_v4();
    let mut board = board_with(id);
    let (tx, rx) = mpsc::channel();
    let runner = Runner::with_threads(
        Arc::new(Pipeline::new(Arc::new(NoVideoTools), Arc::new(DefaultDetectorLoader))),
        tx,
        1,
    );
    runner
        .start(
            &mut board,
            request(id),
            AnalysisSource::Detections {
                frames: Vec::new(),
                metadata: VideoMetadata::normalized(600, 25.0),
            },
        )
        .expect("start");
    assert!(runner.cancel(&mut board, id));
    assert!(!runner.cancel(&mut board, id));

    // Whether the worker saw the flag or finished first, the run stays cancelled.
    while let Ok(delta) = rx.recv_timeout(Duration::from_secs(10)) {
        let last = matches!(delta, Delta::Completed { .. } | Delta::Cancelled { .. } | Delta::Failed { .. });
        apply_delta(&mut board, delta);
        if last {
            break;
        }
    }
    assert_eq!(board.runs[&id].status, AnalysisStatus::Cancelled);
    assert!(board.result(id).is_none());
}

#[test]
fn finished_run_keeps_the_cancel_flag_of_a_rerun_with_the_same_id() {
    let dir = tempfile::tempdir().expect("tempdir");
    let video = dir.path().join("match.mp4");
    std::fs::write(&video, b"x").expect("write");

    let (release, gate) = mpsc::channel();
    let (entered_tx, entered) = mpsc::channel();
    let tools = GatedVideoTools {
        gate: Mutex::new(gate),
        entered: entered_tx,
    };
    let (tx, rx) = mpsc::channel();
    let runner = Runner::with_threads(
        Arc::new(Pipeline::new(Arc::new(tools), Arc::new(DefaultDetectorLoader))),
        tx,
        2,
    );

    // Two boards stand in for two callers sharing one runner and one analysis id.
    let id = Uuid::new_v4();
    let mut first = board_with(id);
    let mut second = board_with(id);
    runner
        .start(&mut first, request(id), AnalysisSource::Video(video.clone()))
        .expect("start first");
    entered.recv_timeout(Duration::from_secs(10)).expect("first run in probe");
    runner
        .start(&mut second, request(id), AnalysisSource::Video(video))
        .expect("start second");
    assert_eq!(runner.in_flight(), 1);

    release.send(()).expect("release first");
    assert!(matches!(terminal_for(&rx), Delta::Completed { .. }));
    entered.recv_timeout(Duration::from_secs(10)).expect("second run in probe");
    thread::sleep(Duration::from_millis(100));
    assert_eq!(runner.in_flight(), 1, "second run lost its cancel flag");

    assert!(runner.cancel(&mut second, id));
    release.send(()).expect("release second");
    assert!(matches!(terminal_for(&rx), Delta::Cancelled { .. }));
}
