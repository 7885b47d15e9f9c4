use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use pitchscope::config::{AnalysisConfig, CameraAngle, VideoMetadata};
use pitchscope::detection::FrameDetection;
use pitchscope::detector::DefaultDetectorLoader;
use pitchscope::export::export_analysis;
use pitchscope::extract::FfmpegExtractor;
use pitchscope::persist::save_report;
use pitchscope::pipeline::{AnalysisRequest, AnalysisSource, Pipeline};
use pitchscope::roster::MatchSetup;
use pitchscope::runner::Runner;
use pitchscope::state::{AnalysisStatus, RunBoard, RunRecord, apply_delta};
use pitchscope::store;

const USAGE: &str = "usage: pitchscope (--video <file> | --detections <file.json>) [--setup <file.json>] \
[--camera overhead|sideline] [--analysis <uuid>] [--db <file>] [--report <file.json>] [--xlsx <file.xlsx>]\n       \
pitchscope --status <uuid> [--db <file>]";

#[derive(Debug, Default)]
struct Args {
    video: Option<PathBuf>,
    detections: Option<PathBuf>,
    setup: Option<PathBuf>,
    camera: Option<CameraAngle>,
    analysis: Option<Uuid>,
    status: Option<Uuid>,
    db: Option<PathBuf>,
    report: Option<PathBuf>,
    xlsx: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut iter = env::args().skip(1);
    while let Some(flag) = iter.next() {
        let mut value = || {
            iter.next()
                .with_context(|| format!("missing value for {flag}"))
        };
        match flag.as_str() {
            "--video" => args.video = Some(PathBuf::from(value()?)),
            "--detections" => args.detections = Some(PathBuf::from(value()?)),
            "--setup" => args.setup = Some(PathBuf::from(value()?)),
            "--camera" => args.camera = Some(value()?.parse()?),
            "--analysis" => args.analysis = Some(value()?.parse().context("invalid analysis id")?),
            "--status" => args.status = Some(value()?.parse().context("invalid analysis id")?),
            "--db" => args.db = Some(PathBuf::from(value()?)),
            "--report" => args.report = Some(PathBuf::from(value()?)),
            "--xlsx" => args.xlsx = Some(PathBuf::from(value()?)),
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other => bail!("unknown argument {other}\n{USAGE}"),
        }
    }
    Ok(args)
}

fn main() -> ExitCode {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pitchscope=info")),
        )
        .init();

    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// `Ok(false)` when the run ended but did not complete.
fn run() -> Result<bool> {
    let args = parse_args()?;
    let db_path = args.db.clone().unwrap_or_else(store::default_db_path);
    let mut conn = store::open_db(&db_path)?;

    if let Some(id) = args.status {
        match store::load_status(&conn, id)? {
            Some(view) => {
                println!("{} {}%", view.status, view.progress);
                if let Some(error) = view.error {
                    println!("error: {error}");
                }
            }
            None => println!("unknown analysis {id}"),
        }
        return Ok(true);
    }

    let mut config = AnalysisConfig::from_env();
    if let Some(camera) = args.camera {
        config.camera_angle = camera;
    }
    let setup = match &args.setup {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("read setup {}", path.display()))?;
            serde_json::from_str::<MatchSetup>(&raw)
                .with_context(|| format!("parse setup {}", path.display()))?
        }
        None => MatchSetup::default(),
    };
    let source = match (&args.video, &args.detections) {
        (Some(video), None) => AnalysisSource::Video(video.clone()),
        (None, Some(path)) => load_detections(path, config.target_fps)?,
        _ => bail!("exactly one of --video or --detections is required\n{USAGE}"),
    };

    // Regenerating reuses the stored record; anything else is a fresh analysis.
    let mut board = RunBoard::new();
    let record = match args.analysis {
        Some(id) => store::load_run(&conn, id)?.unwrap_or_else(|| RunRecord::new(id, config.camera_angle)),
        None => RunRecord::new(Uuid::new_v4(), config.camera_angle),
    };
    let id = record.analysis_id;
    let record = board.register(record);
    record.camera_angle = config.camera_angle;
    record.home_color = setup.home.as_ref().map(|r| r.jersey_color_home.clone());
    record.away_color = setup.away.as_ref().map(|r| r.jersey_color_away.clone());

    let pipeline = Pipeline::new(
        Arc::new(FfmpegExtractor::new(
            config.ffmpeg_bin.clone(),
            config.ffprobe_bin.clone(),
        )),
        Arc::new(DefaultDetectorLoader),
    );
    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(Arc::new(pipeline), tx);
    let request = AnalysisRequest {
        analysis_id: id,
        setup,
        config,
    };
    runner.start(&mut board, request, source)?;
    if let Some(record) = board.runs.get(&id) {
        store::upsert_run(&conn, record)?;
    }
    info!(analysis = %id, db = %db_path.display(), "analysis running");

    let mut last_progress = 0;
    loop {
        let Ok(delta) = rx.recv_timeout(Duration::from_millis(250)) else {
            if runner.in_flight() == 0 {
                break;
            }
            continue;
        };
        apply_delta(&mut board, delta);
        let Some(record) = board.runs.get(&id) else {
            break;
        };
        if store::save_progress(&conn, record, &mut last_progress)? {
            println!("[{:>3}%] {}", record.progress, record.message);
        }
        if record.status.is_terminal() {
            break;
        }
    }
    for line in &board.logs {
        println!("{line}");
    }

    let Some(record) = board.runs.get(&id) else {
        bail!("analysis {id} disappeared from the run board");
    };
    store::upsert_run(&conn, record)?;
    if record.status != AnalysisStatus::Completed {
        warn!(analysis = %id, status = %record.status, "analysis did not complete");
        return Ok(false);
    }
    let Some(result) = board.result(id) else {
        bail!("analysis {id} completed without a result");
    };
    store::save_result(&mut conn, result)?;

    let totals = &result.totals;
    println!(
        "analysis {id}: {} events, {} players, {} passes ({:.1}%), {} shots, {} goals",
        result.events.len(),
        result.players.len(),
        totals.total_passes,
        totals.pass_completion_rate,
        totals.total_shots,
        totals.goals
    );
    if let Some(path) = &args.report {
        save_report(path, result)?;
        println!("report written to {}", path.display());
    }
    if let Some(path) = &args.xlsx {
        let report = export_analysis(path, result)?;
        println!(
            "workbook written to {} ({} players, {} events)",
            path.display(),
            report.players,
            report.events
        );
    }
    Ok(true)
}

/// A recorded detection stream. Duration comes from the last sampled timestamp.
fn load_detections(path: &Path, target_fps: u32) -> Result<AnalysisSource> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let frames: Vec<FrameDetection> =
        serde_json::from_str(&raw).with_context(|| format!("parse detections {}", path.display()))?;
    let last = frames.iter().map(|f| f.timestamp_seconds).max().unwrap_or(0);
    let metadata = VideoMetadata::normalized(i64::from(last) + 1, target_fps as f32);
    Ok(AnalysisSource::Detections { frames, metadata })
}
