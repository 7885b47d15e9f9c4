use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use crate::events::MatchEvent;
use crate::pipeline::AnalysisResult;
use crate::players::PlayerStat;
use crate::roster::Team;
use crate::state::{AnalysisStatus, RunRecord, StatusView};

const DB_DIR: &str = "pitchscope";
const DB_FILE: &str = "pitchscope.sqlite";

/// `PITCHSCOPE_DB`, else the user cache dir.
pub fn default_db_path() -> PathBuf {
    if let Ok(path) = env::var("PITCHSCOPE_DB")
        && !path.trim().is_empty()
    {
        return PathBuf::from(path);
    }
    if let Ok(base) = env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return PathBuf::from(base).join(DB_DIR).join(DB_FILE);
    }
    match env::var("HOME") {
        Ok(home) if !home.trim().is_empty() => PathBuf::from(home)
            .join(".cache")
            .join(DB_DIR)
            .join(DB_FILE),
        _ => PathBuf::from(DB_FILE),
    }
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS analyses (
            analysis_id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            progress INTEGER NOT NULL,
            message TEXT NOT NULL,
            error TEXT NULL,
            camera_angle TEXT NOT NULL,
            home_color TEXT NULL,
            away_color TEXT NULL,
            created_at TEXT NOT NULL,
            started_at TEXT NULL,
            completed_at TEXT NULL
        );
        CREATE TABLE IF NOT EXISTS events (
            event_id TEXT PRIMARY KEY,
            analysis_id TEXT NOT NULL REFERENCES analyses(analysis_id) ON DELETE CASCADE,
            seq INTEGER NOT NULL,
            event_type TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            jersey_number INTEGER NULL,
            player_name TEXT NOT NULL,
            team TEXT NOT NULL,
            details TEXT NOT NULL,
            successful INTEGER NULL,
            x_start REAL NOT NULL,
            y_start REAL NOT NULL,
            x_end REAL NOT NULL,
            y_end REAL NOT NULL,
            distance_meters REAL NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_events_analysis ON events(analysis_id, timestamp, seq);
        CREATE TABLE IF NOT EXISTS player_stats (
            analysis_id TEXT NOT NULL REFERENCES analyses(analysis_id) ON DELETE CASCADE,
            team TEXT NOT NULL,
            jersey_number INTEGER NOT NULL,
            player_name TEXT NOT NULL,
            position TEXT NOT NULL,
            passes_attempted INTEGER NOT NULL,
            shots_attempted INTEGER NOT NULL,
            goals_scored INTEGER NOT NULL,
            tackles INTEGER NOT NULL,
            distance_covered_m REAL NOT NULL,
            stat_json TEXT NOT NULL,
            PRIMARY KEY (analysis_id, team, jersey_number)
        );
        CREATE TABLE IF NOT EXISTS analytics (
            analysis_id TEXT PRIMARY KEY REFERENCES analyses(analysis_id) ON DELETE CASCADE,
            synthetic INTEGER NOT NULL,
            metadata_json TEXT NOT NULL,
            totals_json TEXT NOT NULL,
            analytics_json TEXT NOT NULL
        );
        "#,
    )
    .context("init sqlite schema")?;
    Ok(())
}

fn ts(t: Option<DateTime<Utc>>) -> Option<String> {
    t.map(|t| t.to_rfc3339())
}

fn parse_ts(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc))
}

pub fn upsert_run(conn: &Connection, run: &RunRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO analyses(
            analysis_id, status, progress, message, error, camera_angle,
            home_color, away_color, created_at, started_at, completed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(analysis_id) DO UPDATE SET
            status = excluded.status,
            progress = excluded.progress,
            message = excluded.message,
            error = excluded.error,
            camera_angle = excluded.camera_angle,
            home_color = excluded.home_color,
            away_color = excluded.away_color,
            started_at = excluded.started_at,
            completed_at = excluded.completed_at
        "#,
        params![
            run.analysis_id.to_string(),
            run.status.as_str(),
            i64::from(run.progress),
            run.message,
            run.error,
            run.camera_angle.as_str(),
            run.home_color,
            run.away_color,
            run.created_at.to_rfc3339(),
            ts(run.started_at),
            ts(run.completed_at),
        ],
    )
    .with_context(|| format!("upsert analysis {}", run.analysis_id))?;
    Ok(())
}

pub fn load_run(conn: &Connection, id: Uuid) -> Result<Option<RunRecord>> {
    conn.query_row(
        r#"
        SELECT status, progress, message, error, camera_angle, home_color, away_color,
               created_at, started_at, completed_at
        FROM analyses WHERE analysis_id = ?1
        "#,
        params![id.to_string()],
        |row| run_from_row(id, row),
    )
    .optional()
    .with_context(|| format!("load analysis {id}"))
}

fn run_from_row(id: Uuid, row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let status: String = row.get(0)?;
    let camera: String = row.get(4)?;
    Ok(RunRecord {
        analysis_id: id,
        // Rows are only ever written from typed values; unknown text reads as Failed.
        status: status.parse().unwrap_or(AnalysisStatus::Failed),
        progress: row.get::<_, i64>(1)?.clamp(0, 100) as u8,
        message: row.get(2)?,
        error: row.get(3)?,
        camera_angle: camera.parse().unwrap_or_default(),
        home_color: row.get(5)?,
        away_color: row.get(6)?,
        created_at: parse_ts(row.get(7)?).unwrap_or_else(Utc::now),
        started_at: parse_ts(row.get(8)?),
        completed_at: parse_ts(row.get(9)?),
    })
}

/// Writes `run` when its progress moved since `last_saved`, so `--status` from another process
/// follows the run. Returns whether a row was written.
pub fn save_progress(conn: &Connection, run: &RunRecord, last_saved: &mut u8) -> Result<bool> {
    if run.progress == *last_saved {
        return Ok(false);
    }
    upsert_run(conn, run)?;
    *last_saved = run.progress;
    Ok(true)
}

pub fn load_status(conn: &Connection, id: Uuid) -> Result<Option<StatusView>> {
    Ok(load_run(conn, id)?.as_ref().map(StatusView::from))
}

/// Replace everything stored for `result.analysis_id` with `result`. Regenerating a run goes
/// through here, so earlier events and player rows never survive.
pub fn save_result(conn: &mut Connection, result: &AnalysisResult) -> Result<()> {
    let id = result.analysis_id.to_string();
    let tx = conn.transaction().context("begin save transaction")?;
    for table in ["events", "player_stats", "analytics"] {
        tx.execute(
            &format!("DELETE FROM {table} WHERE analysis_id = ?1"),
            params![id],
        )
        .with_context(|| format!("clear {table} for {id}"))?;
    }

    {
        let mut insert = tx
            .prepare(
                r#"
                INSERT INTO events(
                    event_id, analysis_id, seq, event_type, timestamp, jersey_number,
                    player_name, team, details, successful,
                    x_start, y_start, x_end, y_end, distance_meters
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                "#,
            )
            .context("prepare event insert")?;
        for (seq, e) in result.events.iter().enumerate() {
            insert
                .execute(params![
                    e.id.to_string(),
                    id,
                    seq as i64,
                    e.event_type.as_str(),
                    i64::from(e.timestamp),
                    e.jersey_number.map(i64::from),
                    e.player_name,
                    e.team.label(),
                    e.details,
                    e.successful,
                    e.x_start,
                    e.y_start,
                    e.x_end,
                    e.y_end,
                    e.distance_meters,
                ])
                .with_context(|| format!("insert event {}", e.id))?;
        }

        let mut insert = tx
            .prepare(
                r#"
                INSERT INTO player_stats(
                    analysis_id, team, jersey_number, player_name, position,
                    passes_attempted, shots_attempted, goals_scored, tackles,
                    distance_covered_m, stat_json
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )
            .context("prepare player insert")?;
        for p in &result.players {
            let json = serde_json::to_string(p).context("serialize player stat")?;
            insert
                .execute(params![
                    id,
                    p.team.label(),
                    i64::from(p.jersey_number),
                    p.player_name,
                    p.position,
                    i64::from(p.passes_attempted),
                    i64::from(p.shots_attempted),
                    i64::from(p.goals_scored),
                    i64::from(p.tackles),
                    p.distance_covered_m,
                    json,
                ])
                .with_context(|| format!("insert player {} #{}", p.team, p.jersey_number))?;
        }
    }

    tx.execute(
        r#"
        INSERT INTO analytics(analysis_id, synthetic, metadata_json, totals_json, analytics_json)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            id,
            result.synthetic,
            serde_json::to_string(&result.metadata).context("serialize metadata")?,
            serde_json::to_string(&result.totals).context("serialize totals")?,
            serde_json::to_string(&result.analytics).context("serialize analytics")?,
        ],
    )
    .context("insert analytics")?;

    tx.commit().context("commit save transaction")?;
    Ok(())
}

pub fn load_events(conn: &Connection, id: Uuid) -> Result<Vec<MatchEvent>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT event_id, event_type, timestamp, jersey_number, player_name, team, details,
                   successful, x_start, y_start, x_end, y_end, distance_meters
            FROM events
            WHERE analysis_id = ?1
            ORDER BY timestamp ASC, seq ASC
            "#,
        )
        .context("prepare load events query")?;

    let rows = stmt
        .query_map(params![id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<i64>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, Option<bool>>(7)?,
                [
                    row.get::<_, f64>(8)?,
                    row.get::<_, f64>(9)?,
                    row.get::<_, f64>(10)?,
                    row.get::<_, f64>(11)?,
                    row.get::<_, f64>(12)?,
                ],
            ))
        })
        .context("query events")?;

    let mut out = Vec::new();
    for row in rows {
        let (event_id, kind, timestamp, jersey, player_name, team, details, successful, geo) =
            row.context("read event row")?;
        out.push(MatchEvent {
            id: Uuid::parse_str(&event_id).with_context(|| format!("bad event id {event_id}"))?,
            analysis_id: id,
            event_type: kind.parse()?,
            timestamp: timestamp.max(0) as u32,
            jersey_number: jersey.map(|j| j.max(0) as u32),
            player_name,
            team: Team::from_label(&team).with_context(|| format!("bad team {team}"))?,
            details,
            successful,
            x_start: geo[0],
            y_start: geo[1],
            x_end: geo[2],
            y_end: geo[3],
            distance_meters: geo[4],
        });
    }
    Ok(out)
}

pub fn load_player_stats(conn: &Connection, id: Uuid) -> Result<Vec<PlayerStat>> {
    let mut stmt = conn
        .prepare(
            "SELECT stat_json FROM player_stats WHERE analysis_id = ?1 ORDER BY team, jersey_number",
        )
        .context("prepare load player stats query")?;
    let rows = stmt
        .query_map(params![id.to_string()], |row| row.get::<_, String>(0))
        .context("query player stats")?;
    let mut out = Vec::new();
    for raw in rows {
        let raw = raw.context("read player row")?;
        out.push(serde_json::from_str(&raw).context("parse player stat")?);
    }
    Ok(out)
}

/// Reassemble a stored result. `None` until the analysis has completed at least once.
pub fn load_result(conn: &Connection, id: Uuid) -> Result<Option<AnalysisResult>> {
    let Some(run) = load_run(conn, id)? else {
        return Ok(None);
    };
    let row = conn
        .query_row(
            "SELECT synthetic, metadata_json, totals_json, analytics_json FROM analytics WHERE analysis_id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, bool>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()
        .with_context(|| format!("load analytics {id}"))?;
    let Some((synthetic, metadata, totals, analytics)) = row else {
        return Ok(None);
    };
    Ok(Some(AnalysisResult {
        analysis_id: id,
        camera_angle: run.camera_angle,
        metadata: serde_json::from_str(&metadata).context("parse metadata")?,
        synthetic,
        events: load_events(conn, id)?,
        players: load_player_stats(conn, id)?,
        totals: serde_json::from_str(&totals).context("parse totals")?,
        analytics: serde_json::from_str(&analytics).context("parse analytics")?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CameraAngle;

    #[test]
    fn run_record_round_trips() {
        let conn = Connection::open_in_memory().expect("db");
        init_schema(&conn).expect("schema");
        let mut run = RunRecord::new(Uuid::new_v4(), CameraAngle::Sideline);
        run.home_color = Some("#FF0000".to_string());
        upsert_run(&conn, &run).expect("insert");
        run.begin().expect("begin");
        run.progress = 35;
        upsert_run(&conn, &run).expect("update");

        let loaded = load_run(&conn, run.analysis_id).expect("load").expect("present");
        assert_eq!(loaded.status, AnalysisStatus::Processing);
        assert_eq!(loaded.progress, 35);
        assert_eq!(loaded.camera_angle, CameraAngle::Sideline);
        assert_eq!(loaded.home_color.as_deref(), Some("#FF0000"));
        assert!(load_status(&conn, Uuid::new_v4()).expect("query").is_none());
    }

    #[test]
    fn progress_is_visible_while_the_run_is_processing() {
        use crate::state::{Delta, RunBoard, apply_delta};

        let conn = Connection::open_in_memory().expect("db");
        init_schema(&conn).expect("schema");
        let id = Uuid::new_v4();
        let mut board = RunBoard::new();
        board.register(RunRecord::new(id, CameraAngle::Overhead));
        board.begin(id).expect("begin");
        upsert_run(&conn, &board.runs[&id]).expect("insert");

        let mut last_saved = 0;
        apply_delta(
            &mut board,
            Delta::Progress {
                id,
                percent: 35,
                message: "Frames extracted".to_string(),
            },
        );
        assert!(save_progress(&conn, &board.runs[&id], &mut last_saved).expect("save"));
        assert!(!save_progress(&conn, &board.runs[&id], &mut last_saved).expect("save"));

        let status = load_status(&conn, id).expect("query").expect("present");
        assert_eq!(status.status, AnalysisStatus::Processing);
        assert_eq!(status.progress, 35);
        let run = load_run(&conn, id).expect("load").expect("present");
        assert_eq!(run.message, "Frames extracted");
    }

    #[test]
    fn regenerating_replaces_rows() {
        use rand::SeedableRng;
        use rand_chacha::ChaCha8Rng;

        use crate::config::{AnalysisConfig, VideoMetadata};
        use crate::events::{EventType, event_id};
        use crate::pipeline::{AnalysisRequest, synthetic_result};
        use crate::roster::MatchSetup;

        let mut conn = Connection::open_in_memory().expect("db");
        init_schema(&conn).expect("schema");
        let run = RunRecord::new(Uuid::new_v4(), CameraAngle::Overhead);
        upsert_run(&conn, &run).expect("insert");

        let request = AnalysisRequest {
            analysis_id: run.analysis_id,
            setup: MatchSetup::default(),
            config: AnalysisConfig::default(),
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut first = synthetic_result(
            &request,
            VideoMetadata::normalized(600, 25.0),
            &|_: u8, _: &str| {},
            &mut rng,
        );
        first.events.push(MatchEvent {
            id: event_id(run.analysis_id, 0),
            analysis_id: run.analysis_id,
            event_type: EventType::Pass,
            timestamp: 12,
            jersey_number: Some(4),
            player_name: "Player #4".to_string(),
            team: Team::Home,
            details: "Pass completed".to_string(),
            successful: Some(true),
            x_start: 0.4,
            y_start: 0.5,
            x_end: 0.5,
            y_end: 0.5,
            distance_meters: 10.5,
        });
        save_result(&mut conn, &first).expect("first save");
        assert_eq!(load_events(&conn, run.analysis_id).expect("events").len(), 1);

        let mut second = first.clone();
        second.events.clear();
        second.players.truncate(10);
        save_result(&mut conn, &second).expect("second save");

        assert!(load_events(&conn, run.analysis_id).expect("events").is_empty());
        assert_eq!(load_player_stats(&conn, run.analysis_id).expect("players").len(), 10);
        let loaded = load_result(&conn, run.analysis_id).expect("load").expect("present");
        assert!(loaded.synthetic);
        assert_eq!(loaded.totals.total_passes, second.totals.total_passes);
    }
}
