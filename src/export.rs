use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::events::MatchEvent;
use crate::pipeline::AnalysisResult;
use crate::players::PlayerStat;

pub struct ExportReport {
    pub players: usize,
    pub events: usize,
    pub metrics: usize,
}

pub fn export_analysis(path: &Path, result: &AnalysisResult) -> Result<ExportReport> {
    let mut summary_rows = vec![vec!["Metric".to_string(), "Value".to_string()]];
    let t = &result.totals;
    for (name, value) in [
        ("Analysis", result.analysis_id.to_string()),
        ("Camera angle", result.camera_angle.to_string()),
        ("Duration (s)", result.metadata.duration_secs.to_string()),
        ("Synthetic", result.synthetic.to_string()),
        ("Total passes", t.total_passes.to_string()),
        ("Pass completion %", format!("{:.1}", t.pass_completion_rate)),
        ("Total shots", t.total_shots.to_string()),
        ("Shots on target", t.shots_on_target.to_string()),
        ("Goals", t.goals.to_string()),
        ("Total tackles", t.total_tackles.to_string()),
        ("Tackles won", t.tackles_won.to_string()),
        ("Distance covered (m)", format!("{:.0}", t.total_distance_covered_m)),
        ("Average speed (km/h)", format!("{:.1}", t.average_speed_kmh)),
    ] {
        summary_rows.push(vec![name.to_string(), value]);
    }
    if let Some(p) = &result.analytics.possession {
        summary_rows.push(vec![
            "Home possession %".to_string(),
            format!("{:.1}", p.home_share_pct()),
        ]);
    }

    let mut players_rows = vec![
        [
            "Team", "Shirt #", "Player", "Pos", "Passes", "Completed", "Pass %", "Shots",
            "On target", "Goals", "Tackles", "Won", "Interceptions", "Dribbles", "Recoveries",
            "Distance (m)", "Max km/h", "Sprints",
        ]
        .map(String::from)
        .to_vec(),
    ];
    players_rows.extend(result.players.iter().map(player_row));

    let mut events_rows = vec![
        [
            "Time (s)", "Type", "Team", "Shirt #", "Player", "Successful", "Details", "X start",
            "Y start", "X end", "Y end", "Distance (m)",
        ]
        .map(String::from)
        .to_vec(),
    ];
    events_rows.extend(result.events.iter().map(event_row));

    let mut metrics_rows = vec![
        [
            "Team", "Shirt #", "Player", "Distance (m)", "Walking", "Jogging", "Running",
            "Sprinting", "Sprints", "Max km/h", "Avg km/h", "Minutes",
        ]
        .map(String::from)
        .to_vec(),
    ];
    for m in &result.analytics.player_metrics {
        metrics_rows.push(vec![
            opt_to_string(m.team),
            opt_to_string(m.jersey_number),
            m.player_name.clone().unwrap_or_default(),
            format!("{:.1}", m.distance_covered_m),
            format!("{:.1}", m.walking_distance_m),
            format!("{:.1}", m.jogging_distance_m),
            format!("{:.1}", m.running_distance_m),
            format!("{:.1}", m.sprinting_distance_m),
            m.sprint_count.to_string(),
            format!("{:.1}", m.max_speed_kmh),
            format!("{:.1}", m.average_speed_kmh),
            format!("{:.1}", m.minutes_played),
        ]);
    }

    let mut workbook = Workbook::new();
    for (name, rows) in [
        ("Summary", &summary_rows),
        ("Players", &players_rows),
        ("Events", &events_rows),
        ("Movement", &metrics_rows),
    ] {
        let sheet = workbook.add_worksheet();
        sheet.set_name(name)?;
        write_rows(sheet, rows)?;
    }
    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    Ok(ExportReport {
        players: players_rows.len().saturating_sub(1),
        events: events_rows.len().saturating_sub(1),
        metrics: metrics_rows.len().saturating_sub(1),
    })
}

fn player_row(p: &PlayerStat) -> Vec<String> {
    vec![
        p.team.to_string(),
        p.jersey_number.to_string(),
        p.player_name.clone(),
        p.position.clone(),
        p.passes_attempted.to_string(),
        p.passes_completed.to_string(),
        format!("{:.1}", p.pass_completion_pct),
        p.shots_attempted.to_string(),
        p.shots_on_target.to_string(),
        p.goals_scored.to_string(),
        p.tackles.to_string(),
        p.tackles_won.to_string(),
        p.interceptions.to_string(),
        p.dribbles.to_string(),
        p.ball_recoveries.to_string(),
        format!("{:.1}", p.distance_covered_m),
        format!("{:.1}", p.max_speed_kmh),
        p.sprints.to_string(),
    ]
}

fn event_row(e: &MatchEvent) -> Vec<String> {
    vec![
        e.timestamp.to_string(),
        e.event_type.to_string(),
        e.team.to_string(),
        opt_to_string(e.jersey_number),
        e.player_name.clone(),
        opt_to_string(e.successful),
        e.details.clone(),
        format!("{:.3}", e.x_start),
        format!("{:.3}", e.y_start),
        format!("{:.3}", e.x_end),
        format!("{:.3}", e.y_end),
        format!("{:.1}", e.distance_meters),
    ]
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}

fn opt_to_string<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
