use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use uuid::Uuid;

use pitchscope::{export, persist, store};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let out = arg_value("--out")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("analysis.xlsx"));

    let result = if let Some(report) = arg_value("--report") {
        let path = PathBuf::from(report);
        persist::load_report(&path)
            .map(|r| r.result)
            .ok_or_else(|| anyhow!("no readable report at {}", path.display()))?
    } else {
        let id: Uuid = arg_value("--analysis")
            .context("pass --analysis <uuid> or --report <file.json>")?
            .parse()
            .context("invalid analysis id")?;
        let db_path = arg_value("--db")
            .map(PathBuf::from)
            .unwrap_or_else(store::default_db_path);
        let conn = store::open_db(&db_path)?;
        store::load_result(&conn, id)?
            .ok_or_else(|| anyhow!("analysis {id} has no stored result in {}", db_path.display()))?
    };

    let summary = export::export_analysis(&out, &result)?;
    println!("Workbook: {}", out.display());
    println!("Players: {}", summary.players);
    println!("Events: {}", summary.events);
    println!("Movement rows: {}", summary.metrics);
    Ok(())
}

/// Accepts both `--flag value` and `--flag=value`.
fn arg_value(flag: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(flag).and_then(|rest| rest.strip_prefix('=')) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == flag {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(next.clone());
            }
        }
    }
    None
}
