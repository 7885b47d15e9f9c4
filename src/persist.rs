use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::AnalysisResult;

const REPORT_VERSION: u32 = 1;

/// On-disk snapshot of a completed analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportFile {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub result: AnalysisResult,
}

/// Write `result` as pretty JSON. The file is replaced atomically so readers never see a
/// partial report.
pub fn save_report(path: &Path, result: &AnalysisResult) -> Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let report = ReportFile {
        version: REPORT_VERSION,
        generated_at: Utc::now(),
        result: result.clone(),
    };
    let json = serde_json::to_string_pretty(&report).context("serialize report")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("rename into {}", path.display()))?;
    Ok(())
}

/// `None` for missing, unreadable or other-version files.
pub fn load_report(path: &Path) -> Option<ReportFile> {
    let raw = fs::read_to_string(path).ok()?;
    let report = serde_json::from_str::<ReportFile>(&raw).ok()?;
    (report.version == REPORT_VERSION).then_some(report)
}
