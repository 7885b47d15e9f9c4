use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::CameraAngle;
use crate::pipeline::AnalysisResult;

const MAX_LOGS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl AnalysisStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "Pending",
            AnalysisStatus::Processing => "Processing",
            AnalysisStatus::Completed => "Completed",
            AnalysisStatus::Failed => "Failed",
            AnalysisStatus::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AnalysisStatus::Completed | AnalysisStatus::Failed | AnalysisStatus::Cancelled
        )
    }

    /// Runs start from scratch or regenerate over a completed one.
    pub fn can_start(self) -> bool {
        matches!(self, AnalysisStatus::Pending | AnalysisStatus::Completed)
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisStatus {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw {
            "Pending" => Ok(AnalysisStatus::Pending),
            "Processing" => Ok(AnalysisStatus::Processing),
            "Completed" => Ok(AnalysisStatus::Completed),
            "Failed" => Ok(AnalysisStatus::Failed),
            "Cancelled" => Ok(AnalysisStatus::Cancelled),
            other => Err(anyhow!("unknown analysis status: {other}")),
        }
    }
}

/// Status record of one analysis. This is all a consumer sees while a run is in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub analysis_id: Uuid,
    pub status: AnalysisStatus,
    pub progress: u8,
    pub message: String,
    pub error: Option<String>,
    pub camera_angle: CameraAngle,
    pub home_color: Option<String>,
    pub away_color: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    pub fn new(analysis_id: Uuid, camera_angle: CameraAngle) -> Self {
        Self {
            analysis_id,
            status: AnalysisStatus::Pending,
            progress: 0,
            message: String::new(),
            error: None,
            camera_angle,
            home_color: None,
            away_color: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Pending or Completed to Processing. Clears the previous outcome.
    pub fn begin(&mut self) -> Result<()> {
        if !self.status.can_start() {
            bail!(
                "analysis {} cannot start from status {}",
                self.analysis_id,
                self.status
            );
        }
        self.status = AnalysisStatus::Processing;
        self.progress = 0;
        self.message = "Starting".to_string();
        self.error = None;
        self.started_at = Some(Utc::now());
        self.completed_at = None;
        Ok(())
    }
}

/// Status view queryable at any time: `(status, progress, error)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusView {
    pub status: AnalysisStatus,
    pub progress: u8,
    pub error: Option<String>,
}

impl From<&RunRecord> for StatusView {
    fn from(r: &RunRecord) -> Self {
        Self {
            status: r.status,
            progress: r.progress,
            error: r.error.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Delta {
    Progress {
        id: Uuid,
        percent: u8,
        message: String,
    },
    Completed {
        id: Uuid,
        result: Box<AnalysisResult>,
    },
    Failed {
        id: Uuid,
        error: String,
    },
    Cancelled {
        id: Uuid,
    },
    Log(String),
}

#[derive(Debug, Default)]
pub struct RunBoard {
    pub runs: HashMap<Uuid, RunRecord>,
    results: HashMap<Uuid, AnalysisResult>,
    pub logs: VecDeque<String>,
}

impl RunBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_log(&mut self, msg: impl Into<String>) {
        self.logs.push_back(msg.into());
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }

    /// Register a new pending analysis. Existing records are kept as they are.
    pub fn register(&mut self, record: RunRecord) -> &mut RunRecord {
        self.runs.entry(record.analysis_id).or_insert(record)
    }

    pub fn begin(&mut self, id: Uuid) -> Result<()> {
        let record = self
            .runs
            .get_mut(&id)
            .ok_or_else(|| anyhow!("unknown analysis {id}"))?;
        record.begin()?;
        self.results.remove(&id);
        self.push_log(format!("[INFO] Analysis {id} started"));
        Ok(())
    }

    /// Only a Processing run can be cancelled.
    pub fn cancel(&mut self, id: Uuid) -> bool {
        let Some(record) = self.runs.get_mut(&id) else {
            return false;
        };
        if record.status != AnalysisStatus::Processing {
            return false;
        }
        record.status = AnalysisStatus::Cancelled;
        record.message = "Cancelled".to_string();
        record.completed_at = Some(Utc::now());
        self.push_log(format!("[INFO] Analysis {id} cancelled"));
        true
    }

    pub fn status(&self, id: Uuid) -> Option<StatusView> {
        self.runs.get(&id).map(StatusView::from)
    }

    /// Results only exist for completed runs.
    pub fn result(&self, id: Uuid) -> Option<&AnalysisResult> {
        let record = self.runs.get(&id)?;
        if record.status != AnalysisStatus::Completed {
            return None;
        }
        self.results.get(&id)
    }
}

pub fn apply_delta(board: &mut RunBoard, delta: Delta) {
    match delta {
        Delta::Progress {
            id,
            percent,
            message,
        } => {
            let Some(record) = board.runs.get_mut(&id) else {
                return;
            };
            if record.status != AnalysisStatus::Processing {
                return;
            }
            // Out-of-order deliveries never move progress backwards.
            if percent >= record.progress {
                record.progress = percent.min(100);
                record.message = message;
            }
        }
        Delta::Completed { id, result } => {
            let Some(record) = board.runs.get_mut(&id) else {
                return;
            };
            let status = record.status;
            if status != AnalysisStatus::Processing {
                board.push_log(format!("[WARN] Dropped result for {id}: run is {status}"));
                return;
            }
            record.status = AnalysisStatus::Completed;
            record.progress = 100;
            record.message = if result.synthetic {
                "Completed (synthetic)".to_string()
            } else {
                "Completed".to_string()
            };
            record.completed_at = Some(Utc::now());
            let summary = format!(
                "[INFO] Analysis {id} completed: {} events, {} players",
                result.events.len(),
                result.players.len()
            );
            board.results.insert(id, *result);
            board.push_log(summary);
        }
        Delta::Failed { id, error } => {
            let Some(record) = board.runs.get_mut(&id) else {
                return;
            };
            if record.status != AnalysisStatus::Processing {
                return;
            }
            record.status = AnalysisStatus::Failed;
            record.message = "Failed".to_string();
            record.completed_at = Some(Utc::now());
            record.error = Some(error.clone());
            board.push_log(format!("[ERROR] Analysis {id} failed: {error}"));
        }
        Delta::Cancelled { id } => {
            if let Some(record) = board.runs.get_mut(&id)
                && record.status == AnalysisStatus::Processing
            {
                record.status = AnalysisStatus::Cancelled;
                record.message = "Cancelled".to_string();
                record.completed_at = Some(Utc::now());
            }
        }
        Delta::Log(msg) => board.push_log(msg),
    }
}
