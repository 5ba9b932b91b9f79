//! Durable record of what happened to each document.
//!
//! Every terminal task becomes one JSON line in `audit.jsonl`. At the end of a run a
//! `report_<timestamp>.json` with all records of that run and totals is written next to it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuditError;
use crate::pipeline::{DocumentTask, TaskState};
use crate::storage::candidate_names;

pub const AUDIT_FILE_NAME: &str = "audit.jsonl";

pub type Result<T> = std::result::Result<T, AuditError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Organized,
    Failed,
    /// Dry run, the file was left in place.
    Planned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub task_id: Uuid,
    pub source: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub status: AuditStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    /// Builds the record for a finished task. Returns `None` for tasks still in flight.
    pub fn from_task(task: &DocumentTask) -> Option<Self> {
        let (status, destination) = match task.state() {
            TaskState::Organized => (
                AuditStatus::Organized,
                task.destination_path().map(Path::to_path_buf),
            ),
            TaskState::Failed => (AuditStatus::Failed, None),
            TaskState::Classified if task.planned_path().is_some() => (
                AuditStatus::Planned,
                task.planned_path().map(Path::to_path_buf),
            ),
            _ => return None,
        };

        let analysis = task.analysis();
        Some(Self {
            task_id: task.id(),
            source: task.source_path().to_path_buf(),
            destination,
            category: analysis.map(|a| a.category.clone()),
            status,
            stage: task.error().map(|e| e.stage.as_str().to_string()),
            error: task.error().map(|e| e.message.clone()),
            summary: analysis
                .map(|a| a.summary.clone())
                .filter(|s| !s.is_empty()),
            timestamp: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub organized: usize,
    pub failed: usize,
    pub planned: usize,
    pub skipped: usize,
}

#[derive(Debug, Serialize)]
struct RunReport<'a> {
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    dry_run: bool,
    interrupted: bool,
    totals: &'a RunTotals,
    records: &'a [AuditRecord],
}

/// Append-only audit trail in the report folder.
pub struct AuditLog {
    folder: PathBuf,
    path: PathBuf,
    file: File,
    records: Vec<AuditRecord>,
    started_at: DateTime<Utc>,
}

impl AuditLog {
    /// Creates the report folder if needed and opens `audit.jsonl` for appending.
    pub fn open(report_folder: &Path) -> Result<Self> {
        fs::create_dir_all(report_folder).map_err(|e| AuditError::CreateDirectory {
            path: report_folder.to_path_buf(),
            source: e,
        })?;
        let path = report_folder.join(AUDIT_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AuditError::Write {
                path: path.clone(),
                source: e,
            })?;

        Ok(Self {
            folder: report_folder.to_path_buf(),
            path,
            file,
            records: Vec::new(),
            started_at: Utc::now(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records of this run, in the order they were appended.
    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    /// Appends one record as a single line and flushes it to disk.
    pub fn append(&mut self, record: AuditRecord) -> Result<()> {
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.flush())
            .map_err(|e| AuditError::Write {
                path: self.path.clone(),
                source: e,
            })?;
        self.records.push(record);
        Ok(())
    }

    /// Writes `report_<YYYYmmdd_HHMMSS>.json` and returns its path.
    ///
    /// Never overwrites an earlier report of the same second.
    pub fn write_report(
        &self,
        totals: &RunTotals,
        dry_run: bool,
        interrupted: bool,
    ) -> Result<PathBuf> {
        let report = RunReport {
            started_at: self.started_at,
            finished_at: Utc::now(),
            dry_run,
            interrupted,
            totals,
            records: &self.records,
        };
        let body = serde_json::to_vec_pretty(&report)?;

        let name = format!("report_{}.json", Local::now().format("%Y%m%d_%H%M%S"));
        for candidate in candidate_names(&name) {
            let path = self.folder.join(candidate);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(&body).map_err(|e| AuditError::Write {
                        path: path.clone(),
                        source: e,
                    })?;
                    return Ok(path);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(AuditError::Write { path, source: e }),
            }
        }

        Err(AuditError::Write {
            path: self.folder.join(name),
            source: io::Error::new(io::ErrorKind::AlreadyExists, "no free report name"),
        })
    }
}
