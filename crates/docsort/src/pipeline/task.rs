//! One document's way through the pipeline.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::classifier::Analysis;
use crate::config::FileKind;

/// Lifecycle states. Transitions only move forward; `Failed` is reachable from any
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Discovered,
    Extracted,
    Classified,
    Organized,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Organized | Self::Failed)
    }
}

/// The pipeline step a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Extraction,
    Classification,
    Routing,
    Organize,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extraction => "extraction",
            Self::Classification => "classification",
            Self::Routing => "routing",
            Self::Organize => "organize",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskError {
    pub stage: Stage,
    pub message: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid transition of task {task} from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub task: Uuid,
    pub from: TaskState,
    pub to: TaskState,
}

#[derive(Debug, Clone)]
pub struct DocumentTask {
    id: Uuid,
    source_path: PathBuf,
    file_kind: FileKind,
    discovered_at: DateTime<Utc>,
    state: TaskState,
    extracted_text: Option<String>,
    analysis: Option<Analysis>,
    planned_path: Option<PathBuf>,
    destination_path: Option<PathBuf>,
    error: Option<TaskError>,
}

impl DocumentTask {
    /// Creates a task for `source_path`, or `None` if the extension is not a supported kind.
    pub fn new(source_path: impl Into<PathBuf>) -> Option<Self> {
        let source_path = source_path.into();
        let file_kind = FileKind::from_path(&source_path)?;
        Some(Self {
            id: Uuid::new_v4(),
            source_path,
            file_kind,
            discovered_at: Utc::now(),
            state: TaskState::Discovered,
            extracted_text: None,
            analysis: None,
            planned_path: None,
            destination_path: None,
            error: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn file_kind(&self) -> FileKind {
        self.file_kind
    }

    pub fn discovered_at(&self) -> DateTime<Utc> {
        self.discovered_at
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn extracted_text(&self) -> Option<&str> {
        self.extracted_text.as_deref()
    }

    pub fn analysis(&self) -> Option<&Analysis> {
        self.analysis.as_ref()
    }

    /// Destination chosen in dry-run mode. The file was not moved.
    pub fn planned_path(&self) -> Option<&Path> {
        self.planned_path.as_deref()
    }

    pub fn destination_path(&self) -> Option<&Path> {
        self.destination_path.as_deref()
    }

    pub fn error(&self) -> Option<&TaskError> {
        self.error.as_ref()
    }

    fn advance(&mut self, from: TaskState, to: TaskState) -> Result<(), InvalidTransition> {
        if self.state != from {
            return Err(InvalidTransition {
                task: self.id,
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    pub fn mark_extracted(&mut self, text: String) -> Result<(), InvalidTransition> {
        self.advance(TaskState::Discovered, TaskState::Extracted)?;
        self.extracted_text = Some(text);
        Ok(())
    }

    pub fn mark_classified(&mut self, analysis: Analysis) -> Result<(), InvalidTransition> {
        self.advance(TaskState::Extracted, TaskState::Classified)?;
        self.analysis = Some(analysis);
        Ok(())
    }

    /// Records the would-be destination of a dry run. The state stays `Classified`.
    pub fn mark_planned(&mut self, destination: PathBuf) -> Result<(), InvalidTransition> {
        if self.state != TaskState::Classified || self.planned_path.is_some() {
            return Err(InvalidTransition {
                task: self.id,
                from: self.state,
                to: TaskState::Classified,
            });
        }
        self.planned_path = Some(destination);
        Ok(())
    }

    pub fn mark_organized(&mut self, destination: PathBuf) -> Result<(), InvalidTransition> {
        self.advance(TaskState::Classified, TaskState::Organized)?;
        self.destination_path = Some(destination);
        Ok(())
    }

    pub fn fail(&mut self, stage: Stage, message: impl Into<String>) -> Result<(), InvalidTransition> {
        if self.state.is_terminal() {
            return Err(InvalidTransition {
                task: self.id,
                from: self.state,
                to: TaskState::Failed,
            });
        }
        self.state = TaskState::Failed;
        self.error = Some(TaskError {
            stage,
            message: message.into(),
        });
        Ok(())
    }
}
