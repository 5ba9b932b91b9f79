use std::path::{Path, PathBuf};

use super::task::Stage;
use crate::sanitize::redact_path;

/// Events emitted by the controller while it works through the inbox.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A stage is about to run.
    Stage { stage: Stage },
    Organized {
        destination: PathBuf,
        category: String,
    },
    /// Dry run: where the file would have gone.
    Planned {
        destination: PathBuf,
        category: String,
    },
    Failed { stage: Stage, error: String },
    /// Not processed, e.g. because it already lives under an output root.
    Skipped { reason: String },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, source: &Path, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _source: &Path, _event: ProgressEvent) {}
}

/// Writes human-readable progress lines through `log`.
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&self, source: &Path, event: ProgressEvent) {
        let file = redact_path(source);
        match event {
            ProgressEvent::Stage { stage } => log::debug!("{}: {}", file, stage),
            ProgressEvent::Organized {
                destination,
                category,
            } => log::info!("{} -> {} [{}]", file, destination.display(), category),
            ProgressEvent::Planned {
                destination,
                category,
            } => log::info!(
                "{} would move to {} [{}] (dry run)",
                file,
                destination.display(),
                category
            ),
            ProgressEvent::Failed { stage, error } => {
                log::error!("{} failed during {}: {}", file, stage, error)
            }
            ProgressEvent::Skipped { reason } => log::debug!("{} skipped: {}", file, reason),
        }
    }
}
