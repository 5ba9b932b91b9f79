use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info, warn};

use crate::audit::{AuditLog, AuditRecord, RunTotals};
use crate::error::DocsortError;
use crate::pipeline::{DocumentTask, Pipeline, ProgressEvent, ProgressReporter, TaskState};
use crate::sanitize::redact_path;
use crate::worker::scanner::DirectoryScanner;

/// Exit code for a run stopped by Ctrl-C before every file was started.
pub const EXIT_INTERRUPTED: i32 = 130;
/// Exit code when every attempted file failed.
pub const EXIT_ALL_FAILED: i32 = 1;
/// Exit code for configuration and other fatal errors.
pub const EXIT_FATAL: i32 = 2;

/// Outcome of one pass over the inbox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub discovered: usize,
    pub organized: usize,
    pub failed: usize,
    pub planned: usize,
    pub skipped: usize,
    pub interrupted: bool,
    pub report_path: Option<PathBuf>,
}

impl RunSummary {
    pub fn attempted(&self) -> usize {
        self.organized + self.failed + self.planned
    }

    /// 0 on full or partial success and on an empty inbox.
    pub fn exit_code(&self) -> i32 {
        if self.interrupted {
            EXIT_INTERRUPTED
        } else if self.attempted() > 0 && self.failed == self.attempted() {
            EXIT_ALL_FAILED
        } else {
            0
        }
    }

    fn totals(&self) -> RunTotals {
        RunTotals {
            organized: self.organized,
            failed: self.failed,
            planned: self.planned,
            skipped: self.skipped,
        }
    }
}

/// Runs the pipeline over every document in the input folder, one at a time.
pub struct BatchRunner {
    pipeline: Pipeline,
    shutdown: Arc<AtomicBool>,
}

impl BatchRunner {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares a stop flag with a signal handler. Checked between files.
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Processes the inbox once.
    ///
    /// Only setup failures (report folder, input folder) are errors. Per-file failures are
    /// counted in the summary.
    pub fn run(&self, progress: &dyn ProgressReporter) -> Result<RunSummary, DocsortError> {
        let config = self.pipeline.config();
        let mut audit = AuditLog::open(&config.report_folder)?;
        let files = DirectoryScanner::new(&config.input_folder, config.recursive).scan()?;

        let mut summary = RunSummary {
            discovered: files.len(),
            ..Default::default()
        };
        if config.dry_run {
            info!("Dry run: no files will be moved");
        }

        for path in files {
            if self.shutdown.load(Ordering::Relaxed) {
                warn!("Shutdown requested, stopping before {}", redact_path(&path));
                summary.interrupted = true;
                break;
            }

            if self.pipeline.should_skip(&path) {
                summary.skipped += 1;
                progress.report(
                    &path,
                    ProgressEvent::Skipped {
                        reason: "already under an output folder".to_string(),
                    },
                );
                continue;
            }

            let Some(task) = DocumentTask::new(&path) else {
                summary.skipped += 1;
                progress.report(
                    &path,
                    ProgressEvent::Skipped {
                        reason: "unsupported file kind".to_string(),
                    },
                );
                continue;
            };

            let task = self.pipeline.run(task, progress);
            match task.state() {
                TaskState::Organized => summary.organized += 1,
                TaskState::Failed => summary.failed += 1,
                _ if task.planned_path().is_some() => summary.planned += 1,
                state => warn!("Task {} ended in unexpected state {:?}", task.id(), state),
            }

            if let Some(record) = AuditRecord::from_task(&task) {
                // The file has already moved, so a lost audit line must not stop the batch
                if let Err(e) = audit.append(record) {
                    error!("Failed to write audit record for {}: {}", task.id(), e);
                }
            }
        }

        match audit.write_report(&summary.totals(), config.dry_run, summary.interrupted) {
            Ok(path) => summary.report_path = Some(path),
            Err(e) => error!("Failed to write run report: {}", e),
        }

        info!(
            "Run finished: {} discovered, {} organized, {} planned, {} failed, {} skipped{}",
            summary.discovered,
            summary.organized,
            summary.planned,
            summary.failed,
            summary.skipped,
            if summary.interrupted {
                " (interrupted)"
            } else {
                ""
            }
        );
        Ok(summary)
    }
}
