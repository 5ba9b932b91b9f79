use std::path::{Path, PathBuf};

use crate::config::Config;

/// The parts of [`Config`] the controller needs at run time.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input_folder: PathBuf,
    pub output_folder: PathBuf,
    pub report_folder: PathBuf,
    pub recursive: bool,
    pub dry_run: bool,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            input_folder: config.input_folder.clone(),
            output_folder: config.output_folder.clone(),
            report_folder: config.report_folder.clone(),
            recursive: config.recursive,
            dry_run: config.dry_run,
        }
    }

    /// Folders whose contents were written by docsort and are never picked up again.
    pub fn output_roots(&self) -> [&Path; 2] {
        [&self.output_folder, &self.report_folder]
    }
}
