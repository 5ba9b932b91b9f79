//! Test harness for isolated batch runs.
//!
//! The `TestHarness` struct owns a temporary directory with input, output and report
//! folders, a `Config` pointing at them, and helpers to build a `Pipeline` around stub
//! adapters and inspect what a run left behind.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::NaiveDate;
use tempfile::TempDir;
use walkdir::WalkDir;

use docsort::audit::{AuditRecord, AUDIT_FILE_NAME};
use docsort::classifier::CategorySet;
use docsort::config::{load_config_from_str, Config, ConfigFormat, FileKind};
use docsort::pipeline::{NoopProgress, Pipeline, PipelineConfig};
use docsort::processor::{Extractor, ExtractorRegistry};
use docsort::routing::RoutingTable;
use docsort::storage::FileOrganizer;
use docsort::worker::{BatchRunner, RunSummary};

use super::stubs::{StubClassifier, TextFileExtractor};

/// Routing used unless a test passes its own.
pub const DEFAULT_ROUTING: &str = r#"
category_list: [invoices, contracts, other]
category_paths:
  invoices:
    folder: invoices
    naming: "{vendor}_{amount}.pdf"
  contracts:
    folder: "contracts/{year}"
    naming: "{date}_{organization}"
"#;

pub fn run_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 15).expect("valid date")
}

pub struct TestHarness {
    temp_dir: TempDir,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub report_dir: PathBuf,
    pub config: Config,
}

impl TestHarness {
    /// Sibling `inbox`, `output` and `reports` folders with the default routing.
    pub fn new() -> Self {
        Self::with_layout("inbox", "output", "reports", DEFAULT_ROUTING)
    }

    /// Folders are relative to the temp root and may nest. `routing_yaml` is appended
    /// verbatim to the generated config.
    pub fn with_layout(input: &str, output: &str, reports: &str, routing_yaml: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        let input_dir = base.join(input);
        let output_dir = base.join(output);
        let report_dir = base.join(reports);
        std::fs::create_dir_all(&input_dir).expect("Failed to create input directory");

        let yaml = format!(
            "input_folder: '{}'\noutput_folder: '{}'\nreport_folder: '{}'\n{}",
            input_dir.display(),
            output_dir.display(),
            report_dir.display(),
            routing_yaml
        );
        let config = load_config_from_str(&yaml, ConfigFormat::Yaml, None)
            .expect("Harness config must be valid");

        Self {
            temp_dir,
            input_dir,
            output_dir,
            report_dir,
            config,
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.config.dry_run = dry_run;
    }

    pub fn set_recursive(&mut self, recursive: bool) {
        self.config.recursive = recursive;
    }

    /// Writes a text "document" into the inbox and returns its path.
    pub fn write_input(&self, name: &str, text: &str) -> PathBuf {
        self.write_input_bytes(name, text.as_bytes())
    }

    pub fn write_input_bytes(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.input_dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create input subfolder");
        }
        std::fs::write(&path, bytes).expect("Failed to write input file");
        path
    }

    /// Pipeline with the text-file extractor for every kind.
    pub fn pipeline(&self, classifier: StubClassifier) -> Pipeline {
        self.build_pipeline(classifier, Box::new(TextFileExtractor), FileOrganizer::new())
    }

    pub fn pipeline_with_organizer(
        &self,
        classifier: StubClassifier,
        organizer: FileOrganizer,
    ) -> Pipeline {
        self.build_pipeline(classifier, Box::new(TextFileExtractor), organizer)
    }

    /// Pipeline with a custom PDF extractor. Images still use the text-file extractor.
    pub fn pipeline_with_pdf_extractor(
        &self,
        classifier: StubClassifier,
        pdf: Box<dyn Extractor>,
    ) -> Pipeline {
        self.build_pipeline(classifier, pdf, FileOrganizer::new())
    }

    fn build_pipeline(
        &self,
        classifier: StubClassifier,
        pdf: Box<dyn Extractor>,
        organizer: FileOrganizer,
    ) -> Pipeline {
        let mut extractors = ExtractorRegistry::new();
        extractors.register(FileKind::Pdf, pdf);
        extractors.register(FileKind::Image, Box::new(TextFileExtractor));

        Pipeline::new(
            Arc::new(PipelineConfig::from_config(&self.config)),
            extractors,
            Box::new(classifier),
            CategorySet::from_config(&self.config),
            RoutingTable::from_config(&self.config).expect("Harness routing must compile"),
            organizer,
        )
        .with_run_date(run_date())
    }

    /// One batch run with the given classifier.
    pub fn run(&self, classifier: StubClassifier) -> RunSummary {
        self.run_pipeline(self.pipeline(classifier))
    }

    pub fn run_pipeline(&self, pipeline: Pipeline) -> RunSummary {
        BatchRunner::new(pipeline)
            .run(&NoopProgress)
            .expect("Batch run must not fail fatally")
    }

    /// One batch run sharing `shutdown` with the runner, as the Ctrl-C handler does.
    pub fn run_with_shutdown(
        &self,
        classifier: StubClassifier,
        shutdown: Arc<AtomicBool>,
    ) -> RunSummary {
        BatchRunner::new(self.pipeline(classifier))
            .with_shutdown(shutdown)
            .run(&NoopProgress)
            .expect("Batch run must not fail fatally")
    }

    /// All audit records ever written to `audit.jsonl`.
    pub fn audit_records(&self) -> Vec<AuditRecord> {
        let path = self.report_dir.join(AUDIT_FILE_NAME);
        match std::fs::read_to_string(&path) {
            Ok(content) => content
                .lines()
                .map(|line| serde_json::from_str(line).expect("Audit line must be valid JSON"))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Files below `dir`, relative to it, sorted.
    pub fn files_under(dir: &Path) -> Vec<PathBuf> {
        if !dir.exists() {
            return Vec::new();
        }
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                e.path()
                    .strip_prefix(dir)
                    .expect("walkdir stays below its root")
                    .to_path_buf()
            })
            .collect();
        files.sort();
        files
    }

    pub fn output_files(&self) -> Vec<PathBuf> {
        Self::files_under(&self.output_dir)
    }

    pub fn input_files(&self) -> Vec<PathBuf> {
        Self::files_under(&self.input_dir)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
