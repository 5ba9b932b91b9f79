use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tracing::{debug, info_span, warn};

use crate::classifier::{CachedClassifier, CategorySet, Classifier, OpenAiClassifier};
use crate::config::Config;
use crate::error::DocsortError;
use crate::processor::ExtractorRegistry;
use crate::routing::{Route, RoutingTable};
use crate::sanitize;
use crate::storage::FileOrganizer;

use super::config::PipelineConfig;
use super::error::PipelineError;
use super::progress::{ProgressEvent, ProgressReporter};
use super::task::{DocumentTask, InvalidTransition, Stage, TaskState};

/// Capacity of the per-run classification cache.
const CLASSIFICATION_CACHE_CAPACITY: u64 = 512;

/// Drives one document through extraction, classification, routing and organizing.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    extractors: ExtractorRegistry,
    classifier: Box<dyn Classifier>,
    categories: CategorySet,
    routing: RoutingTable,
    organizer: FileOrganizer,
    run_date: NaiveDate,
}

impl Pipeline {
    /// Production constructor, builds all sub-components from config.
    pub fn from_config(config: &Config) -> Result<Self, DocsortError> {
        let routing = RoutingTable::from_config(config)?;
        let openai = OpenAiClassifier::from_config(config, routing.entity_placeholders())?;
        let classifier: Box<dyn Classifier> = if config.llm.cache {
            Box::new(CachedClassifier::new(openai, CLASSIFICATION_CACHE_CAPACITY))
        } else {
            Box::new(openai)
        };

        Ok(Self::new(
            Arc::new(PipelineConfig::from_config(config)),
            ExtractorRegistry::from_ocr_config(&config.ocr),
            classifier,
            CategorySet::from_config(config),
            routing,
            FileOrganizer::new(),
        ))
    }

    /// Injects specific sub-components. Used by tests and embedders.
    pub fn new(
        config: Arc<PipelineConfig>,
        extractors: ExtractorRegistry,
        classifier: Box<dyn Classifier>,
        categories: CategorySet,
        routing: RoutingTable,
        organizer: FileOrganizer,
    ) -> Self {
        Self {
            config,
            extractors,
            classifier,
            categories,
            routing,
            organizer,
            run_date: Local::now().date_naive(),
        }
    }

    /// Pins the date used when a document carries none.
    pub fn with_run_date(mut self, run_date: NaiveDate) -> Self {
        self.run_date = run_date;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// True if `path` lives under the output or report folder and must not be processed again.
    pub fn should_skip(&self, path: &Path) -> bool {
        let canonical = path.canonicalize().ok();
        self.config.output_roots().iter().any(|root| {
            if path.starts_with(root) {
                return true;
            }
            match (&canonical, root.canonicalize()) {
                (Some(file), Ok(root)) => file.starts_with(root),
                _ => false,
            }
        })
    }

    /// Runs all steps for a single document and returns it in a terminal state,
    /// or `Classified` with a planned path in dry-run mode.
    ///
    /// Errors are recorded on the task and never propagate, so one bad file
    /// cannot stop the batch.
    pub fn run(&self, mut task: DocumentTask, progress: &dyn ProgressReporter) -> DocumentTask {
        let source = task.source_path().to_path_buf();
        let filename = sanitize::redact_path(&source);
        let _pipeline_span = info_span!("pipeline",
            task_id = %task.id(),
            filename = %filename,
            kind = %task.file_kind(),
        )
        .entered();

        // Step 1: Extract text
        {
            let _step = info_span!("extract_text").entered();
            progress.report(&source, ProgressEvent::Stage { stage: Stage::Extraction });
            if let Err(e) = self.step_extract(&mut task) {
                return self.fail(task, Stage::Extraction, e, progress);
            }
        }

        // Step 2: Classify
        {
            let _step = info_span!("classify").entered();
            progress.report(&source, ProgressEvent::Stage { stage: Stage::Classification });
            if let Err(e) = self.step_classify(&mut task) {
                return self.fail(task, Stage::Classification, e, progress);
            }
        }

        // Step 3: Route
        let destination = {
            let _step = info_span!("route").entered();
            progress.report(&source, ProgressEvent::Stage { stage: Stage::Routing });
            match self.step_route(&task) {
                Ok(route) => route,
                Err(e) => return self.fail(task, Stage::Routing, e, progress),
            }
        };

        // Step 4: Organize
        {
            let _step = info_span!("organize", dry_run = self.config.dry_run).entered();
            progress.report(&source, ProgressEvent::Stage { stage: Stage::Organize });
            if let Err(e) = self.step_organize(&mut task, &destination) {
                return self.fail(task, Stage::Organize, e, progress);
            }
        }

        let category = task
            .analysis()
            .map(|a| a.category.clone())
            .unwrap_or_default();
        if let Some(path) = task.destination_path() {
            progress.report(
                &source,
                ProgressEvent::Organized {
                    destination: path.to_path_buf(),
                    category,
                },
            );
        } else if let Some(path) = task.planned_path() {
            progress.report(
                &source,
                ProgressEvent::Planned {
                    destination: path.to_path_buf(),
                    category,
                },
            );
        }

        task
    }

    fn step_extract(&self, task: &mut DocumentTask) -> Result<(), PipelineError> {
        let text = self
            .extractors
            .extract(task.source_path(), task.file_kind())?;
        debug!(
            chars = text.chars().count(),
            text_hash = %sanitize::hash_text(&text),
            "Text extracted"
        );
        task.mark_extracted(text)?;
        Ok(())
    }

    fn step_classify(&self, task: &mut DocumentTask) -> Result<(), PipelineError> {
        let text = task.extracted_text().unwrap_or_default();
        let raw = self.classifier.classify(text, &self.categories)?;
        let analysis = self.categories.validate(raw)?;
        debug!(
            classifier = self.classifier.name(),
            category = %analysis.category,
            entities = analysis.entities.len(),
            "Document classified"
        );
        task.mark_classified(analysis)?;
        Ok(())
    }

    fn step_route(&self, task: &DocumentTask) -> Result<Route, PipelineError> {
        let analysis = task.analysis().ok_or_else(|| {
            PipelineError::Transition(InvalidTransition {
                task: task.id(),
                from: task.state(),
                to: TaskState::Organized,
            })
        })?;
        let route = self
            .routing
            .resolve(analysis, task.source_path(), self.run_date)?;
        debug!(folder = %route.folder.display(), file = %route.filename, "Route resolved");
        Ok(route)
    }

    fn step_organize(&self, task: &mut DocumentTask, route: &Route) -> Result<(), PipelineError> {
        let dest_dir: PathBuf = self.config.output_folder.join(&route.folder);
        if self.config.dry_run {
            let planned = self.organizer.plan(&dest_dir, &route.filename)?;
            task.mark_planned(planned)?;
        } else {
            let final_path = self
                .organizer
                .organize(task.source_path(), &dest_dir, &route.filename)?;
            task.mark_organized(final_path)?;
        }
        Ok(())
    }

    fn fail(
        &self,
        mut task: DocumentTask,
        step: Stage,
        error: PipelineError,
        progress: &dyn ProgressReporter,
    ) -> DocumentTask {
        let stage = error.stage().unwrap_or(step);
        let message = error.to_string();
        warn!(stage = %stage, error = %message, "Document failed");
        if let Err(e) = task.fail(stage, message.clone()) {
            warn!(error = %e, "Could not record failure on task");
        }
        progress.report(
            task.source_path(),
            ProgressEvent::Failed {
                stage,
                error: message,
            },
        );
        task
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use std::sync::Mutex;

    use tempfile::TempDir;

    use crate::classifier::Analysis;
    use crate::config::{CategoryRule, FileKind};
    use crate::error::{ClassificationError, ExtractionError};
    use crate::pipeline::progress::NoopProgress;
    use crate::processor::Extractor;

    struct FixedText(&'static str);

    impl Extractor for FixedText {
        fn extract(&self, _path: &Path) -> Result<String, ExtractionError> {
            Ok(self.0.to_string())
        }
    }

    struct FixedClassifier(Result<Analysis, String>);

    impl Classifier for FixedClassifier {
        fn classify(
            &self,
            _text: &str,
            _categories: &CategorySet,
        ) -> Result<Analysis, ClassificationError> {
            self.0
                .clone()
                .map_err(ClassificationError::InvalidResponse)
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressEvent>>);

    impl ProgressReporter for Recorder {
        fn report(&self, _source: &Path, event: ProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn invoice() -> Analysis {
        let mut entities = BTreeMap::new();
        entities.insert("vendor".to_string(), "Acme Corp".to_string());
        entities.insert("amount".to_string(), "450".to_string());
        Analysis {
            category: "INVOICES".to_string(),
            entities,
            summary: "Invoice".to_string(),
        }
    }

    struct Fixture {
        dir: TempDir,
        config: PipelineConfig,
    }

    impl Fixture {
        fn new(dry_run: bool) -> Self {
            let dir = TempDir::new().unwrap();
            let config = PipelineConfig {
                input_folder: dir.path().join("inbox"),
                output_folder: dir.path().join("output"),
                report_folder: dir.path().join("reports"),
                recursive: false,
                dry_run,
            };
            fs::create_dir_all(&config.input_folder).unwrap();
            Self { dir, config }
        }

        fn pipeline(&self, result: Result<Analysis, String>) -> Pipeline {
            let mut extractors = ExtractorRegistry::new();
            extractors.register(FileKind::Pdf, Box::new(FixedText("Invoice from Acme")));
            let routing = RoutingTable::new(
                vec![CategoryRule {
                    category: "invoices".to_string(),
                    folder: "invoices".to_string(),
                    naming: "{vendor}_{amount}".to_string(),
                    defaults: BTreeMap::new(),
                }],
                None,
                "%y%m%d".to_string(),
            )
            .unwrap();
            Pipeline::new(
                Arc::new(self.config.clone()),
                extractors,
                Box::new(FixedClassifier(result)),
                CategorySet::new(vec!["invoices".to_string()], None),
                routing,
                FileOrganizer::new(),
            )
            .with_run_date(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
        }

        fn inbox_file(&self, name: &str) -> PathBuf {
            let path = self.config.input_folder.join(name);
            fs::write(&path, b"%PDF-1.4 stub").unwrap();
            path
        }
    }

    #[test]
    fn test_run_organizes_document() {
        let fx = Fixture::new(false);
        let source = fx.inbox_file("invoice_acme.pdf");
        let pipeline = fx.pipeline(Ok(invoice()));
        let recorder = Recorder::default();

        let task = pipeline.run(DocumentTask::new(&source).unwrap(), &recorder);

        let expected = fx.config.output_folder.join("invoices/Acme_Corp_450.pdf");
        assert_eq!(task.state(), TaskState::Organized);
        assert_eq!(task.destination_path(), Some(expected.as_path()));
        // Category spelling normalized to the configured label
        assert_eq!(task.analysis().unwrap().category, "invoices");
        assert!(expected.exists());
        assert!(!source.exists());

        let events = recorder.0.lock().unwrap();
        assert!(matches!(
            events.last(),
            Some(ProgressEvent::Organized { category, .. }) if category == "invoices"
        ));
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let fx = Fixture::new(true);
        let source = fx.inbox_file("invoice_acme.pdf");
        let pipeline = fx.pipeline(Ok(invoice()));

        let task = pipeline.run(DocumentTask::new(&source).unwrap(), &NoopProgress);

        assert_eq!(task.state(), TaskState::Classified);
        assert_eq!(
            task.planned_path(),
            Some(fx.config.output_folder.join("invoices/Acme_Corp_450.pdf").as_path())
        );
        assert!(source.exists());
        assert!(!fx.config.output_folder.exists());
    }

    #[test]
    fn test_classification_failure_leaves_source() {
        let fx = Fixture::new(false);
        let source = fx.inbox_file("broken.pdf");
        let pipeline = fx.pipeline(Err("not json".to_string()));

        let task = pipeline.run(DocumentTask::new(&source).unwrap(), &NoopProgress);

        assert_eq!(task.state(), TaskState::Failed);
        assert_eq!(task.error().unwrap().stage, Stage::Classification);
        assert!(task.extracted_text().is_some());
        assert!(source.exists());
    }

    #[test]
    fn test_out_of_set_category_fails_without_fallback() {
        let fx = Fixture::new(false);
        let source = fx.inbox_file("letter.pdf");
        let mut analysis = invoice();
        analysis.category = "recipes".to_string();
        let pipeline = fx.pipeline(Ok(analysis));

        let task = pipeline.run(DocumentTask::new(&source).unwrap(), &NoopProgress);

        assert_eq!(task.state(), TaskState::Failed);
        assert_eq!(task.error().unwrap().stage, Stage::Classification);
        assert!(task.error().unwrap().message.contains("recipes"));
        assert!(source.exists());
    }

    #[test]
    fn test_unresolved_placeholder_fails_routing() {
        let fx = Fixture::new(false);
        let source = fx.inbox_file("invoice.pdf");
        let mut analysis = invoice();
        analysis.entities.remove("amount");
        let pipeline = fx.pipeline(Ok(analysis));

        let task = pipeline.run(DocumentTask::new(&source).unwrap(), &NoopProgress);

        assert_eq!(task.state(), TaskState::Failed);
        assert_eq!(task.error().unwrap().stage, Stage::Routing);
        assert!(task.error().unwrap().message.contains("{amount}"));
        assert!(source.exists());
        assert!(!fx.config.output_folder.exists());
    }

    #[test]
    fn test_unregistered_kind_fails_extraction() {
        let fx = Fixture::new(false);
        let source = fx.config.input_folder.join("scan.png");
        fs::write(&source, b"png").unwrap();
        let pipeline = fx.pipeline(Ok(invoice()));

        let task = pipeline.run(DocumentTask::new(&source).unwrap(), &NoopProgress);

        assert_eq!(task.state(), TaskState::Failed);
        assert_eq!(task.error().unwrap().stage, Stage::Extraction);
    }

    #[test]
    fn test_should_skip_output_roots() {
        let fx = Fixture::new(false);
        let pipeline = fx.pipeline(Ok(invoice()));

        assert!(pipeline.should_skip(&fx.config.output_folder.join("invoices/a.pdf")));
        assert!(pipeline.should_skip(&fx.config.report_folder.join("report.json")));
        assert!(!pipeline.should_skip(&fx.config.input_folder.join("a.pdf")));
        assert!(!pipeline.should_skip(&fx.dir.path().join("output-old/a.pdf")));
    }
}
