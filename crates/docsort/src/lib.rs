pub mod audit;
pub mod classifier;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod processor;
pub mod routing;
pub mod sanitize;
pub mod secrets;
pub mod storage;
pub mod worker;

pub use audit::{AuditLog, AuditRecord, AuditStatus};
pub use classifier::{Analysis, CategorySet, Classifier};
pub use config::{load_config, Config, FileKind};
pub use error::{
    AuditError, ClassificationError, ConfigError, DocsortError, ExtractionError, Result,
    RoutingError, ScanError, StorageError,
};
pub use pipeline::{DocumentTask, Pipeline, PipelineConfig, Stage, TaskState};
pub use routing::{Route, RoutingTable};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use storage::FileOrganizer;
pub use worker::{BatchRunner, DirectoryScanner, RunSummary};
