use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::secrets::SecretError;

#[derive(Error, Debug)]
pub enum DocsortError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("Classifier setup failed: {0}")]
    Classifier(#[from] ClassificationError),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid template '{template}' for category '{category}': {reason}")]
    InvalidTemplate {
        category: String,
        template: String,
        reason: String,
    },

    #[error("No config file found (tried {0})")]
    NotFound(String),
}

/// Failures of the extraction stage.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Unsupported file kind: {0}")]
    UnsupportedKind(String),

    #[error("Failed to read document '{path}': {source}")]
    ReadDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to process PDF: {0}")]
    Pdf(String),

    #[error("Failed to process image: {0}")]
    Image(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("OCR is disabled and the document has no embedded text")]
    OcrDisabled,

    #[error("No usable text found in '{0}'")]
    NoText(PathBuf),
}

/// Failures of the classification stage.
#[derive(Error, Debug)]
pub enum ClassificationError {
    #[error("Refusing to classify empty text")]
    EmptyInput,

    #[error("Missing credentials: {0}")]
    Credentials(#[from] SecretError),

    #[error("Request to model endpoint failed: {0}")]
    Transport(String),

    #[error("Model request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Model endpoint returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    #[error("Category '{category}' is not one of the configured categories [{allowed}]")]
    CategoryOutOfSet { category: String, allowed: String },

    #[error("Classifier runtime error: {0}")]
    Runtime(String),
}

impl ClassificationError {
    /// Errors worth repeating the identical request for.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Failures of the routing stage.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RoutingError {
    #[error("No routing rule for category '{0}' and no fallback rule configured")]
    UnmappedCategory(String),

    #[error("Unresolved placeholder '{{{placeholder}}}' in template '{template}'")]
    UnresolvedPlaceholder { placeholder: String, template: String },

    #[error("Invalid destination: {0}")]
    InvalidPath(String),

    #[error("Date format '{0}' cannot render a calendar date")]
    DateFormat(String),
}

/// Failures of the organize stage. The source file is intact whenever one of these is returned.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move file from '{from}' to '{to}': {source}")]
    MoveFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Source file '{0}' does not exist")]
    SourceMissing(PathBuf),

    #[error("No free file name left for '{0}'")]
    CollisionsExhausted(PathBuf),
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Input folder '{0}' does not exist")]
    InputMissing(PathBuf),

    #[error("Input path '{0}' is not a directory")]
    NotADirectory(PathBuf),

    #[error("Directory scan failed for '{path}': {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Failed to create report folder '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write audit file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize audit record: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DocsortError>;
