use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub input_folder: PathBuf,
    pub output_folder: PathBuf,
    pub report_folder: PathBuf,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default = "default_date_format")]
    pub date_format: String,
    #[serde(default = "default_naming")]
    pub default_naming: String,
    pub category_list: Vec<String>,
    #[serde(default)]
    pub fallback_category: Option<String>,
    #[serde(default)]
    pub category_paths: BTreeMap<String, CategoryPath>,
}

fn default_language() -> String {
    "de".to_string()
}

fn default_date_format() -> String {
    "%y%m%d".to_string()
}

fn default_naming() -> String {
    "{date}_{category}_{organization}_{summary}".to_string()
}

/// Settings for the OpenAI-compatible classification endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Direct API key. Prefer `api_key_file` or `api_key_env`.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    /// Identical retries on transient transport errors.
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    /// Reuse results for byte-identical texts within one run.
    #[serde(default = "default_true")]
    pub cache: bool,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> Option<String> {
    Some("OPENAI_API_KEY".to_string())
}

fn default_timeout() -> u64 {
    60
}

fn default_max_input_chars() -> usize {
    8000
}

fn default_true() -> bool {
    true
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: 0.0,
            api_base: default_api_base(),
            api_key: None,
            api_key_file: None,
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_timeout(),
            max_retries: 0,
            max_input_chars: default_max_input_chars(),
            cache: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
}

fn default_languages() -> Vec<String> {
    vec!["deu".to_string(), "eng".to_string()]
}

fn default_dpi() -> u32 {
    300
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            languages: default_languages(),
            dpi: default_dpi(),
        }
    }
}

/// Destination settings of one category, as written in the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryPath {
    /// Folder template relative to `output_folder`. Defaults to the category name.
    #[serde(default)]
    pub folder: Option<String>,
    /// Filename template. Defaults to `default_naming`.
    #[serde(default)]
    pub naming: Option<String>,
    /// Values for entity placeholders the model did not return.
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
}

/// Fully resolved routing rule of one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRule {
    pub category: String,
    pub folder: String,
    pub naming: String,
    pub defaults: BTreeMap<String, String>,
}

impl Config {
    /// One rule per listed category, in list order.
    ///
    /// Categories without an entry in `category_paths` route to a folder named after
    /// themselves with the default naming.
    pub fn category_rules(&self) -> Vec<CategoryRule> {
        self.category_list
            .iter()
            .map(|category| {
                let entry = self.category_paths.get(category);
                CategoryRule {
                    category: category.clone(),
                    folder: entry
                        .and_then(|e| e.folder.clone())
                        .unwrap_or_else(|| category.clone()),
                    naming: entry
                        .and_then(|e| e.naming.clone())
                        .unwrap_or_else(|| self.default_naming.clone()),
                    defaults: entry.map(|e| e.defaults.clone()).unwrap_or_default(),
                }
            })
            .collect()
    }
}

/// Kind of an input document, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Image,
}

impl FileKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "png" | "jpg" | "jpeg" | "tiff" | "tif" | "bmp" | "gif" | "webp" => Some(Self::Image),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Image => "image",
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
