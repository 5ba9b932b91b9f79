use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDate;

use crate::config::schema::Config;
use crate::error::ConfigError;
use crate::routing::{format_date, RoutingTable, Template};
use crate::secrets::expand_home;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    /// JSON for `.json` files, YAML for everything else.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// Loads, validates and resolves a config file.
///
/// Relative folders are resolved against the directory containing the file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let base_dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    load_config_from_str(&content, ConfigFormat::from_path(path), base_dir)
}

pub fn load_config_from_str(
    content: &str,
    format: ConfigFormat,
    base_dir: Option<&Path>,
) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
        ConfigFormat::Json => serde_json::from_str(content)?,
    };

    validate_schema(&json_value)?;

    let mut config: Config = serde_json::from_value(json_value)?;

    config.input_folder = resolve_path(&config.input_folder, base_dir);
    config.output_folder = resolve_path(&config.output_folder, base_dir);
    config.report_folder = resolve_path(&config.report_folder, base_dir);

    validate_config(&config)?;

    Ok(config)
}

fn resolve_path(path: &Path, base_dir: Option<&Path>) -> PathBuf {
    let expanded = expand_home(&path.to_string_lossy());
    match base_dir {
        Some(base) if expanded.is_relative() => base.join(expanded),
        _ => expanded,
    }
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validation(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

/// Semantic checks that the schema cannot express.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Categories
    let mut seen = HashSet::new();
    for category in &config.category_list {
        if category.trim().is_empty() {
            return Err(validation("category names must not be blank"));
        }
        if !seen.insert(category.trim().to_lowercase()) {
            return Err(validation(format!(
                "category '{}' is listed more than once",
                category
            )));
        }
    }

    for category in config.category_paths.keys() {
        if !config.category_list.contains(category) {
            return Err(validation(format!(
                "category_paths has an entry for '{}', which is not in category_list",
                category
            )));
        }
    }

    if let Some(fallback) = &config.fallback_category {
        if !config.category_list.contains(fallback) {
            return Err(validation(format!(
                "fallback_category '{}' is not in category_list",
                fallback
            )));
        }
    }

    // Templates
    Template::parse(&config.default_naming).map_err(|e| ConfigError::InvalidTemplate {
        category: "<default_naming>".to_string(),
        template: config.default_naming.clone(),
        reason: e.to_string(),
    })?;
    RoutingTable::from_config(config)?;

    let sample = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default();
    if StrftimeItems::new(&config.date_format).any(|item| matches!(item, Item::Error))
        || format_date(sample, &config.date_format).is_none()
    {
        return Err(validation(format!(
            "date_format '{}' is not a valid strftime format",
            config.date_format
        )));
    }

    // Folders
    if config.input_folder == config.output_folder {
        return Err(validation(
            "input_folder and output_folder must be different",
        ));
    }
    if config.input_folder == config.report_folder {
        return Err(validation(
            "input_folder and report_folder must be different",
        ));
    }

    // Model
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        return Err(validation(format!(
            "llm.temperature must be between 0 and 2, got {}",
            config.llm.temperature
        )));
    }
    if config.llm.max_input_chars == 0 {
        return Err(validation("llm.max_input_chars must be greater than 0"));
    }
    if config.llm.request_timeout_secs == 0 {
        return Err(validation("llm.request_timeout_secs must be greater than 0"));
    }

    Ok(())
}
