//! Maps a classified document to its destination folder and file name.
//!
//! Resolution is a pure function of the configured rules, the analysis, the source path
//! and the run date. Nothing here touches the filesystem.

pub mod template;

use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};

use chrono::NaiveDate;

use crate::classifier::Analysis;
use crate::config::{CategoryRule, Config, FileKind};
use crate::error::{ConfigError, RoutingError};

pub use template::{sanitize_value, Template, TemplateSyntaxError};

/// Longest generated file name, extension included.
pub const MAX_FILENAME_CHARS: usize = 120;

/// Placeholders that are filled without consulting the model's entities.
pub const BUILTIN_PLACEHOLDERS: &[&str] = &[
    "category",
    "summary",
    "content_summary",
    "original",
    "ext",
    "date",
    "year",
    "month",
    "day",
];

/// Entity keys consulted, in order, for the document date.
const DATE_ENTITY_KEYS: &[&str] = &["document_date", "date"];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    // Two-digit years first, `%Y` would read "24" as the year 24
    "%d.%m.%y",
    "%d.%m.%Y",
    "%d/%m/%Y",
    "%Y.%m.%d",
    "%d %B %Y",
    "%B %d, %Y",
];

/// A resolved destination, relative to the output folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub folder: PathBuf,
    pub filename: String,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    category: String,
    folder: Template,
    naming: Template,
    defaults: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct RoutingTable {
    rules: Vec<CompiledRule>,
    fallback: Option<String>,
    date_format: String,
}

impl RoutingTable {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::new(
            config.category_rules(),
            config.fallback_category.clone(),
            config.date_format.clone(),
        )
    }

    /// Compiles the templates of every rule.
    pub fn new(
        rules: Vec<CategoryRule>,
        fallback: Option<String>,
        date_format: String,
    ) -> Result<Self, ConfigError> {
        let rules = rules
            .into_iter()
            .map(compile_rule)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            rules,
            fallback,
            date_format,
        })
    }

    /// Entity keys referenced by any template, excluding built-ins.
    pub fn entity_placeholders(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for rule in &self.rules {
            for name in rule.folder.placeholders().chain(rule.naming.placeholders()) {
                if !is_builtin(name) && !keys.iter().any(|k| k == name) {
                    keys.push(name.to_string());
                }
            }
        }
        keys
    }

    /// `(category, folder template, naming template)` per rule, for display.
    pub fn describe(&self) -> Vec<(String, String, String)> {
        self.rules
            .iter()
            .map(|r| {
                (
                    r.category.clone(),
                    r.folder.as_str().to_string(),
                    r.naming.as_str().to_string(),
                )
            })
            .collect()
    }

    pub fn resolve(
        &self,
        analysis: &Analysis,
        source: &Path,
        run_date: NaiveDate,
    ) -> Result<Route, RoutingError> {
        let rule = self
            .rule_for(&analysis.category)
            .ok_or_else(|| RoutingError::UnmappedCategory(analysis.category.clone()))?;

        let date = document_date(analysis).unwrap_or(run_date);
        let source_ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_string();
        let original = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        let date_text = format_date(date, &self.date_format)
            .ok_or_else(|| RoutingError::DateFormat(self.date_format.clone()))?;

        let lookup = |name: &str| -> Option<String> {
            match name {
                "category" => return Some(analysis.category.clone()),
                "summary" | "content_summary" => {
                    return Some(analysis.summary.clone()).filter(|s| !s.trim().is_empty())
                }
                "original" => return Some(original.clone()),
                "ext" => return Some(source_ext.clone()).filter(|e| !e.is_empty()),
                "date" => return Some(date_text.clone()),
                "year" => return Some(date.format("%Y").to_string()),
                "month" => return Some(date.format("%m").to_string()),
                "day" => return Some(date.format("%d").to_string()),
                _ => {}
            }
            entity(analysis, name).or_else(|| {
                rule.defaults
                    .iter()
                    .find(|(k, _)| k == name || k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v.clone())
            })
        };

        let folder = rule.folder.render(&lookup)?;
        let folder = normalize_folder(&folder)?;

        let filename = rule.naming.render(&lookup)?;
        let filename = finish_filename(&filename, &source_ext)?;

        Ok(Route { folder, filename })
    }

    /// The rule for `category`, or the fallback rule.
    fn rule_for(&self, category: &str) -> Option<&CompiledRule> {
        self.find_rule(category)
            .or_else(|| self.fallback.as_deref().and_then(|f| self.find_rule(f)))
    }

    fn find_rule(&self, category: &str) -> Option<&CompiledRule> {
        self.rules
            .iter()
            .find(|r| r.category == category)
            .or_else(|| {
                self.rules
                    .iter()
                    .find(|r| r.category.eq_ignore_ascii_case(category.trim()))
            })
    }
}

fn compile_rule(rule: CategoryRule) -> Result<CompiledRule, ConfigError> {
    let invalid = |template: &str, reason: String| ConfigError::InvalidTemplate {
        category: rule.category.clone(),
        template: template.to_string(),
        reason,
    };

    let folder =
        Template::parse(&rule.folder).map_err(|e| invalid(&rule.folder, e.to_string()))?;
    let naming =
        Template::parse(&rule.naming).map_err(|e| invalid(&rule.naming, e.to_string()))?;

    if naming.literal_text().contains(['/', '\\']) {
        return Err(invalid(
            &rule.naming,
            "file name templates must not contain path separators".to_string(),
        ));
    }
    if Path::new(folder.as_str()).is_absolute() {
        return Err(invalid(
            &rule.folder,
            "folder templates must be relative to the output folder".to_string(),
        ));
    }

    Ok(CompiledRule {
        category: rule.category,
        folder,
        naming,
        defaults: rule.defaults.into_iter().collect(),
    })
}

fn is_builtin(name: &str) -> bool {
    BUILTIN_PLACEHOLDERS.contains(&name)
}

/// Entity value by exact key, then by case-insensitive key.
fn entity(analysis: &Analysis, name: &str) -> Option<String> {
    analysis
        .entities
        .get(name)
        .or_else(|| {
            analysis
                .entities
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
        .filter(|v| !v.trim().is_empty())
        .cloned()
}

fn document_date(analysis: &Analysis) -> Option<NaiveDate> {
    DATE_ENTITY_KEYS
        .iter()
        .filter_map(|key| entity(analysis, key))
        .find_map(|value| parse_date(&value))
}

/// Renders `date` with a strftime `format`.
///
/// `None` when the format asks for something a plain date lacks, such as `%H` or `%z`.
pub fn format_date(date: NaiveDate, format: &str) -> Option<String> {
    let mut out = String::new();
    write!(out, "{}", date.format(format)).ok()?;
    Some(out)
}

/// Parses a date in one of the common European or ISO notations.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    // ISO timestamps: only the date part matters
    let candidates = [value, value.split(['T', ' ']).next().unwrap_or(value)];
    candidates.iter().find_map(|candidate| {
        DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(candidate, fmt).ok())
    })
}

/// Splits the rendered folder into components, rejecting anything that leaves the output root.
fn normalize_folder(rendered: &str) -> Result<PathBuf, RoutingError> {
    let path = Path::new(rendered);
    let mut folder = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => folder.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(RoutingError::InvalidPath(format!(
                    "folder '{}' escapes the output folder",
                    rendered
                )))
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(RoutingError::InvalidPath(format!(
                    "folder '{}' is absolute",
                    rendered
                )))
            }
        }
    }
    if folder.as_os_str().is_empty() {
        return Err(RoutingError::InvalidPath(format!(
            "folder '{}' is empty",
            rendered
        )));
    }
    Ok(folder)
}

/// Appends the source extension when needed and caps the length.
fn finish_filename(rendered: &str, source_ext: &str) -> Result<String, RoutingError> {
    let rendered = rendered.trim().trim_matches('.');
    if rendered.is_empty() {
        return Err(RoutingError::InvalidPath("file name is empty".to_string()));
    }

    let (stem, ext) = match rendered.rsplit_once('.') {
        Some((stem, ext)) if FileKind::from_extension(ext).is_some() && !stem.is_empty() => {
            (stem.to_string(), ext.to_string())
        }
        _ => (rendered.to_string(), source_ext.to_string()),
    };

    let suffix_len = if ext.is_empty() { 0 } else { ext.chars().count() + 1 };
    let budget = MAX_FILENAME_CHARS.saturating_sub(suffix_len);
    let stem: String = stem.chars().take(budget).collect();
    let stem = stem.trim_end_matches(['_', '.', ' ']);

    if stem.is_empty() {
        return Err(RoutingError::InvalidPath("file name is empty".to_string()));
    }

    Ok(if ext.is_empty() {
        stem.to_string()
    } else {
        format!("{}.{}", stem, ext)
    })
}
