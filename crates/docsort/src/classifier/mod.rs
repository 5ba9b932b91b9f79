//! Classification of extracted text into a category, entities and a summary.

pub mod cache;
pub mod openai;
pub mod prompt;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::ClassificationError;

pub use cache::CachedClassifier;
pub use openai::{ClassifierSettings, OpenAiClassifier};

/// Structured result of one classification call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub category: String,
    #[serde(default)]
    pub entities: BTreeMap<String, String>,
    #[serde(default)]
    pub summary: String,
}

/// The configured category labels and the optional fallback.
#[derive(Debug, Clone)]
pub struct CategorySet {
    names: Vec<String>,
    fallback: Option<String>,
}

impl CategorySet {
    pub fn new(names: Vec<String>, fallback: Option<String>) -> Self {
        Self { names, fallback }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.category_list.clone(),
            config.fallback_category.clone(),
        )
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn fallback(&self) -> Option<&str> {
        self.fallback.as_deref()
    }

    /// Finds the configured spelling of `label`, ignoring case and surrounding whitespace.
    pub fn find(&self, label: &str) -> Option<&str> {
        let wanted = label.trim().to_lowercase();
        self.names
            .iter()
            .find(|name| name.to_lowercase() == wanted)
            .map(String::as_str)
    }

    /// Normalizes the category of `analysis` to a configured label.
    ///
    /// An unknown label is replaced by the fallback when one is configured.
    pub fn validate(&self, mut analysis: Analysis) -> Result<Analysis, ClassificationError> {
        if let Some(name) = self.find(&analysis.category) {
            analysis.category = name.to_string();
            return Ok(analysis);
        }

        match &self.fallback {
            Some(fallback) => {
                tracing::warn!(
                    returned = %analysis.category,
                    fallback = %fallback,
                    "Model returned an unknown category, using fallback"
                );
                analysis.category = fallback.clone();
                Ok(analysis)
            }
            None => Err(ClassificationError::CategoryOutOfSet {
                category: analysis.category,
                allowed: self.names.join(", "),
            }),
        }
    }
}

/// A backend that classifies document text with one model call.
pub trait Classifier: Send + Sync {
    fn classify(&self, text: &str, categories: &CategorySet)
        -> Result<Analysis, ClassificationError>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Returns the first `max_chars` characters of `text`.
pub fn truncate_input(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categories(fallback: Option<&str>) -> CategorySet {
        CategorySet::new(
            vec!["Invoices".to_string(), "contracts".to_string()],
            fallback.map(str::to_string),
        )
    }

    fn analysis(category: &str) -> Analysis {
        Analysis {
            category: category.to_string(),
            entities: BTreeMap::new(),
            summary: "x".to_string(),
        }
    }

    #[test]
    fn test_find_is_case_insensitive_and_trimmed() {
        let set = categories(None);
        assert_eq!(set.find("invoices"), Some("Invoices"));
        assert_eq!(set.find("  CONTRACTS\n"), Some("contracts"));
        assert_eq!(set.find("receipts"), None);
    }

    #[test]
    fn test_validate_normalizes_spelling() {
        let set = categories(None);
        let result = set.validate(analysis("invoices ")).unwrap();
        assert_eq!(result.category, "Invoices");
    }

    #[test]
    fn test_validate_rejects_unknown_without_fallback() {
        let set = categories(None);
        let err = set.validate(analysis("receipts")).unwrap_err();
        match err {
            ClassificationError::CategoryOutOfSet { category, allowed } => {
                assert_eq!(category, "receipts");
                assert_eq!(allowed, "Invoices, contracts");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_uses_fallback() {
        let set = categories(Some("contracts"));
        let result = set.validate(analysis("receipts")).unwrap();
        assert_eq!(result.category, "contracts");
    }

    #[test]
    fn test_truncate_input() {
        assert_eq!(truncate_input("abcdef", 3), "abc");
        assert_eq!(truncate_input("abc", 10), "abc");
        assert_eq!(truncate_input("äöüß", 2), "äö");
        assert_eq!(truncate_input("abc", 0), "");
    }

    #[test]
    fn test_analysis_deserializes_without_optional_fields() {
        let parsed: Analysis = serde_json::from_str(r#"{"category": "Invoices"}"#).unwrap();
        assert!(parsed.entities.is_empty());
        assert!(parsed.summary.is_empty());
    }
}
