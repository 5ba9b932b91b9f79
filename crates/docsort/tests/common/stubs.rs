//! Deterministic stand-ins for the extraction and classification adapters.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use lopdf::{dictionary, Document, Object, Stream};

use docsort::classifier::{Analysis, CategorySet, Classifier};
use docsort::error::{ClassificationError, ExtractionError};
use docsort::processor::Extractor;

/// Marker that makes [`TextFileExtractor`] fail, mimicking a corrupt document.
pub const CORRUPT_MARKER: &str = "%%CORRUPT%%";

/// Reads the document as UTF-8 text. Test inputs are plain text files with document extensions.
pub struct TextFileExtractor;

impl Extractor for TextFileExtractor {
    fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        let text = std::fs::read_to_string(path).map_err(|e| ExtractionError::ReadDocument {
            path: path.to_path_buf(),
            source: e,
        })?;
        if text.contains(CORRUPT_MARKER) {
            return Err(ExtractionError::Pdf("Failed to load PDF: corrupt xref".to_string()));
        }
        Ok(text)
    }
}

/// Builds an [`Analysis`].
pub fn analysis(category: &str, entities: &[(&str, &str)], summary: &str) -> Analysis {
    Analysis {
        category: category.to_string(),
        entities: entities
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
        summary: summary.to_string(),
    }
}

/// Classifies by the first rule whose needle occurs in the text.
#[derive(Clone, Default)]
pub struct StubClassifier {
    rules: Vec<(String, Result<Analysis, String>)>,
    calls: Arc<AtomicUsize>,
    raise_on_call: Option<Arc<AtomicBool>>,
}

impl StubClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, needle: &str, analysis: Analysis) -> Self {
        self.rules.push((needle.to_string(), Ok(analysis)));
        self
    }

    /// Texts containing `needle` fail with an invalid response.
    pub fn fail_on(mut self, needle: &str, message: &str) -> Self {
        self.rules.push((needle.to_string(), Err(message.to_string())));
        self
    }

    /// Sets `flag` on every classify call, as a Ctrl-C arriving mid-document would.
    pub fn raise_on_call(mut self, flag: Arc<AtomicBool>) -> Self {
        self.raise_on_call = Some(flag);
        self
    }

    /// Shared counter of classify calls, valid after the stub is boxed.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    /// The invoice setup used by most tests.
    pub fn invoices() -> Self {
        Self::new()
            .fail_on("FAIL", "model returned prose instead of JSON")
            .on(
                "Acme",
                analysis(
                    "invoices",
                    &[("vendor", "Acme Corp"), ("amount", "450")],
                    "Acme invoice",
                ),
            )
            .on(
                "Globex",
                analysis(
                    "contracts",
                    &[("organization", "Globex"), ("document_date", "2024-01-31")],
                    "Service agreement",
                ),
            )
            .on(
                "Recipe",
                analysis("recipes", &[], "Grandma's cake"),
            )
    }
}

impl Classifier for StubClassifier {
    fn classify(
        &self,
        text: &str,
        _categories: &CategorySet,
    ) -> Result<Analysis, ClassificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(flag) = &self.raise_on_call {
            flag.store(true, Ordering::SeqCst);
        }
        if text.trim().is_empty() {
            return Err(ClassificationError::EmptyInput);
        }
        self.rules
            .iter()
            .find(|(needle, _)| text.contains(needle.as_str()))
            .map(|(_, result)| {
                result
                    .clone()
                    .map_err(ClassificationError::InvalidResponse)
            })
            .unwrap_or_else(|| {
                Err(ClassificationError::InvalidResponse(
                    "no stub rule matches".to_string(),
                ))
            })
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// A one-page PDF with `text` drawn in Courier.
pub fn pdf_with_text(text: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let ops = format!("BT /F1 12 Tf 50 700 Td ({}) Tj ET", text);
    let content_id = doc.add_object(Stream::new(dictionary! {}, ops.into_bytes()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Resources" => resources_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("Failed to serialize PDF");
    bytes
}
