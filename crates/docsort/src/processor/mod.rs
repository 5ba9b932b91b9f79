//! Text extraction, dispatched by [`FileKind`].

pub mod image;
pub mod ocr;
pub mod pdf;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::{FileKind, OcrConfig};
use crate::error::ExtractionError;

pub use self::image::ImageExtractor;
pub use ocr::{OcrEngine, TesseractCli};
pub use pdf::PdfExtractor;

/// Turns one input file into raw text. Must not modify the file.
pub trait Extractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String, ExtractionError>;
}

/// One extractor per file kind.
#[derive(Default)]
pub struct ExtractorRegistry {
    extractors: HashMap<FileKind, Box<dyn Extractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// PDF and image extractors sharing one OCR engine, or none when OCR is disabled.
    pub fn from_ocr_config(config: &OcrConfig) -> Self {
        let ocr: Option<Arc<dyn OcrEngine>> = if config.enabled {
            Some(default_ocr_engine(config))
        } else {
            None
        };

        let mut registry = Self::new();
        registry.register(FileKind::Pdf, Box::new(PdfExtractor::new(ocr.clone())));
        registry.register(FileKind::Image, Box::new(ImageExtractor::new(ocr)));
        registry
    }

    /// Replaces the extractor for `kind`.
    pub fn register(&mut self, kind: FileKind, extractor: Box<dyn Extractor>) {
        self.extractors.insert(kind, extractor);
    }

    pub fn supports(&self, kind: FileKind) -> bool {
        self.extractors.contains_key(&kind)
    }

    /// Extracts text, treating blank output as a failure.
    pub fn extract(&self, path: &Path, kind: FileKind) -> Result<String, ExtractionError> {
        let extractor = self
            .extractors
            .get(&kind)
            .ok_or_else(|| ExtractionError::UnsupportedKind(kind.to_string()))?;

        let text = extractor.extract(path)?;
        if text.trim().is_empty() {
            return Err(ExtractionError::NoText(path.to_path_buf()));
        }
        Ok(text)
    }
}

#[cfg(feature = "leptess")]
fn default_ocr_engine(config: &OcrConfig) -> Arc<dyn OcrEngine> {
    Arc::new(ocr::LeptessOcr::new(&config.languages, config.dpi))
}

#[cfg(not(feature = "leptess"))]
fn default_ocr_engine(config: &OcrConfig) -> Arc<dyn OcrEngine> {
    Arc::new(TesseractCli::from_config(config))
}
