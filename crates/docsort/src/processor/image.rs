use std::path::Path;
use std::sync::Arc;

use crate::error::ExtractionError;
use crate::processor::ocr::{to_png, OcrEngine};
use crate::processor::Extractor;

/// OCRs scans and photos. Every format is normalized to PNG first.
pub struct ImageExtractor {
    ocr: Option<Arc<dyn OcrEngine>>,
}

impl ImageExtractor {
    pub fn new(ocr: Option<Arc<dyn OcrEngine>>) -> Self {
        Self { ocr }
    }
}

impl Extractor for ImageExtractor {
    fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        let _span = tracing::info_span!("processor.image").entered();

        let image_data = std::fs::read(path).map_err(|e| ExtractionError::ReadDocument {
            path: path.to_path_buf(),
            source: e,
        })?;

        // Decode even without OCR so corrupt images are reported as such
        let png = to_png(&image_data)?;

        match &self.ocr {
            Some(ocr) => ocr.recognize_png(&png),
            None => Err(ExtractionError::OcrDisabled),
        }
    }
}
