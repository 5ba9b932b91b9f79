use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use crate::error::ExtractionError;
use crate::processor::ocr::{OcrEngine, ScratchFile};
use crate::processor::Extractor;

/// Reads embedded PDF text, falling back to OCR of rendered pages for scans.
pub struct PdfExtractor {
    ocr: Option<Arc<dyn OcrEngine>>,
}

impl PdfExtractor {
    pub fn new(ocr: Option<Arc<dyn OcrEngine>>) -> Self {
        Self { ocr }
    }
}

impl Extractor for PdfExtractor {
    fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        let _span = tracing::info_span!("processor.pdf").entered();

        let pdf_bytes = std::fs::read(path).map_err(|e| ExtractionError::ReadDocument {
            path: path.to_path_buf(),
            source: e,
        })?;

        match lopdf::Document::load_mem(&pdf_bytes) {
            Ok(doc) => {
                let text = extract_text_from_pdf(&doc);
                if !should_use_ocr(&text) {
                    return Ok(text);
                }
                match &self.ocr {
                    Some(ocr) => {
                        let _ocr_span =
                            tracing::info_span!("processor.ocr_fallback", reason = "text_quality")
                                .entered();
                        ocr_pages(&pdf_bytes, doc.get_pages().len(), ocr.as_ref())
                    }
                    // Blank text is reported as NoText by the registry
                    None if text.trim().is_empty() => Ok(text),
                    None => Err(ExtractionError::OcrDisabled),
                }
            }
            Err(e) => {
                // lopdf rejects some PDFs poppler still renders (e.g. broken xref tables)
                tracing::warn!(
                    file = %crate::sanitize::redact_path(path),
                    error = %e,
                    "lopdf failed to parse PDF, falling back to OCR"
                );
                match &self.ocr {
                    Some(ocr) => {
                        let _ocr_span = tracing::info_span!(
                            "processor.ocr_fallback",
                            reason = "lopdf_parse_failed"
                        )
                        .entered();
                        let page_count = count_pdf_pages(&pdf_bytes)?;
                        ocr_pages(&pdf_bytes, page_count, ocr.as_ref())
                    }
                    None => Err(ExtractionError::Pdf(format!(
                        "Failed to load PDF: {}. OCR fallback unavailable.",
                        e
                    ))),
                }
            }
        }
    }
}

fn extract_text_from_pdf(doc: &lopdf::Document) -> String {
    let mut text = String::new();

    for page_num in doc.get_pages().keys() {
        if let Ok(page_text) = doc.extract_text(&[*page_num]) {
            text.push_str(&page_text);
            text.push('\n');
        }
    }

    text
}

/// OCRs every page. Single page failures are skipped; failing all pages is an error.
fn ocr_pages(
    pdf_bytes: &[u8],
    page_count: usize,
    ocr: &dyn OcrEngine,
) -> Result<String, ExtractionError> {
    let mut all_text = String::new();
    let mut last_error = None;

    for page_num in 1..=page_count as u32 {
        let page_text = render_pdf_page_to_image(pdf_bytes, page_num, ocr.dpi())
            .and_then(|png| ocr.recognize_png(&png));
        match page_text {
            Ok(text) => {
                all_text.push_str(&text);
                all_text.push('\n');
            }
            Err(e) => {
                tracing::warn!(page = page_num, error = %e, "Skipping page that could not be OCRed");
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) if all_text.trim().is_empty() => Err(e),
        _ => Ok(all_text),
    }
}

/// Pattern for Identity-H Unimplemented errors (common with CID fonts).
const IDENTITY_H_PATTERN: &str = "?Identity-H Unimplemented?";

/// Text shorter than this is accepted regardless of its character composition.
const MIN_TOTAL_CHARS: usize = 50;

/// Below this share of alphanumeric characters the text is considered garbled.
const MIN_ALPHANUMERIC_PERCENT: usize = 10;

/// True when the embedded text is empty, only font error markers, or mostly garbage.
fn should_use_ocr(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return true;
    }

    let cleaned = trimmed
        .replace(IDENTITY_H_PATTERN, "")
        .replace(['\n', ' '], "");
    if cleaned.is_empty() {
        return true;
    }

    let total_chars = trimmed.chars().count();
    let alphanumeric_chars = trimmed.chars().filter(|c| c.is_alphanumeric()).count();

    total_chars > MIN_TOTAL_CHARS
        && alphanumeric_chars * 100 < total_chars * MIN_ALPHANUMERIC_PERCENT
}

/// Page count via `pdfinfo`, for PDFs lopdf cannot open.
fn count_pdf_pages(pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
    let pdf = ScratchFile::new("pagecount", "pdf");
    std::fs::write(pdf.path(), pdf_bytes)
        .map_err(|e| ExtractionError::Pdf(format!("Failed to write temp PDF: {}", e)))?;

    let output = Command::new("pdfinfo")
        .arg(pdf.path())
        .output()
        .map_err(|e| {
            ExtractionError::Pdf(format!(
                "Failed to run pdfinfo: {}. Make sure poppler-utils is installed.",
                e
            ))
        })?;

    if !output.status.success() {
        return Err(ExtractionError::Pdf(format!(
            "pdfinfo failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(parse_page_count(&String::from_utf8_lossy(&output.stdout)).unwrap_or(1))
}

fn parse_page_count(pdfinfo_output: &str) -> Option<usize> {
    pdfinfo_output
        .lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|count| count.trim().parse().ok())
}

/// Renders one page to PNG with `pdftoppm`.
fn render_pdf_page_to_image(
    pdf_bytes: &[u8],
    page_num: u32,
    dpi: u32,
) -> Result<Vec<u8>, ExtractionError> {
    let pdf = ScratchFile::new("render", "pdf");
    let output_prefix = std::env::temp_dir().join(format!("docsort_page_{}", uuid::Uuid::new_v4()));

    std::fs::write(pdf.path(), pdf_bytes)
        .map_err(|e| ExtractionError::Pdf(format!("Failed to write temp PDF: {}", e)))?;

    let page = page_num.to_string();
    let output = Command::new("pdftoppm")
        .args(["-png", "-r", &dpi.to_string(), "-f", &page, "-l", &page])
        .arg(pdf.path())
        .arg(&output_prefix)
        .output()
        .map_err(|e| {
            ExtractionError::Pdf(format!(
                "Failed to run pdftoppm: {}. Make sure poppler-utils is installed.",
                e
            ))
        })?;

    if !output.status.success() {
        return Err(ExtractionError::Pdf(format!(
            "pdftoppm failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    // pdftoppm zero-pads the page suffix depending on the page count
    let prefix = output_prefix.display();
    let candidates = [
        format!("{}-{}.png", prefix, page_num),
        format!("{}-{:02}.png", prefix, page_num),
        format!("{}-{:03}.png", prefix, page_num),
    ];
    let image_path = candidates
        .iter()
        .map(Path::new)
        .find(|p| p.exists())
        .ok_or_else(|| ExtractionError::Pdf("Failed to find rendered page image".to_string()))?;

    let image_data = std::fs::read(image_path)
        .map_err(|e| ExtractionError::Pdf(format!("Failed to read rendered image: {}", e)));
    let _ = std::fs::remove_file(image_path);

    image_data
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Document, Object, Stream};
    use tempfile::NamedTempFile;

    struct FixedOcr(&'static str);

    impl OcrEngine for FixedOcr {
        fn recognize_png(&self, _png: &[u8]) -> Result<String, ExtractionError> {
            Ok(self.0.to_string())
        }

        fn dpi(&self) -> u32 {
            150
        }
    }

    fn pdf_with_content(content: Option<&str>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.new_object_id();
        let resources_id = doc.new_object_id();
        let page_id = doc.new_object_id();

        doc.objects.insert(
            font_id,
            Object::Dictionary(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Courier",
            }),
        );
        doc.objects.insert(
            resources_id,
            Object::Dictionary(dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            }),
        );

        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => resources_id,
        };
        if let Some(text) = content {
            let ops = format!("BT /F1 12 Tf 50 700 Td ({}) Tj ET", text);
            let content_id = doc.add_object(Stream::new(dictionary! {}, ops.into_bytes()));
            page.set("Contents", content_id);
        }
        doc.objects.insert(page_id, Object::Dictionary(page));
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
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn write_temp(bytes: &[u8]) -> NamedTempFile {
        let file = NamedTempFile::with_suffix(".pdf").unwrap();
        std::fs::write(file.path(), bytes).unwrap();
        file
    }

    #[test]
    fn test_extracts_embedded_text() {
        let file = write_temp(&pdf_with_content(Some("Invoice from Acme Corp")));
        let text = PdfExtractor::new(None).extract(file.path()).unwrap();
        assert!(text.contains("Invoice from Acme Corp"), "got: {:?}", text);
    }

    #[test]
    fn test_embedded_text_skips_ocr() {
        let file = write_temp(&pdf_with_content(Some("Invoice from Acme Corp")));
        let extractor = PdfExtractor::new(Some(Arc::new(FixedOcr("from ocr"))));
        let text = extractor.extract(file.path()).unwrap();
        assert!(!text.contains("from ocr"));
    }

    #[test]
    fn test_blank_pdf_without_ocr_returns_blank_text() {
        let file = write_temp(&pdf_with_content(None));
        let text = PdfExtractor::new(None).extract(file.path()).unwrap();
        assert!(text.trim().is_empty());
    }

    #[test]
    fn test_corrupted_pdf_without_ocr() {
        let file = write_temp(b"not a valid pdf content");
        let err = PdfExtractor::new(None).extract(file.path()).unwrap_err();
        assert!(
            matches!(err, ExtractionError::Pdf(ref msg) if msg.contains("Failed to load PDF")),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_missing_file() {
        let err = PdfExtractor::new(None)
            .extract(Path::new("/nonexistent/file.pdf"))
            .unwrap_err();
        match err {
            ExtractionError::ReadDocument { path, .. } => {
                assert_eq!(path, Path::new("/nonexistent/file.pdf"));
            }
            other => panic!("Expected ReadDocument error, got {other}"),
        }
    }

    #[test]
    fn test_parse_page_count() {
        let output = "Title:          Scan\nPages:          3\nEncrypted:      no\n";
        assert_eq!(parse_page_count(output), Some(3));
        assert_eq!(parse_page_count("garbage"), None);
    }

    #[test]
    fn test_should_use_ocr_empty_text() {
        assert!(should_use_ocr(""));
        assert!(should_use_ocr("  \t  \n  "));
    }

    #[test]
    fn test_should_use_ocr_identity_h_only() {
        assert!(should_use_ocr(
            "?Identity-H Unimplemented?\n\n?Identity-H Unimplemented?"
        ));
        assert!(!should_use_ocr(
            "Invoice #123 ?Identity-H Unimplemented? Total: $500"
        ));
    }

    #[test]
    fn test_should_use_ocr_valid_and_short_text() {
        assert!(!should_use_ocr("Rechnung Nr. 12345 vom 15.03.2024"));
        assert!(!should_use_ocr("!@#$%"));
        assert!(!should_use_ocr("Grüße aus Köln, Straße 5"));
    }

    #[test]
    fn test_should_use_ocr_threshold_boundary() {
        // 6 of 51 characters alphanumeric: 11.7%
        let text = format!("abcdef{}", "!".repeat(45));
        assert!(!should_use_ocr(&text));

        // 4 of 51 characters alphanumeric: 7.8%
        let text = format!("abcd{}", "!".repeat(47));
        assert!(should_use_ocr(&text));

        // Exactly MIN_TOTAL_CHARS is still too short for the ratio check
        assert!(!should_use_ocr(&"!".repeat(MIN_TOTAL_CHARS)));
        assert!(should_use_ocr(&"!".repeat(MIN_TOTAL_CHARS + 1)));
    }
}
