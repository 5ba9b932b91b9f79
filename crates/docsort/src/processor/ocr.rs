//! OCR engines. The default shells out to the `tesseract` binary; the in-process
//! `leptess` binding is available behind the `leptess` feature.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::OcrConfig;
use crate::error::ExtractionError;

/// Recognizes text in a PNG image.
pub trait OcrEngine: Send + Sync {
    fn recognize_png(&self, png: &[u8]) -> Result<String, ExtractionError>;

    /// Resolution used when rendering PDF pages for this engine.
    fn dpi(&self) -> u32;
}

/// Tesseract's `-l` argument: languages joined with `+`, English when none are configured.
pub fn languages_arg(languages: &[String]) -> String {
    if languages.is_empty() {
        "eng".to_string()
    } else {
        languages.join("+")
    }
}

/// Decodes any supported image format and re-encodes it as PNG.
pub fn to_png(image_data: &[u8]) -> Result<Vec<u8>, ExtractionError> {
    let img = image::load_from_memory(image_data)
        .map_err(|e| ExtractionError::Image(format!("Failed to load image: {}", e)))?;

    let mut png_data = Vec::new();
    img.write_to(&mut Cursor::new(&mut png_data), image::ImageFormat::Png)
        .map_err(|e| ExtractionError::Image(format!("Failed to convert image: {}", e)))?;

    Ok(png_data)
}

/// A file in the system temp directory that is removed on drop.
pub(crate) struct ScratchFile(PathBuf);

impl ScratchFile {
    pub(crate) fn new(prefix: &str, extension: &str) -> Self {
        Self(std::env::temp_dir().join(format!(
            "docsort_{}_{}.{}",
            prefix,
            uuid::Uuid::new_v4(),
            extension
        )))
    }

    pub(crate) fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

/// Runs the `tesseract` command line tool.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: PathBuf,
    languages: String,
    dpi: u32,
}

impl TesseractCli {
    pub fn new(languages: &[String], dpi: u32) -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            languages: languages_arg(languages),
            dpi,
        }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        Self::new(&config.languages, config.dpi)
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn languages(&self) -> &str {
        &self.languages
    }
}

impl OcrEngine for TesseractCli {
    fn recognize_png(&self, png: &[u8]) -> Result<String, ExtractionError> {
        let _span = tracing::info_span!("processor.ocr", engine = "tesseract").entered();

        let input = ScratchFile::new("ocr", "png");
        std::fs::write(input.path(), png)
            .map_err(|e| ExtractionError::OcrFailed(format!("Failed to write temp image: {}", e)))?;

        let output = Command::new(&self.binary)
            .arg(input.path())
            .arg("stdout")
            .args(["-l", &self.languages, "--dpi", &self.dpi.to_string()])
            .output()
            .map_err(|e| {
                ExtractionError::OcrFailed(format!(
                    "Failed to run {}: {}. Make sure tesseract is installed.",
                    self.binary.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(ExtractionError::OcrFailed(format!(
                "tesseract failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn dpi(&self) -> u32 {
        self.dpi
    }
}

/// In-process Tesseract through `leptess`.
#[cfg(feature = "leptess")]
#[derive(Debug, Clone)]
pub struct LeptessOcr {
    languages: String,
    dpi: u32,
}

#[cfg(feature = "leptess")]
impl LeptessOcr {
    pub fn new(languages: &[String], dpi: u32) -> Self {
        Self {
            languages: languages_arg(languages),
            dpi,
        }
    }
}

#[cfg(feature = "leptess")]
impl OcrEngine for LeptessOcr {
    fn recognize_png(&self, png: &[u8]) -> Result<String, ExtractionError> {
        let _span = tracing::info_span!("processor.ocr", engine = "leptess").entered();

        let mut lt = leptess::LepTess::new(None, &self.languages).map_err(|e| {
            ExtractionError::OcrFailed(format!("Failed to initialize Tesseract: {}", e))
        })?;

        lt.set_image_from_mem(png).map_err(|e| {
            ExtractionError::OcrFailed(format!("Failed to set image for OCR: {}", e))
        })?;
        lt.set_source_resolution(self.dpi as i32);

        lt.get_utf8_text()
            .map_err(|e| ExtractionError::OcrFailed(format!("OCR failed: {}", e)))
    }

    fn dpi(&self) -> u32 {
        self.dpi
    }
}
