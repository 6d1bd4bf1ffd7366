use crate::error::ExtractionError;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_MIN_STRUCTURED_CHARS: usize = 40;
pub const DEFAULT_RENDER_SCALE: f32 = 2.0;
pub const DEFAULT_OCR_LANGUAGES: &str = "eng+hin+mar";
pub const DEFAULT_READ_CHUNK_BYTES: usize = 64 * 1024;

/// Tunables for one extraction run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Trimmed structured text shorter than this (in chars) triggers OCR
    pub min_structured_chars: usize,
    /// Upscaling factor applied when rasterizing pages for OCR
    pub render_scale: f32,
    /// Recognition bundle passed to the OCR engine, e.g. `eng+hin+mar`
    pub ocr_languages: String,
    pub ocr_enabled: bool,
    /// Chunk size used when reading text-like files
    pub read_chunk_bytes: usize,
    /// Files larger than this get no preview handle
    pub max_preview_bytes: Option<usize>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_structured_chars: DEFAULT_MIN_STRUCTURED_CHARS,
            render_scale: DEFAULT_RENDER_SCALE,
            ocr_languages: DEFAULT_OCR_LANGUAGES.to_string(),
            ocr_enabled: true,
            read_chunk_bytes: DEFAULT_READ_CHUNK_BYTES,
            max_preview_bytes: None,
        }
    }
}

impl ExtractionConfig {
    pub fn validate(&self) -> Result<(), ExtractionError> {
        if !(self.render_scale > 0.0) {
            return Err(ExtractionError::ConfigError(format!(
                "render_scale must be positive, got {}",
                self.render_scale
            )));
        }
        if self.read_chunk_bytes == 0 {
            return Err(ExtractionError::ConfigError(
                "read_chunk_bytes must be at least 1".to_string(),
            ));
        }
        if self.ocr_languages.trim().is_empty() {
            return Err(ExtractionError::ConfigError(
                "ocr_languages must name at least one language".to_string(),
            ));
        }
        Ok(())
    }
}

/// Process-wide settings handed to `runtime::init`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding the pdfium shared library
    pub pdfium_library_dir: Option<PathBuf>,
    /// Path (or bare name on PATH) of the tesseract binary
    pub tesseract_path: String,
    pub tessdata_dir: Option<PathBuf>,
    pub extraction: ExtractionConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pdfium_library_dir: None,
            tesseract_path: "tesseract".to_string(),
            tessdata_dir: None,
            extraction: ExtractionConfig::default(),
        }
    }
}

impl Settings {
    pub fn from_json_str(json: &str) -> Result<Self, ExtractionError> {
        let settings: Settings = serde_json::from_str(json)
            .map_err(|e| ExtractionError::ConfigError(format!("Invalid settings JSON: {}", e)))?;
        settings.extraction.validate()?;
        Ok(settings)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ExtractionError> {
        info!("Loading settings from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Apply `LEXPRIME_*` environment overrides on top of these settings
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("LEXPRIME_PDFIUM_DIR") {
            debug!("pdfium directory overridden from environment: {}", dir);
            self.pdfium_library_dir = Some(PathBuf::from(dir));
        }
        if let Some(bin) = lookup("LEXPRIME_TESSERACT") {
            debug!("tesseract binary overridden from environment: {}", bin);
            self.tesseract_path = bin;
        }
        if let Some(dir) = lookup("LEXPRIME_TESSDATA") {
            self.tessdata_dir = Some(PathBuf::from(dir));
        }
        self
    }
}
