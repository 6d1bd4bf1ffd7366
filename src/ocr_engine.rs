use crate::error::ExtractionError;
use crate::pdf_backend::PdfBackend;
use crate::progress::{self, ProgressReporter};
use crate::text_extractor::PAGE_SEPARATOR;
use anyhow::Context;
use image::{DynamicImage, ImageFormat};
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use tokio::process::Command;

// Control characters except newline and tab; tesseract ends each page with a form feed
static CONTROL_CHARS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("Invalid control chars regex")
});

/// Optical character recognition over one raster image
#[allow(async_fn_in_trait)]
pub trait OcrEngine {
    /// Recognize `image` using a `+`-joined language bundle such as `eng+hin+mar`.
    ///
    /// `on_progress` receives the fraction of this image recognized so far.
    async fn recognize(
        &self,
        image: &DynamicImage,
        languages: &str,
        on_progress: &mut dyn FnMut(f32),
    ) -> anyhow::Result<String>;
}

/// Runs the `tesseract` command-line tool on a temporary PNG
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: String,
    tessdata_dir: Option<PathBuf>,
}

impl TesseractCli {
    pub fn new(binary: impl Into<String>, tessdata_dir: Option<PathBuf>) -> Self {
        TesseractCli {
            binary: binary.into(),
            tessdata_dir,
        }
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new("tesseract", None)
    }
}

impl OcrEngine for TesseractCli {
    async fn recognize(
        &self,
        image: &DynamicImage,
        languages: &str,
        on_progress: &mut dyn FnMut(f32),
    ) -> anyhow::Result<String> {
        on_progress(0.0);

        let input = tempfile::Builder::new()
            .prefix("lexprime-ocr-")
            .suffix(".png")
            .tempfile()
            .context("Failed to create temp file for OCR input")?;
        image
            .save_with_format(input.path(), ImageFormat::Png)
            .context("Failed to write OCR input image")?;

        let mut command = Command::new(&self.binary);
        command.arg(input.path()).arg("stdout").arg("-l").arg(languages);
        if let Some(dir) = &self.tessdata_dir {
            command.arg("--tessdata-dir").arg(dir);
        }

        debug!("Running {} on {}x{} image", self.binary, image.width(), image.height());
        let output = command
            .output()
            .await
            .with_context(|| format!("Failed to run tesseract (is it installed? path='{}')", self.binary))?;

        if !output.status.success() {
            anyhow::bail!(
                "Tesseract OCR failed (exit code {}): {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        on_progress(1.0);
        Ok(clean_recognized_text(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Drop control characters (keeping newlines and tabs) and trailing whitespace
pub fn clean_recognized_text(text: &str) -> String {
    CONTROL_CHARS_REGEX.replace_all(text, "").trim_end().to_string()
}

/// Fallback stage: rasterize every page and recognize it
pub struct OcrFallback<O> {
    engine: O,
    render_scale: f32,
    languages: String,
}

impl<O: OcrEngine> OcrFallback<O> {
    pub fn new(engine: O, render_scale: f32, languages: impl Into<String>) -> Self {
        OcrFallback {
            engine,
            render_scale,
            languages: languages.into(),
        }
    }

    pub fn languages(&self) -> &str {
        &self.languages
    }

    /// Recognize all pages in order and join them with a blank line.
    ///
    /// Progress runs from 70 towards 99, split evenly across pages.
    pub async fn recognize_pdf(
        &self,
        backend: &dyn PdfBackend,
        bytes: &[u8],
        reporter: &mut ProgressReporter<'_>,
    ) -> Result<String, ExtractionError> {
        let document = backend.open(bytes)?;
        let page_count = document.page_count();
        info!(
            "Running OCR over {} pages at {}x with '{}'",
            page_count, self.render_scale, self.languages
        );

        let mut texts = Vec::with_capacity(page_count);
        for page in 1..=page_count {
            reporter.ensure_live()?;

            let image = document.render(page, self.render_scale)?;
            debug!("Rendered page {} to {}x{}", page, image.width(), image.height());

            let mut on_progress = |fraction: f32| {
                reporter.report(progress::ocr_page_progress(page, page_count, fraction));
            };
            let text = self
                .engine
                .recognize(&image, &self.languages, &mut on_progress)
                .await
                .map_err(|e| ExtractionError::OcrError(format!("page {}: {:#}", page, e)))?;

            debug!("Recognized {} characters on page {}", text.len(), page);
            texts.push(text);
        }
        reporter.ensure_live()?;

        Ok(texts.join(PAGE_SEPARATOR))
    }
}
