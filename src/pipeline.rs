use crate::classifier::{self, DocumentKind};
use crate::config::ExtractionConfig;
use crate::document::{ExtractedDocument, Language, Provenance, UploadedFile};
use crate::error::ExtractionError;
use crate::ocr_engine::{OcrEngine, OcrFallback, TesseractCli};
use crate::pdf_backend::{self, PdfBackend};
use crate::preview::{PreviewHandle, PreviewStore};
use crate::progress::ProgressReporter;
use crate::runtime;
use crate::text_extractor::TextExtractor;
use log::{error, info, warn};

/// Orchestrates classification, structured extraction and the OCR fallback
pub struct DocumentPipeline<O = TesseractCli> {
    backend: Box<dyn PdfBackend>,
    text_extractor: TextExtractor,
    ocr: OcrFallback<O>,
    previews: PreviewStore,
    config: ExtractionConfig,
}

impl DocumentPipeline<TesseractCli> {
    /// Build a pipeline from the settings registered with `runtime::init`
    pub fn from_global() -> Result<Self, ExtractionError> {
        let settings = runtime::settings()?;
        info!("Initializing document pipeline...");

        let backend = pdf_backend::default_backend(settings.pdfium_library_dir.as_deref());
        let ocr = TesseractCli::new(settings.tesseract_path.clone(), settings.tessdata_dir.clone());
        Ok(Self::new(settings.extraction.clone(), backend, ocr))
    }
}

impl<O: OcrEngine> DocumentPipeline<O> {
    pub fn new(config: ExtractionConfig, backend: Box<dyn PdfBackend>, engine: O) -> Self {
        info!(
            "Pipeline configured: backend={}, ocr_threshold={} chars, scale={}x, languages={}",
            backend.name(),
            config.min_structured_chars,
            config.render_scale,
            config.ocr_languages
        );

        DocumentPipeline {
            backend,
            text_extractor: TextExtractor::new(config.read_chunk_bytes),
            ocr: OcrFallback::new(engine, config.render_scale, config.ocr_languages.clone()),
            previews: PreviewStore::new(config.max_preview_bytes),
            config,
        }
    }

    pub fn previews(&self) -> &PreviewStore {
        &self.previews
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract text from `file`, reporting progress through `on_progress`.
    ///
    /// The last value passed to `on_progress` is 100 on success and 0 on failure.
    pub async fn extract<F>(
        &self,
        file: &UploadedFile,
        language: Language,
        on_progress: F,
    ) -> Result<ExtractedDocument, ExtractionError>
    where
        F: FnMut(u8),
    {
        let mut reporter = ProgressReporter::new(on_progress);
        self.extract_with_reporter(file, language, &mut reporter).await
    }

    /// Same as `extract`, with a caller-built reporter (e.g. one holding an upload ticket)
    pub async fn extract_with_reporter(
        &self,
        file: &UploadedFile,
        language: Language,
        reporter: &mut ProgressReporter<'_>,
    ) -> Result<ExtractedDocument, ExtractionError> {
        reporter.report(0.0);

        match self.run(file, language, reporter).await {
            Ok(document) => {
                reporter.complete();
                Ok(document)
            }
            Err(e) => {
                reporter.reset();
                if !matches!(e, ExtractionError::Superseded) {
                    error!("Text extraction failed for {}: {}", file.name(), e);
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        file: &UploadedFile,
        language: Language,
        reporter: &mut ProgressReporter<'_>,
    ) -> Result<ExtractedDocument, ExtractionError> {
        let file_type = classifier::file_type_label(file.name(), file.mime());
        info!("Processing {} ({}, {} bytes)", file.name(), file_type, file.len());

        match classifier::classify(file.name(), file.mime()) {
            DocumentKind::Pdf => {
                // Held from here on so a failed run releases it on the way out
                let preview = self.acquire_preview(file);
                let (text, provenance) = self.extract_pdf(file, language, reporter).await?;
                Ok(ExtractedDocument {
                    text,
                    provenance,
                    file_type,
                    preview,
                })
            }
            DocumentKind::TextLike => {
                let text = self.text_extractor.read_plain_text(file.bytes(), reporter).await?;
                Ok(ExtractedDocument {
                    text,
                    provenance: Provenance::Direct,
                    file_type,
                    preview: None,
                })
            }
        }
    }

    fn acquire_preview(&self, file: &UploadedFile) -> Option<PreviewHandle> {
        match self.previews.create(file) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("No preview for {}: {}", file.name(), e);
                None
            }
        }
    }

    async fn extract_pdf(
        &self,
        file: &UploadedFile,
        language: Language,
        reporter: &mut ProgressReporter<'_>,
    ) -> Result<(String, Provenance), ExtractionError> {
        let structured = self
            .text_extractor
            .extract_pdf_text(self.backend.as_ref(), file.bytes(), reporter)
            .await?;

        let final_text = structured.trim().to_string();
        let structured_chars = final_text.chars().count();
        if structured_chars >= self.config.min_structured_chars {
            info!("Structured extraction yielded {} chars, skipping OCR", structured_chars);
            return Ok((final_text, Provenance::Structured));
        }
        if !self.config.ocr_enabled {
            info!("Structured extraction yielded {} chars; OCR disabled", structured_chars);
            return Ok((final_text, Provenance::Structured));
        }

        info!(
            "Structured extraction yielded only {} chars, trying OCR with '{}' (ui language {})",
            structured_chars,
            self.ocr.languages(),
            language
        );
        match self.ocr.recognize_pdf(self.backend.as_ref(), file.bytes(), reporter).await {
            Ok(ocr_text) => {
                let ocr_text = ocr_text.trim();
                let ocr_chars = ocr_text.chars().count();
                if ocr_chars > structured_chars {
                    info!("OCR recovered {} chars, replacing structured text", ocr_chars);
                    Ok((ocr_text.to_string(), Provenance::Ocr))
                } else {
                    info!("OCR recovered {} chars, keeping structured text", ocr_chars);
                    Ok((final_text, Provenance::Structured))
                }
            }
            Err(ExtractionError::Superseded) => Err(ExtractionError::Superseded),
            Err(e) => {
                error!("OCR fallback failed for {}: {}", file.name(), e);
                Ok((final_text, Provenance::Structured))
            }
        }
    }
}
