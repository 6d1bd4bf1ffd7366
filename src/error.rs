use thiserror::Error;

/// Custom error types for the text-acquisition pipeline
///
/// Only the unreadable-input variants (and `Superseded`) ever escape
/// `DocumentPipeline::extract`; OCR and preview failures are logged and absorbed.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("PDF loading failed: {0}")]
    PdfLoadError(String),

    #[error("Text extraction failed on page {page}: {error}")]
    TextExtractionError { page: usize, error: String },

    #[error("Rendering failed on page {page}: {error}")]
    PageRenderError { page: usize, error: String },

    #[error("OCR failed: {0}")]
    OcrError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unsupported language tag: {0}")]
    UnknownLanguage(String),

    #[error("System error: {0}")]
    SystemError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Runtime settings have not been initialized")]
    NotInitialized,

    #[error("Runtime settings were already initialized")]
    AlreadyInitialized,

    #[error("Upload superseded by a newer one")]
    Superseded,
}

impl ExtractionError {
    /// True for the failures that mean the input itself could not be read.
    pub fn is_unreadable_input(&self) -> bool {
        matches!(
            self,
            ExtractionError::PdfLoadError(_)
                | ExtractionError::TextExtractionError { .. }
                | ExtractionError::IoError(_)
        )
    }

    /// Message shown to the user when an upload fails.
    pub fn user_message(&self) -> &'static str {
        match self {
            ExtractionError::PdfLoadError(_) | ExtractionError::TextExtractionError { .. } => {
                "Could not extract text from PDF. Please try another file."
            }
            _ => "Could not read the selected file. Please try another file or paste text.",
        }
    }
}

/// Failure to acquire a preview handle. Never fatal to an upload.
#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("File of {size} bytes exceeds the preview limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },
}
