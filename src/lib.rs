//! Text acquisition for uploaded legal documents.
//!
//! Turns a PDF, plain-text file or pasted text into plain text for analysis.
//! PDFs go through their text layer first; when that yields almost nothing the
//! pages are rendered and run through OCR instead.

mod classifier;
mod config;
mod document;
mod error;
mod ocr_engine;
mod pdf_backend;
mod pipeline;
mod preview;
mod progress;
pub mod runtime;
mod session;
mod text_extractor;

#[cfg(test)]
mod test_support;

pub use classifier::{DocumentKind, classify, file_type_label};
pub use config::{ExtractionConfig, Settings};
pub use document::{ExtractedDocument, Language, PDF_MIME, Provenance, UploadedFile};
pub use error::{ExtractionError, PreviewError};
pub use ocr_engine::{OcrEngine, OcrFallback, TesseractCli};
pub use pdf_backend::{LopdfBackend, PageSource, PdfBackend, PdfiumBackend, default_backend};
pub use pipeline::DocumentPipeline;
pub use preview::{PreviewEntry, PreviewHandle, PreviewStore};
pub use progress::{ProgressReporter, UploadTicket};
pub use session::{SessionSnapshot, Submission, UploadSession};
pub use text_extractor::TextExtractor;

#[cfg(feature = "python")]
use pyo3::exceptions::{PyRuntimeError, PyValueError};
#[cfg(feature = "python")]
use pyo3::prelude::*;
#[cfg(feature = "python")]
use pyo3::types::PyDict;

/// Python module initialization
#[cfg(feature = "python")]
#[pymodule]
fn lexprime_ingest(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let _ = env_logger::try_init();

    m.add_function(wrap_pyfunction!(init, m)?)?;
    m.add_function(wrap_pyfunction!(extract_document, m)?)?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}

/// Register process-wide settings, given as JSON. Call once before extracting.
#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(signature = (settings_json=None))]
fn init(settings_json: Option<&str>) -> PyResult<()> {
    let settings = match settings_json {
        Some(json) => Settings::from_json_str(json),
        None => Ok(Settings::default()),
    }
    .map_err(|e| PyErr::new::<PyValueError, _>(e.to_string()))?;

    runtime::init(settings.with_env_overrides())
        .map_err(|e| PyErr::new::<PyRuntimeError, _>(e.to_string()))
}

/// Extract text from an uploaded file.
///
/// Returns a dict with `text`, `provenance` and `file_type`. `on_progress`, if
/// given, is called with integer percentages.
#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(signature = (data, name, mime=None, language="en", on_progress=None))]
fn extract_document(
    py: Python,
    data: Vec<u8>,
    name: String,
    mime: Option<String>,
    language: &str,
    on_progress: Option<PyObject>,
) -> PyResult<PyObject> {
    let language: Language = language
        .parse()
        .map_err(|e: ExtractionError| PyErr::new::<PyValueError, _>(e.to_string()))?;

    match runtime::init(Settings::default().with_env_overrides()) {
        Ok(()) | Err(ExtractionError::AlreadyInitialized) => {}
        Err(e) => return Err(PyErr::new::<PyRuntimeError, _>(e.to_string())),
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| PyErr::new::<PyRuntimeError, _>(format!("Failed to create runtime: {}", e)))?;

    rt.block_on(async {
        let pipeline = DocumentPipeline::from_global()
            .map_err(|e| PyErr::new::<PyRuntimeError, _>(format!("Pipeline initialization failed: {}", e)))?;

        let file = UploadedFile::new(name, mime.unwrap_or_default(), data);
        let document = pipeline
            .extract(&file, language, |percent| {
                if let Some(callback) = &on_progress {
                    if let Err(e) = callback.call1(py, (percent,)) {
                        log::warn!("Progress callback raised: {}", e);
                    }
                }
            })
            .await
            .map_err(|e| PyErr::new::<PyRuntimeError, _>(format!("Text extraction failed: {}", e)))?;

        let dict = PyDict::new(py);
        dict.set_item("text", document.text)?;
        dict.set_item("provenance", document.provenance.as_str())?;
        dict.set_item("file_type", document.file_type)?;
        Ok(dict.into())
    })
}
