use crate::error::ExtractionError;
use crate::preview::PreviewHandle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

pub const PDF_MIME: &str = "application/pdf";

/// Interface language selected by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Hi,
    Mr,
}

impl Language {
    pub fn tag(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Hi => "hi",
            Language::Mr => "mr",
        }
    }
}

impl FromStr for Language {
    type Err = ExtractionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "hi" => Ok(Language::Hi),
            "mr" => Ok(Language::Mr),
            other => Err(ExtractionError::UnknownLanguage(other.to_string())),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A user-selected file. Cheap to clone; the bytes are shared.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    name: String,
    mime: String,
    bytes: Arc<[u8]>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        UploadedFile {
            name: name.into(),
            mime: mime.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, guessing its MIME type from the extension
    pub async fn from_path(path: &Path) -> Result<Self, ExtractionError> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        let mime = guess_mime(&name);
        Ok(UploadedFile::new(name, mime, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub(crate) fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }
}

fn guess_mime(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".pdf") {
        PDF_MIME
    } else if lower.ends_with(".txt") {
        "text/plain"
    } else {
        ""
    }
}

/// Which strategy produced the accepted text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Text-like file decoded as-is
    Direct,
    /// PDF text layer
    Structured,
    /// Recognized from rendered pages
    Ocr,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::Direct => "direct",
            Provenance::Structured => "structured",
            Provenance::Ocr => "ocr",
        }
    }
}

/// Final output of one upload
#[derive(Debug)]
pub struct ExtractedDocument {
    pub text: String,
    pub provenance: Provenance,
    /// MIME type, or the extension when the MIME type was empty
    pub file_type: String,
    pub preview: Option<PreviewHandle>,
}

impl ExtractedDocument {
    pub fn preview_url(&self) -> Option<&str> {
        self.preview.as_ref().map(|handle| handle.url())
    }
}
