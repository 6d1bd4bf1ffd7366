use crate::document::PDF_MIME;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

static PDF_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.pdf$").expect("Invalid pdf name regex"));

/// Extraction route for an uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    /// Anything else; decoded as text whatever its declared type
    TextLike,
}

/// Route a file by name and MIME type.
///
/// `.doc`/`.docx` and other binary formats land in `TextLike` and are decoded
/// as text, garbage included.
pub fn classify(name: &str, mime: &str) -> DocumentKind {
    let kind = if PDF_NAME_REGEX.is_match(name) || mime == PDF_MIME {
        DocumentKind::Pdf
    } else {
        DocumentKind::TextLike
    };
    debug!("Classified {:?} ({:?}) as {:?}", name, mime, kind);
    kind
}

/// Label recorded alongside the text: the MIME type, else the last
/// dot-separated part of the name, else `"file"`.
pub fn file_type_label(name: &str, mime: &str) -> String {
    if !mime.is_empty() {
        return mime.to_string();
    }
    match name.rsplit('.').next() {
        Some(ext) if !ext.is_empty() => ext.to_string(),
        _ => "file".to_string(),
    }
}
