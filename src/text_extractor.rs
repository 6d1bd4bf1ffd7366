use crate::error::ExtractionError;
use crate::pdf_backend::PdfBackend;
use crate::progress::{self, ProgressReporter};
use log::{debug, info};

/// Separator placed between the texts of consecutive pages
pub const PAGE_SEPARATOR: &str = "\n\n";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Structured (text-layer) extraction and direct decoding of text-like files
pub struct TextExtractor {
    read_chunk_bytes: usize,
}

impl TextExtractor {
    pub fn new(read_chunk_bytes: usize) -> Self {
        TextExtractor {
            read_chunk_bytes: read_chunk_bytes.max(1),
        }
    }

    /// Extract the text layer of every page, strictly in page order.
    ///
    /// Fragments of a page are joined by single spaces, pages by a blank line.
    /// Any page failure aborts the whole extraction.
    pub async fn extract_pdf_text(
        &self,
        backend: &dyn PdfBackend,
        bytes: &[u8],
        reporter: &mut ProgressReporter<'_>,
    ) -> Result<String, ExtractionError> {
        reporter.report(progress::PDF_BYTES_LOADED);

        let document = backend.open(bytes)?;
        let page_count = document.page_count();
        info!("PDF opened with {} backend. Pages: {}", backend.name(), page_count);

        let mut page_texts = Vec::with_capacity(page_count);
        for page in 1..=page_count {
            reporter.ensure_live()?;

            let items = document.text_items(page)?;
            let text = join_fragments(&items);
            debug!("Extracted {} characters from page {}", text.len(), page);
            page_texts.push(text);

            reporter.report(progress::structured_page_progress(page, page_count));
            tokio::task::yield_now().await;
        }
        reporter.ensure_live()?;

        Ok(page_texts.join(PAGE_SEPARATOR))
    }

    /// Decode a text-like file, reporting byte-level read progress.
    ///
    /// Invalid UTF-8 becomes U+FFFD and a leading byte-order mark is dropped.
    pub async fn read_plain_text(
        &self,
        bytes: &[u8],
        reporter: &mut ProgressReporter<'_>,
    ) -> Result<String, ExtractionError> {
        let total = bytes.len();
        let mut buffer = Vec::with_capacity(total);

        for chunk in bytes.chunks(self.read_chunk_bytes) {
            reporter.ensure_live()?;
            buffer.extend_from_slice(chunk);
            reporter.report(progress::read_progress(buffer.len(), total));
            tokio::task::yield_now().await;
        }
        reporter.ensure_live()?;

        let body = buffer.strip_prefix(UTF8_BOM).unwrap_or(&buffer);
        let text = String::from_utf8_lossy(body).into_owned();
        debug!("Decoded {} bytes into {} characters", total, text.chars().count());
        Ok(text)
    }
}

fn join_fragments(items: &[String]) -> String {
    items
        .iter()
        .map(String::as_str)
        .filter(|item| !item.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
