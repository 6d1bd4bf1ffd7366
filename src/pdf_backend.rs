use crate::error::ExtractionError;
use image::DynamicImage;
use log::{debug, info, warn};
use lopdf::Document;
use pdfium_render::prelude::*;
use std::path::Path;

/// Parsing and rasterization capability behind both extraction stages
pub trait PdfBackend {
    fn name(&self) -> &'static str;

    /// Parse `bytes` as a PDF. Fails for corrupt or non-PDF input.
    fn open<'a>(&'a self, bytes: &'a [u8]) -> Result<Box<dyn PageSource + 'a>, ExtractionError>;
}

/// An opened document. Pages are 1-based.
pub trait PageSource {
    fn page_count(&self) -> usize;

    /// Text-layer fragments of one page, in content order
    fn text_items(&self, page: usize) -> Result<Vec<String>, ExtractionError>;

    /// Rasterize one page at `scale` times its native size
    fn render(&self, page: usize, scale: f32) -> Result<DynamicImage, ExtractionError>;
}

/// Pick the best available backend: pdfium when it can be bound, lopdf otherwise
pub fn default_backend(library_dir: Option<&Path>) -> Box<dyn PdfBackend> {
    match PdfiumBackend::bind(library_dir) {
        Ok(backend) => Box::new(backend),
        Err(e) => {
            warn!("{}; falling back to text-only lopdf backend", e);
            Box::new(LopdfBackend)
        }
    }
}

/// pdfium-backed parsing and rendering
pub struct PdfiumBackend {
    pdfium: Pdfium,
}

impl PdfiumBackend {
    /// Bind pdfium from `library_dir`, then `./`, then the system library
    pub fn bind(library_dir: Option<&Path>) -> Result<Self, ExtractionError> {
        let mut candidates: Vec<String> = Vec::new();
        if let Some(dir) = library_dir {
            candidates.push(dir.to_string_lossy().into_owned());
        }
        candidates.push("./".to_string());

        for dir in &candidates {
            match Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir.as_str())) {
                Ok(bindings) => {
                    info!("Loaded pdfium from '{}'", dir);
                    return Ok(PdfiumBackend {
                        pdfium: Pdfium::new(bindings),
                    });
                }
                Err(e) => info!("Failed to load pdfium from '{}': {}", dir, e),
            }
        }

        let bindings = Pdfium::bind_to_system_library()
            .map_err(|e| ExtractionError::SystemError(format!("Failed to initialize pdfium: {}", e)))?;
        info!("Loaded pdfium system library");
        Ok(PdfiumBackend {
            pdfium: Pdfium::new(bindings),
        })
    }
}

impl PdfBackend for PdfiumBackend {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    fn open<'a>(&'a self, bytes: &'a [u8]) -> Result<Box<dyn PageSource + 'a>, ExtractionError> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| ExtractionError::PdfLoadError(format!("pdfium could not parse document: {}", e)))?;
        Ok(Box::new(PdfiumPageSource { document }))
    }
}

struct PdfiumPageSource<'a> {
    document: PdfDocument<'a>,
}

impl<'a> PdfiumPageSource<'a> {
    fn page(&self, page: usize) -> Result<PdfPage<'a>, PdfiumError> {
        self.document.pages().get((page - 1) as u16)
    }
}

impl PageSource for PdfiumPageSource<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn text_items(&self, page: usize) -> Result<Vec<String>, ExtractionError> {
        let text_error = |e: PdfiumError| ExtractionError::TextExtractionError {
            page,
            error: format!("pdfium extraction failed: {}", e),
        };
        let pdf_page = self.page(page).map_err(text_error)?;

        let items: Vec<String> = pdf_page
            .objects()
            .iter()
            .filter_map(|object| object.as_text_object().map(|text| text.text()))
            .collect();

        if !items.is_empty() {
            return Ok(items);
        }

        // Text drawn inside form XObjects has no top-level text object
        let all = pdf_page.text().map_err(text_error)?.all();
        debug!("Page {} has no top-level text objects, using page text ({} chars)", page, all.len());
        Ok(vec![all])
    }

    fn render(&self, page: usize, scale: f32) -> Result<DynamicImage, ExtractionError> {
        let render_error = |e: String| ExtractionError::PageRenderError { page, error: e };
        let pdf_page = self.page(page).map_err(|e| render_error(e.to_string()))?;

        let config = PdfRenderConfig::new().scale_page_by_factor(scale);
        let bitmap = pdf_page
            .render_with_config(&config)
            .map_err(|e| render_error(e.to_string()))?;

        // as_image honours the bitmap's stride and pixel format
        Ok(DynamicImage::ImageRgba8(bitmap.as_image().into_rgba8()))
    }
}

/// Pure-Rust text-layer reader. Cannot rasterize, so OCR never succeeds on it.
pub struct LopdfBackend;

impl PdfBackend for LopdfBackend {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn open<'a>(&'a self, bytes: &'a [u8]) -> Result<Box<dyn PageSource + 'a>, ExtractionError> {
        let document = Document::load_mem(bytes)
            .map_err(|e| ExtractionError::PdfLoadError(format!("lopdf could not parse document: {}", e)))?;
        let page_numbers = document.get_pages().into_keys().collect();
        Ok(Box::new(LopdfPageSource { document, page_numbers }))
    }
}

struct LopdfPageSource {
    document: Document,
    page_numbers: Vec<u32>,
}

impl PageSource for LopdfPageSource {
    fn page_count(&self) -> usize {
        self.page_numbers.len()
    }

    fn text_items(&self, page: usize) -> Result<Vec<String>, ExtractionError> {
        let number = page
            .checked_sub(1)
            .and_then(|index| self.page_numbers.get(index))
            .ok_or_else(|| ExtractionError::TextExtractionError {
                page,
                error: "page out of range".to_string(),
            })?;

        let text = self
            .document
            .extract_text(&[*number])
            .map_err(|e| ExtractionError::TextExtractionError {
                page,
                error: format!("lopdf extraction failed: {}", e),
            })?;

        // lopdf ends every text object with a newline
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn render(&self, page: usize, _scale: f32) -> Result<DynamicImage, ExtractionError> {
        Err(ExtractionError::PageRenderError {
            page,
            error: "lopdf backend cannot rasterize pages".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::build_pdf;

    #[test]
    fn test_lopdf_reads_pages_in_order() {
        let bytes = build_pdf(&[&["Lease Agreement", "between the parties"], &["Schedule A"]]);
        let backend = LopdfBackend;
        let source = backend.open(&bytes).unwrap();

        assert_eq!(source.page_count(), 2);
        assert_eq!(
            source.text_items(1).unwrap(),
            vec!["Lease Agreement".to_string(), "between the parties".to_string()]
        );
        assert_eq!(source.text_items(2).unwrap(), vec!["Schedule A".to_string()]);
    }

    #[test]
    fn test_lopdf_rejects_garbage() {
        let backend = LopdfBackend;
        let result = backend.open(b"\x00\x01definitely not a pdf");
        assert!(matches!(result, Err(ExtractionError::PdfLoadError(_))));
    }

    #[test]
    fn test_lopdf_out_of_range_and_render() {
        let bytes = build_pdf(&[&["only page"]]);
        let backend = LopdfBackend;
        let source = backend.open(&bytes).unwrap();

        assert!(matches!(
            source.text_items(0),
            Err(ExtractionError::TextExtractionError { page: 0, .. })
        ));
        assert!(matches!(
            source.text_items(2),
            Err(ExtractionError::TextExtractionError { page: 2, .. })
        ));
        assert!(matches!(
            source.render(1, 2.0),
            Err(ExtractionError::PageRenderError { page: 1, .. })
        ));
    }

    #[test]
    fn test_pdfium_render_is_upright_rgba() {
        // Needs a pdfium library on the machine; nothing to check without one
        let Ok(backend) = PdfiumBackend::bind(None) else {
            return;
        };
        let bytes = build_pdf(&[&["Rendered page"]]);
        let source = backend.open(&bytes).unwrap();

        let image = source.render(1, 2.0).unwrap();
        assert!(matches!(image, DynamicImage::ImageRgba8(_)));
        assert!(image.width().abs_diff(1190) <= 1);
        assert!(image.height().abs_diff(1684) <= 1);

        // Blank page corners stay opaque white on every row
        let rgba = image.to_rgba8();
        let (w, h) = rgba.dimensions();
        for (x, y) in [(0, 0), (w - 1, 0), (0, h - 1), (w - 1, h - 1), (w - 1, h / 2)] {
            assert_eq!(rgba.get_pixel(x, y).0, [255, 255, 255, 255], "pixel ({}, {})", x, y);
        }
    }
}
