//! Test doubles shared by the module tests.

use crate::error::ExtractionError;
use crate::ocr_engine::OcrEngine;
use crate::pdf_backend::{PageSource, PdfBackend};
use image::{DynamicImage, GrayImage};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Build a real PDF where each page shows one text object per fragment
pub fn build_pdf(pages: &[&[&str]]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for fragments in pages {
        let mut operations = Vec::new();
        for (i, fragment) in fragments.iter().enumerate() {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
            operations.push(Operation::new("Td", vec![72.into(), (720 - 20 * i as i64).into()]));
            operations.push(Operation::new("Tj", vec![Object::string_literal(*fragment)]));
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// Scripted backend: each page is a list of text fragments, or a page error
#[derive(Clone, Default)]
pub struct MockBackend {
    pub pages: Vec<Result<Vec<String>, String>>,
    pub fail_open: bool,
    pub fail_render: bool,
    pub opens: Arc<AtomicUsize>,
    pub renders: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn with_pages(pages: &[&[&str]]) -> Self {
        MockBackend {
            pages: pages
                .iter()
                .map(|items| Ok(items.iter().map(|s| s.to_string()).collect()))
                .collect(),
            ..Default::default()
        }
    }

    /// `count` pages with no text layer at all
    pub fn scanned(count: usize) -> Self {
        MockBackend {
            pages: (0..count).map(|_| Ok(Vec::new())).collect(),
            ..Default::default()
        }
    }

    pub fn corrupt() -> Self {
        MockBackend {
            fail_open: true,
            ..Default::default()
        }
    }
}

impl PdfBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn open<'a>(&'a self, _bytes: &'a [u8]) -> Result<Box<dyn PageSource + 'a>, ExtractionError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open {
            return Err(ExtractionError::PdfLoadError("mock: not a pdf".to_string()));
        }
        Ok(Box::new(MockSource { backend: self }))
    }
}

struct MockSource<'a> {
    backend: &'a MockBackend,
}

impl PageSource for MockSource<'_> {
    fn page_count(&self) -> usize {
        self.backend.pages.len()
    }

    fn text_items(&self, page: usize) -> Result<Vec<String>, ExtractionError> {
        match &self.backend.pages[page - 1] {
            Ok(items) => Ok(items.clone()),
            Err(error) => Err(ExtractionError::TextExtractionError {
                page,
                error: error.clone(),
            }),
        }
    }

    fn render(&self, page: usize, scale: f32) -> Result<DynamicImage, ExtractionError> {
        self.backend.renders.fetch_add(1, Ordering::SeqCst);
        if self.backend.fail_render {
            return Err(ExtractionError::PageRenderError {
                page,
                error: "mock: cannot render".to_string(),
            });
        }
        // Encode the page number in the width so the OCR mock can tell pages apart
        let width = (page as f32 * 10.0 * scale) as u32;
        Ok(DynamicImage::ImageLuma8(GrayImage::new(width, 4)))
    }
}

/// OCR double that answers `"Page N text"` (or a fixed reply) and records calls
#[derive(Clone, Default)]
pub struct MockOcr {
    pub reply: Option<String>,
    pub fail: bool,
    pub calls: Arc<Mutex<Vec<(u32, String)>>>,
}

impl MockOcr {
    pub fn failing() -> Self {
        MockOcr {
            fail: true,
            ..Default::default()
        }
    }

    pub fn replying(text: &str) -> Self {
        MockOcr {
            reply: Some(text.to_string()),
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl OcrEngine for MockOcr {
    async fn recognize(
        &self,
        image: &DynamicImage,
        languages: &str,
        on_progress: &mut dyn FnMut(f32),
    ) -> anyhow::Result<String> {
        self.calls.lock().push((image.width(), languages.to_string()));
        if self.fail {
            anyhow::bail!("mock engine crashed");
        }
        on_progress(0.0);
        tokio::task::yield_now().await;
        on_progress(0.5);
        on_progress(1.0);
        // Rendered at 2x, so width = page * 20
        let page = image.width() / 20;
        Ok(self
            .reply
            .clone()
            .unwrap_or_else(|| format!("Page {} text", page)))
    }
}
